//! Vector index capability traits.
//!
//! A [`VectorIndex`] hands out named [`Collection`]s. Collections accept
//! batched upserts of `(id, body, metadata)` triples and answer
//! similarity queries. Implementations must be `Send + Sync`; the
//! ingestion writer and the query server share them across tasks.
//!
//! [`memory::InMemoryIndex`] lives here; the SQLite-backed index lives in
//! the app crate.

pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::embedding::Embedder;
use crate::models::{Body, RankedResult, RecordMetadata};

/// Errors raised by index engines.
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("collection '{0}' does not exist")]
    CollectionNotFound(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("index backend error: {0}")]
    Backend(String),
}

impl IndexError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, IndexError::CollectionNotFound(_))
    }
}

pub type IndexResult<T> = std::result::Result<T, IndexError>;

/// Entry point to an index engine.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Return the named collection, creating it if absent. Idempotent.
    async fn get_or_create_collection(&self, name: &str) -> IndexResult<Arc<dyn Collection>>;

    /// Return the named collection, failing if it does not exist.
    async fn get_collection(&self, name: &str) -> IndexResult<Arc<dyn Collection>>;
}

/// A named partition of the index.
#[async_trait]
pub trait Collection: Send + Sync {
    fn name(&self) -> &str;

    /// Insert or overwrite records by id. The three slices must have equal
    /// lengths.
    async fn upsert(
        &self,
        ids: &[String],
        bodies: &[Body],
        metadatas: &[RecordMetadata],
    ) -> IndexResult<()>;

    /// Up to `k` records ranked by descending similarity to `text`.
    async fn query(&self, text: &str, k: usize) -> IndexResult<Vec<RankedResult>>;

    /// Number of records stored.
    async fn count(&self) -> IndexResult<usize>;
}

/// Validate upsert argument shapes before touching storage.
pub fn check_upsert_shape(
    ids: &[String],
    bodies: &[Body],
    metadatas: &[RecordMetadata],
) -> IndexResult<()> {
    if ids.len() != bodies.len() || ids.len() != metadatas.len() {
        return Err(IndexError::InvalidRequest(format!(
            "ids ({}), bodies ({}) and metadatas ({}) differ in length",
            ids.len(),
            bodies.len(),
            metadatas.len()
        )));
    }
    if let Some(pos) = ids.iter().position(|id| id.is_empty()) {
        return Err(IndexError::InvalidRequest(format!("empty id at position {pos}")));
    }
    Ok(())
}

/// Sort by descending score (ties by id for a stable order) and keep `k`.
pub fn rank(mut results: Vec<RankedResult>, k: usize) -> Vec<RankedResult> {
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    results.truncate(k);
    results
}

/// Embed a batch of bodies, texts in one call and images one at a time.
/// Output order matches `bodies`.
pub async fn embed_bodies(
    embedder: &dyn Embedder,
    bodies: &[Body],
) -> IndexResult<Vec<Vec<f32>>> {
    let texts: Vec<String> = bodies
        .iter()
        .filter_map(|b| b.as_text().map(str::to_string))
        .collect();
    let mut text_vectors = if texts.is_empty() {
        Vec::new()
    } else {
        embedder
            .embed_texts(&texts)
            .await
            .map_err(|e| IndexError::Embedding(e.to_string()))?
    };
    if text_vectors.len() != texts.len() {
        return Err(IndexError::Embedding(format!(
            "expected {} vectors, got {}",
            texts.len(),
            text_vectors.len()
        )));
    }
    text_vectors.reverse();

    let mut out = Vec::with_capacity(bodies.len());
    for body in bodies {
        match body {
            Body::Text(_) => {
                // Lengths were checked above.
                if let Some(v) = text_vectors.pop() {
                    out.push(v);
                }
            }
            Body::Image(img) => out.push(
                embedder
                    .embed_image(img)
                    .await
                    .map_err(|e| IndexError::Embedding(e.to_string()))?,
            ),
        }
    }
    Ok(out)
}
