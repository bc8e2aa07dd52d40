//! In-memory [`VectorIndex`] for tests and embedding in other programs.
//!
//! Collections are `HashMap`s behind `std::sync::RwLock`. Queries are
//! brute-force cosine similarity over every stored vector.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use super::{check_upsert_shape, embed_bodies, rank, Collection, IndexError, IndexResult, VectorIndex};
use crate::embedding::{cosine_similarity, Embedder};
use crate::models::{Body, RankedResult, RecordMetadata};

struct StoredRecord {
    body: Body,
    metadata: RecordMetadata,
    vector: Vec<f32>,
}

/// In-memory index. Cheap to clone handles out of; all state is shared.
pub struct InMemoryIndex {
    embedder: Arc<dyn Embedder>,
    collections: RwLock<HashMap<String, Arc<MemoryCollection>>>,
}

impl InMemoryIndex {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            collections: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn get_or_create_collection(&self, name: &str) -> IndexResult<Arc<dyn Collection>> {
        let mut collections = self.collections.write().map_err(poisoned)?;
        let collection = collections
            .entry(name.to_string())
            .or_insert_with(|| {
                Arc::new(MemoryCollection {
                    name: name.to_string(),
                    embedder: Arc::clone(&self.embedder),
                    records: RwLock::new(HashMap::new()),
                })
            })
            .clone();
        Ok(collection)
    }

    async fn get_collection(&self, name: &str) -> IndexResult<Arc<dyn Collection>> {
        let collections = self.collections.read().map_err(poisoned)?;
        match collections.get(name) {
            Some(c) => Ok(c.clone()),
            None => Err(IndexError::CollectionNotFound(name.to_string())),
        }
    }
}

/// One collection of an [`InMemoryIndex`].
pub struct MemoryCollection {
    name: String,
    embedder: Arc<dyn Embedder>,
    records: RwLock<HashMap<String, StoredRecord>>,
}

#[async_trait]
impl Collection for MemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn upsert(
        &self,
        ids: &[String],
        bodies: &[Body],
        metadatas: &[RecordMetadata],
    ) -> IndexResult<()> {
        check_upsert_shape(ids, bodies, metadatas)?;
        let vectors = embed_bodies(self.embedder.as_ref(), bodies).await?;

        let mut records = self.records.write().map_err(poisoned)?;
        for (((id, body), metadata), vector) in ids.iter().zip(bodies).zip(metadatas).zip(vectors) {
            records.insert(
                id.clone(),
                StoredRecord {
                    body: body.clone(),
                    metadata: metadata.clone(),
                    vector,
                },
            );
        }
        Ok(())
    }

    async fn query(&self, text: &str, k: usize) -> IndexResult<Vec<RankedResult>> {
        let probe = self
            .embedder
            .embed_texts(&[text.to_string()])
            .await
            .map_err(|e| IndexError::Embedding(e.to_string()))?
            .pop()
            .ok_or_else(|| IndexError::Embedding("no vector returned for query".into()))?;

        let records = self.records.read().map_err(poisoned)?;
        let scored = records
            .iter()
            .map(|(id, r)| {
                let score = cosine_similarity(&probe, &r.vector);
                RankedResult {
                    id: id.clone(),
                    score,
                    distance: 1.0 - score,
                    document: r.body.as_text().map(str::to_string),
                    metadata: r.metadata.clone(),
                }
            })
            .collect();
        Ok(rank(scored, k))
    }

    async fn count(&self) -> IndexResult<usize> {
        Ok(self.records.read().map_err(poisoned)?.len())
    }
}

fn poisoned<T>(_: std::sync::PoisonError<T>) -> IndexError {
    IndexError::Backend("in-memory index lock poisoned".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingEmbedder;

    fn index() -> InMemoryIndex {
        InMemoryIndex::new(Arc::new(HashingEmbedder::new(128)))
    }

    fn text(s: &str) -> Body {
        Body::Text(s.to_string())
    }

    #[tokio::test]
    async fn get_collection_requires_existence() {
        let idx = index();
        let err = idx.get_collection("missing").await.err().unwrap();
        assert!(err.is_not_found());
        idx.get_or_create_collection("missing").await.unwrap();
        assert!(idx.get_collection("missing").await.is_ok());
    }

    #[tokio::test]
    async fn get_or_create_twice_shares_records() {
        let idx = index();
        let a = idx.get_or_create_collection("c").await.unwrap();
        a.upsert(&["a".into()], &[text("alpha")], &[RecordMetadata::default()])
            .await
            .unwrap();
        let b = idx.get_or_create_collection("c").await.unwrap();
        b.upsert(&["b".into()], &[text("beta")], &[RecordMetadata::default()])
            .await
            .unwrap();

        assert_eq!(a.count().await.unwrap(), 2);
        let ids: Vec<_> = a.query("beta", 5).await.unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(ids.len(), 2);
        assert_eq!(ids[0], "b");
    }

    #[tokio::test]
    async fn upsert_overwrites_by_id() {
        let idx = index();
        let c = idx.get_or_create_collection("c").await.unwrap();
        c.upsert(&["txt0".into()], &[text("old")], &[RecordMetadata::default()])
            .await
            .unwrap();
        c.upsert(&["txt0".into()], &[text("new")], &[RecordMetadata::default()])
            .await
            .unwrap();
        assert_eq!(c.count().await.unwrap(), 1);
        let hits = c.query("new", 1).await.unwrap();
        assert_eq!(hits[0].document.as_deref(), Some("new"));
    }

    #[tokio::test]
    async fn upsert_rejects_mismatched_lengths() {
        let idx = index();
        let c = idx.get_or_create_collection("c").await.unwrap();
        let err = c
            .upsert(&["a".into(), "b".into()], &[text("x")], &[RecordMetadata::default()])
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::InvalidRequest(_)));
        assert_eq!(c.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn query_returns_k_in_descending_order() {
        let idx = index();
        let c = idx.get_or_create_collection("c").await.unwrap();
        let ids: Vec<String> = (0..5).map(|i| format!("txt{i}")).collect();
        let bodies = vec![
            text("rust compiler borrow checker"),
            text("rust"),
            text("gardening tomatoes"),
            text("borrow checker"),
            text("tomatoes"),
        ];
        let metas = vec![RecordMetadata::default(); 5];
        c.upsert(&ids, &bodies, &metas).await.unwrap();

        let hits = c.query("rust borrow checker", 3).await.unwrap();
        assert_eq!(hits.len(), 3);
        assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
        assert_eq!(hits[0].id, "txt0");
    }
}
