//! SQLite-backed [`VectorIndex`].
//!
//! Collections and records live in the database under the CLI's
//! `<index_path>` directory. Vectors are stored as little-endian `f32`
//! blobs; queries load a collection's vectors and rank them by cosine
//! similarity in process.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use sift_core::embedding::{blob_to_vec, cosine_similarity, vec_to_blob, Embedder};
use sift_core::index::{
    check_upsert_shape, embed_bodies, rank, Collection, IndexError, IndexResult, VectorIndex,
};
use sift_core::models::{Body, RankedResult, RecordMetadata};

use crate::{db, migrate};

pub struct SqliteIndex {
    pool: SqlitePool,
    embedder: Arc<dyn Embedder>,
}

impl SqliteIndex {
    /// Open or create the index in `index_dir` and apply the schema.
    pub async fn open(index_dir: &Path, embedder: Arc<dyn Embedder>) -> anyhow::Result<Self> {
        let pool = db::connect(index_dir).await?;
        migrate::run_migrations(&pool).await?;
        Ok(Self { pool, embedder })
    }

    /// Open an existing index for reading; fails without touching the disk
    /// when `index_dir` holds no index.
    pub async fn open_existing(index_dir: &Path, embedder: Arc<dyn Embedder>) -> anyhow::Result<Self> {
        let pool = db::connect_existing(index_dir).await?;
        migrate::run_migrations(&pool).await?;
        Ok(Self { pool, embedder })
    }

    fn collection(&self, name: &str) -> Arc<dyn Collection> {
        Arc::new(SqliteCollection {
            name: name.to_string(),
            pool: self.pool.clone(),
            embedder: Arc::clone(&self.embedder),
        })
    }
}

fn backend(e: sqlx::Error) -> IndexError {
    IndexError::Backend(e.to_string())
}

#[async_trait]
impl VectorIndex for SqliteIndex {
    async fn get_or_create_collection(&self, name: &str) -> IndexResult<Arc<dyn Collection>> {
        if name.trim().is_empty() {
            return Err(IndexError::InvalidRequest("collection name must not be empty".into()));
        }
        sqlx::query(
            "INSERT OR IGNORE INTO collections (name, embedding_model, dims, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(name)
        .bind(self.embedder.model_name())
        .bind(self.embedder.dims() as i64)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        let row = sqlx::query("SELECT embedding_model FROM collections WHERE name = ?")
            .bind(name)
            .fetch_one(&self.pool)
            .await
            .map_err(backend)?;
        let model: String = row.get("embedding_model");
        if model != self.embedder.model_name() {
            tracing::warn!(
                collection = name,
                stored = %model,
                current = self.embedder.model_name(),
                "collection was built with a different embedding model; scores may be meaningless"
            );
        }

        Ok(self.collection(name))
    }

    async fn get_collection(&self, name: &str) -> IndexResult<Arc<dyn Collection>> {
        let exists = sqlx::query("SELECT 1 FROM collections WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?
            .is_some();
        if !exists {
            return Err(IndexError::CollectionNotFound(name.to_string()));
        }
        Ok(self.collection(name))
    }
}

pub struct SqliteCollection {
    name: String,
    pool: SqlitePool,
    embedder: Arc<dyn Embedder>,
}

#[async_trait]
impl Collection for SqliteCollection {
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
        let now = chrono::Utc::now().timestamp();

        let mut tx = self.pool.begin().await.map_err(backend)?;
        for (((id, body), metadata), vector) in ids.iter().zip(bodies).zip(metadatas).zip(&vectors) {
            let metadata_json = serde_json::to_string(metadata)
                .map_err(|e| IndexError::InvalidRequest(e.to_string()))?;
            let (kind, document, height, width, channels, pixels) = match body {
                Body::Text(t) => ("text", Some(t.as_str()), None, None, None, None),
                Body::Image(img) => (
                    "image",
                    None,
                    Some(img.height as i64),
                    Some(img.width as i64),
                    Some(img.channels as i64),
                    Some(img.pixels.as_slice()),
                ),
            };

            sqlx::query(
                r#"
                INSERT INTO records (collection, id, body_kind, document, image_height,
                                     image_width, image_channels, pixels, metadata_json,
                                     embedding, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(collection, id) DO UPDATE SET
                    body_kind = excluded.body_kind,
                    document = excluded.document,
                    image_height = excluded.image_height,
                    image_width = excluded.image_width,
                    image_channels = excluded.image_channels,
                    pixels = excluded.pixels,
                    metadata_json = excluded.metadata_json,
                    embedding = excluded.embedding,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(&self.name)
            .bind(id)
            .bind(kind)
            .bind(document)
            .bind(height)
            .bind(width)
            .bind(channels)
            .bind(pixels)
            .bind(metadata_json)
            .bind(vec_to_blob(vector))
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;
        }
        tx.commit().await.map_err(backend)?;
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

        let rows = sqlx::query(
            "SELECT id, document, metadata_json, embedding FROM records WHERE collection = ?",
        )
        .bind(&self.name)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        let mut scored = Vec::with_capacity(rows.len());
        for row in rows {
            let blob: Vec<u8> = row.get("embedding");
            let metadata_json: String = row.get("metadata_json");
            let metadata: RecordMetadata = serde_json::from_str(&metadata_json).unwrap_or_default();
            let score = cosine_similarity(&probe, &blob_to_vec(&blob));
            scored.push(RankedResult {
                id: row.get("id"),
                score,
                distance: 1.0 - score,
                document: row.get("document"),
                metadata,
            });
        }
        Ok(rank(scored, k))
    }

    async fn count(&self) -> IndexResult<usize> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM records WHERE collection = ?")
            .bind(&self.name)
            .fetch_one(&self.pool)
            .await
            .map_err(backend)?;
        let n: i64 = row.get("n");
        Ok(n as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sift_core::embedding::HashingEmbedder;
    use sift_core::models::ImageTensor;

    async fn open(dir: &Path) -> SqliteIndex {
        SqliteIndex::open(dir, Arc::new(HashingEmbedder::new(64)))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn open_existing_refuses_a_missing_index() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("absent");
        let result = SqliteIndex::open_existing(&dir, Arc::new(HashingEmbedder::new(64))).await;
        assert!(result.is_err());
        assert!(!dir.exists());

        open(&dir).await;
        assert!(SqliteIndex::open_existing(&dir, Arc::new(HashingEmbedder::new(64)))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn records_persist_across_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        {
            let index = open(tmp.path()).await;
            let c = index.get_or_create_collection("siftfiles").await.unwrap();
            c.upsert(
                &["txt0".into()],
                &[Body::Text("hello world".into())],
                &[RecordMetadata {
                    filepath: Some("/notes.txt".into()),
                    extension: Some("txt".into()),
                    size: Some(11),
                    location: None,
                }],
            )
            .await
            .unwrap();
        }

        let index = open(tmp.path()).await;
        let c = index.get_collection("siftfiles").await.unwrap();
        assert_eq!(c.count().await.unwrap(), 1);
        let hits = c.query("hello", 1).await.unwrap();
        assert_eq!(hits[0].id, "txt0");
        assert_eq!(hits[0].document.as_deref(), Some("hello world"));
        assert_eq!(hits[0].metadata.size, Some(11));
    }

    #[tokio::test]
    async fn missing_collection_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let index = open(tmp.path()).await;
        let err = index.get_collection("nope").await.err().unwrap();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn collections_are_partitioned_and_upserts_overwrite() {
        let tmp = tempfile::tempdir().unwrap();
        let index = open(tmp.path()).await;
        let a = index.get_or_create_collection("a").await.unwrap();
        let b = index.get_or_create_collection("b").await.unwrap();
        let meta = [RecordMetadata::default()];

        a.upsert(&["x".into()], &[Body::Text("one".into())], &meta).await.unwrap();
        a.upsert(&["x".into()], &[Body::Text("two".into())], &meta).await.unwrap();
        b.upsert(&["x".into()], &[Body::Text("three".into())], &meta).await.unwrap();

        assert_eq!(a.count().await.unwrap(), 1);
        assert_eq!(b.count().await.unwrap(), 1);
        let hit = &a.query("two", 1).await.unwrap()[0];
        assert_eq!(hit.document.as_deref(), Some("two"));
    }

    #[tokio::test]
    async fn image_records_have_no_document() {
        let tmp = tempfile::tempdir().unwrap();
        let index = open(tmp.path()).await;
        let c = index.get_or_create_collection("imgs").await.unwrap();
        let img = ImageTensor {
            height: 1,
            width: 1,
            channels: 3,
            pixels: vec![10, 20, 30],
        };
        c.upsert(&["img0".into()], &[Body::Image(img)], &[RecordMetadata::default()])
            .await
            .unwrap();
        let hits = c.query("anything", 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].document.is_none());
    }
}
