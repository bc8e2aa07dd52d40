//! Similarity queries against one collection.
//!
//! Every outcome is folded into a [`QueryEnvelope`]; callers never see an
//! error type.

use std::sync::Arc;

use serde::Serialize;
use sift_core::index::{IndexError, VectorIndex};
use sift_core::models::RankedResult;

/// Response body of a query. Status codes are strings on the wire.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum QueryEnvelope {
    Ok {
        status: &'static str,
        results: Vec<RankedResult>,
    },
    Failed {
        status: &'static str,
        error: String,
    },
}

impl QueryEnvelope {
    pub fn ok(results: Vec<RankedResult>) -> Self {
        QueryEnvelope::Ok {
            status: "200",
            results,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        QueryEnvelope::Failed {
            status: "500",
            error: error.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, QueryEnvelope::Ok { .. })
    }

    pub fn results(&self) -> &[RankedResult] {
        match self {
            QueryEnvelope::Ok { results, .. } => results,
            QueryEnvelope::Failed { .. } => &[],
        }
    }
}

#[derive(Clone)]
pub struct QueryService {
    index: Arc<dyn VectorIndex>,
    collection: String,
}

impl QueryService {
    pub fn new(index: Arc<dyn VectorIndex>, collection: impl Into<String>) -> Self {
        Self {
            index,
            collection: collection.into(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub async fn query(&self, text: &str, k: usize) -> QueryEnvelope {
        match self.ranked(text, k).await {
            Ok(results) => QueryEnvelope::ok(results),
            Err(e) => {
                tracing::warn!(collection = %self.collection, error = %e, "query failed");
                QueryEnvelope::failed(e.to_string())
            }
        }
    }

    /// Ranked matches, or the index error that prevented them.
    pub async fn ranked(&self, text: &str, k: usize) -> Result<Vec<RankedResult>, IndexError> {
        if k == 0 {
            return Err(IndexError::InvalidRequest("k must be at least 1".into()));
        }
        let collection = self.index.get_collection(&self.collection).await?;
        collection.query(text, k).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sift_core::embedding::HashingEmbedder;
    use sift_core::index::memory::InMemoryIndex;
    use sift_core::models::{Body, RecordMetadata};

    async fn service() -> QueryService {
        let index = Arc::new(InMemoryIndex::new(Arc::new(HashingEmbedder::new(64))));
        let c = index.get_or_create_collection("siftfiles").await.unwrap();
        c.upsert(
            &["txt0".into(), "txt1".into()],
            &[
                Body::Text("pineapple grows in hawaii".into()),
                Body::Text("oranges grow in florida".into()),
            ],
            &[RecordMetadata::default(), RecordMetadata::default()],
        )
        .await
        .unwrap();
        QueryService::new(index, "siftfiles")
    }

    #[tokio::test]
    async fn envelope_serializes_status_as_string() {
        let envelope = service().await.query("hawaii", 2).await;
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["status"], "200");
        assert_eq!(json["results"].as_array().unwrap().len(), 2);
        assert_eq!(json["results"][0]["id"], "txt0");
    }

    #[tokio::test]
    async fn zero_k_is_a_failure_envelope() {
        let envelope = service().await.query("hawaii", 0).await;
        assert!(!envelope.is_ok());
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["status"], "500");
        assert!(json["error"].as_str().unwrap().contains("k must be"));
    }

    #[tokio::test]
    async fn missing_collection_is_a_failure_envelope() {
        let index = Arc::new(InMemoryIndex::new(Arc::new(HashingEmbedder::new(64))));
        let envelope = QueryService::new(index, "absent").query("x", 1).await;
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["status"], "500");
        assert!(json["error"].as_str().unwrap().contains("absent"));
    }
}
