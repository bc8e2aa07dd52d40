//! CLI index actions: `get_or_create`, `add`, `query`.
//!
//! `get_or_create` and `add` report through a one-line [`StatusLine`] on
//! stdout. `add` arguments arrive as JSON text and are parsed into typed
//! records before anything touches the index.

use std::collections::HashSet;

use serde::Serialize;
use sift_core::index::{IndexResult, VectorIndex};
use sift_core::models::{Body, RankedResult, RecordMetadata};

use crate::error::InvocationError;

/// The single status line printed by mutating actions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusLine {
    Success,
    Failed(String),
}

#[derive(Serialize)]
struct StatusJson<'a> {
    status: &'a str,
}

impl StatusLine {
    pub fn failed(error: impl std::fmt::Display) -> Self {
        StatusLine::Failed(error.to_string())
    }

    /// `{"status":"Success"}` or `{"status":"Failed with error: ..."}`.
    pub fn render(&self) -> String {
        let status = match self {
            StatusLine::Success => "Success".to_string(),
            StatusLine::Failed(e) => format!("Failed with error: {}", e),
        };
        serde_json::to_string(&StatusJson { status: &status })
            .unwrap_or_else(|_| r#"{"status":"Failed with error: unprintable status"}"#.to_string())
    }
}

impl<T, E: std::fmt::Display> From<Result<T, E>> for StatusLine {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(_) => StatusLine::Success,
            Err(e) => StatusLine::failed(e),
        }
    }
}

/// Validated arguments of `add`.
#[derive(Debug, Clone, PartialEq)]
pub struct AddArgs {
    pub ids: Vec<String>,
    pub documents: Vec<String>,
    pub metadatas: Vec<RecordMetadata>,
}

impl AddArgs {
    /// Parse and validate the raw JSON arguments.
    ///
    /// Documents and ids must be JSON arrays of strings of equal length;
    /// ids must be non-empty and unique, documents non-blank. Metadata,
    /// when given, is an array of objects using only the keys `filepath`,
    /// `extension`, `size` and `location`; when absent every record gets
    /// empty metadata.
    pub fn parse(
        documents_json: &str,
        ids_json: &str,
        metadatas_json: Option<&str>,
    ) -> Result<Self, InvocationError> {
        let documents: Vec<String> = parse_json("documents_json", documents_json)?;
        let ids: Vec<String> = parse_json("ids_json", ids_json)?;
        let metadatas: Vec<RecordMetadata> = match metadatas_json {
            Some(raw) => parse_json("metadatas_json", raw)?,
            None => vec![RecordMetadata::default(); ids.len()],
        };

        if ids.is_empty() {
            return Err(InvocationError::Invalid("at least one record is required".into()));
        }
        if documents.len() != ids.len() || metadatas.len() != ids.len() {
            return Err(InvocationError::Invalid(format!(
                "length mismatch: {} documents, {} ids, {} metadatas",
                documents.len(),
                ids.len(),
                metadatas.len()
            )));
        }

        let mut seen = HashSet::with_capacity(ids.len());
        for id in &ids {
            if id.trim().is_empty() {
                return Err(InvocationError::Invalid("ids must not be empty".into()));
            }
            if !seen.insert(id.as_str()) {
                return Err(InvocationError::Invalid(format!("duplicate id '{}'", id)));
            }
        }
        if let Some(pos) = documents.iter().position(|d| d.trim().is_empty()) {
            return Err(InvocationError::Invalid(format!(
                "document for id '{}' is empty",
                ids[pos]
            )));
        }

        Ok(Self {
            ids,
            documents,
            metadatas,
        })
    }
}

fn parse_json<T: serde::de::DeserializeOwned>(
    arg: &'static str,
    raw: &str,
) -> Result<T, InvocationError> {
    serde_json::from_str(raw).map_err(|e| InvocationError::Json {
        arg,
        detail: e.to_string(),
    })
}

pub async fn get_or_create(index: &dyn VectorIndex, collection: &str) -> IndexResult<()> {
    index.get_or_create_collection(collection).await?;
    tracing::info!(collection, "collection ready");
    Ok(())
}

/// Upsert `args` into `collection`, creating it if needed.
pub async fn add(index: &dyn VectorIndex, collection: &str, args: AddArgs) -> IndexResult<usize> {
    let handle = index.get_or_create_collection(collection).await?;
    let bodies: Vec<Body> = args.documents.into_iter().map(Body::Text).collect();
    handle.upsert(&args.ids, &bodies, &args.metadatas).await?;
    tracing::info!(collection, records = args.ids.len(), "records added");
    Ok(args.ids.len())
}

/// Raw ranked results for `query`. The collection must exist.
pub async fn query(
    index: &dyn VectorIndex,
    collection: &str,
    text: &str,
    k: usize,
) -> IndexResult<Vec<RankedResult>> {
    if k == 0 {
        return Err(sift_core::index::IndexError::InvalidRequest(
            "k must be at least 1".into(),
        ));
    }
    let handle = index.get_collection(collection).await?;
    handle.query(text, k).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use sift_core::embedding::HashingEmbedder;
    use sift_core::index::memory::InMemoryIndex;
    use std::sync::Arc;

    #[test]
    fn status_lines_render_exactly() {
        assert_eq!(StatusLine::Success.render(), r#"{"status":"Success"}"#);
        assert_eq!(
            StatusLine::failed("boom").render(),
            r#"{"status":"Failed with error: boom"}"#
        );
    }

    #[test]
    fn add_args_default_metadata_per_record() {
        let args = AddArgs::parse(r#"["a","b"]"#, r#"["1","2"]"#, None).unwrap();
        assert_eq!(args.metadatas, vec![RecordMetadata::default(); 2]);
    }

    #[test]
    fn add_args_reject_bad_shapes() {
        let cases = [
            (r#"["a"]"#, r#"["1","2"]"#, None),
            (r#"["a","b"]"#, r#"["1","1"]"#, None),
            (r#"["a"]"#, r#"[""]"#, None),
            (r#"[" "]"#, r#"["1"]"#, None),
            (r#"[]"#, r#"[]"#, None),
            (r#"["a"]"#, r#"["1"]"#, Some(r#"[{"owner":"x"}]"#)),
            (r#"["a"]"#, r#"["1"]"#, Some(r#"[{}, {}]"#)),
        ];
        for (docs, ids, metas) in cases {
            assert!(
                AddArgs::parse(docs, ids, metas).is_err(),
                "accepted {docs} {ids} {metas:?}"
            );
        }
    }

    #[test]
    fn add_args_are_never_evaluated() {
        let err = AddArgs::parse("__import__('os').system('true')", r#"["1"]"#, None)
            .err()
            .unwrap();
        assert!(matches!(err, InvocationError::Json { arg: "documents_json", .. }));
    }

    #[tokio::test]
    async fn add_then_query_round_trip() {
        let index = InMemoryIndex::new(Arc::new(HashingEmbedder::new(64)));
        let args = AddArgs::parse(
            r#"["pineapple grows in hawaii","oranges grow in florida"]"#,
            r#"["txt0","txt1"]"#,
            Some(r#"[{"filepath":"/a.txt","extension":"txt","size":25},{}]"#),
        )
        .unwrap();
        assert_eq!(add(&index, "siftfiles", args).await.unwrap(), 2);

        let hits = query(&index, "siftfiles", "hawaii", 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "txt0");
        assert_eq!(hits[0].metadata.size, Some(25));
    }

    #[tokio::test]
    async fn query_requires_existing_collection() {
        let index = InMemoryIndex::new(Arc::new(HashingEmbedder::new(64)));
        assert!(query(&index, "missing", "x", 1).await.unwrap_err().is_not_found());
    }
}
