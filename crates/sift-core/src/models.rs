//! Core data models shared across the ingestion and query paths.
//!
//! Adapters produce [`RawItem`]s. The extractor turns them into a
//! [`Body`], and the coordinator wraps the body in a [`ContentRecord`]
//! for exactly one upsert. Queries come back as [`RankedResult`]s.

use serde::{Deserialize, Serialize};

/// The kind of source a record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Local filesystem tree.
    Local,
    /// Source-hosting repository (GitHub).
    Repository,
    /// Chat workspace history (Slack).
    Chat,
    /// Page-based knowledge base (Notion).
    KnowledgeBase,
}

impl SourceKind {
    /// Stable lowercase label used in logs and run reports.
    pub fn label(&self) -> &'static str {
        match self {
            SourceKind::Local => "local",
            SourceKind::Repository => "repository",
            SourceKind::Chat => "chat",
            SourceKind::KnowledgeBase => "knowledge_base",
        }
    }

    /// Id prefix namespace for a record of this kind and content type.
    ///
    /// Local content is split by type (`txt`, `img`, `pdf`, `doc`); the
    /// remote kinds use one prefix each regardless of content type.
    pub fn id_prefix(&self, content_type: ContentType) -> &'static str {
        match self {
            SourceKind::Local => match content_type {
                ContentType::Image => "img",
                ContentType::Pdf => "pdf",
                ContentType::Document => "doc",
                ContentType::PlainText | ContentType::Unsupported => "txt",
            },
            SourceKind::Repository => "gh",
            SourceKind::Chat => "slack",
            SourceKind::KnowledgeBase => "noti",
        }
    }
}

/// Content type hint used to dispatch extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    PlainText,
    Pdf,
    /// Office Open XML word processing document (`.docx`).
    Document,
    Image,
    /// Known binary format with no extraction path (e.g. legacy `.doc`).
    Unsupported,
}

impl ContentType {
    /// Map a file extension (without the dot, any case) to a content type.
    ///
    /// Anything not recognised is treated as plain text; undecodable bytes
    /// are rejected later by the extractor.
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => ContentType::Pdf,
            "docx" => ContentType::Document,
            "png" | "jpg" | "jpeg" => ContentType::Image,
            "doc" => ContentType::Unsupported,
            _ => ContentType::PlainText,
        }
    }
}

/// A decoded raster image: `height x width x channels` bytes, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageTensor {
    pub height: u32,
    pub width: u32,
    pub channels: u8,
    pub pixels: Vec<u8>,
}

impl ImageTensor {
    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty() || self.height == 0 || self.width == 0
    }
}

/// The indexable body of a record. Exactly one of text or image.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Text(String),
    Image(ImageTensor),
}

impl Body {
    /// Text of the body, if it is a text body.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Body::Text(t) => Some(t),
            Body::Image(_) => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Body::Text(t) => t.trim().is_empty(),
            Body::Image(img) => img.is_empty(),
        }
    }

    /// Stable byte view used for content-derived ids.
    pub fn fingerprint_bytes(&self) -> &[u8] {
        match self {
            Body::Text(t) => t.as_bytes(),
            Body::Image(img) => &img.pixels,
        }
    }
}

/// Record metadata. The key vocabulary is fixed; unknown keys are rejected
/// when metadata is parsed from outside the process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecordMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filepath: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

/// A unit of indexed content, built for exactly one upsert.
#[derive(Debug, Clone)]
pub struct ContentRecord {
    pub id: String,
    pub body: Body,
    pub source_location: String,
    pub source_kind: SourceKind,
    pub metadata: RecordMetadata,
}

/// Raw bytes pulled from a source, before filtering and extraction.
#[derive(Debug, Clone)]
pub struct RawItem {
    /// Display name used by the eligibility filter (file name, page id, ...).
    pub name: String,
    /// Lowercased extension without the dot; empty for non-file sources.
    pub extension: String,
    /// Path or URI the item can be reached at.
    pub location: String,
    pub bytes: Vec<u8>,
    pub content_type: ContentType,
    pub kind: SourceKind,
    pub size: u64,
}

impl RawItem {
    /// Build a plain-text item from a non-file source (chat message, page).
    pub fn text(kind: SourceKind, name: impl Into<String>, location: impl Into<String>, text: String) -> Self {
        let bytes = text.into_bytes();
        Self {
            name: name.into(),
            extension: String::new(),
            location: location.into(),
            size: bytes.len() as u64,
            bytes,
            content_type: ContentType::PlainText,
            kind,
        }
    }

    /// Metadata recorded for this item, following the per-source vocabulary.
    pub fn metadata(&self) -> RecordMetadata {
        match self.kind {
            SourceKind::Local => RecordMetadata {
                filepath: Some(self.location.clone()),
                extension: Some(self.extension.clone()),
                size: Some(self.size),
                location: None,
            },
            SourceKind::Repository => RecordMetadata {
                filepath: Some(self.location.clone()),
                location: Some("github".to_string()),
                ..Default::default()
            },
            SourceKind::Chat => RecordMetadata {
                filepath: Some(self.location.clone()),
                location: Some("slack".to_string()),
                ..Default::default()
            },
            SourceKind::KnowledgeBase => RecordMetadata {
                filepath: Some(self.location.clone()),
                location: Some("notion".to_string()),
                ..Default::default()
            },
        }
    }
}

/// One ranked match returned from a similarity query.
#[derive(Debug, Clone, Serialize)]
pub struct RankedResult {
    pub id: String,
    /// Cosine similarity in `[-1, 1]`; higher is closer.
    pub score: f32,
    /// `1 - score`, for clients that expect a distance.
    pub distance: f32,
    pub document: Option<String>,
    pub metadata: RecordMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixes_follow_kind_and_content_type() {
        assert_eq!(SourceKind::Local.id_prefix(ContentType::PlainText), "txt");
        assert_eq!(SourceKind::Local.id_prefix(ContentType::Image), "img");
        assert_eq!(SourceKind::Local.id_prefix(ContentType::Pdf), "pdf");
        assert_eq!(SourceKind::Repository.id_prefix(ContentType::Pdf), "gh");
        assert_eq!(SourceKind::Chat.id_prefix(ContentType::PlainText), "slack");
        assert_eq!(SourceKind::KnowledgeBase.id_prefix(ContentType::PlainText), "noti");
    }

    #[test]
    fn content_type_from_extension_is_case_insensitive() {
        assert_eq!(ContentType::from_extension("PDF"), ContentType::Pdf);
        assert_eq!(ContentType::from_extension("Jpeg"), ContentType::Image);
        assert_eq!(ContentType::from_extension("docx"), ContentType::Document);
        assert_eq!(ContentType::from_extension("doc"), ContentType::Unsupported);
        assert_eq!(ContentType::from_extension("rs"), ContentType::PlainText);
    }

    #[test]
    fn metadata_rejects_unknown_keys() {
        let ok: RecordMetadata = serde_json::from_str(r#"{"filepath":"/a","size":3}"#).unwrap();
        assert_eq!(ok.size, Some(3));
        assert!(serde_json::from_str::<RecordMetadata>(r#"{"owner":"x"}"#).is_err());
    }

    #[test]
    fn whitespace_text_body_is_empty() {
        assert!(Body::Text("  \n\t".into()).is_empty());
        assert!(!Body::Text("x".into()).is_empty());
    }
}
