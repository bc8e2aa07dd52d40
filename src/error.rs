//! Typed errors for source adapters, extraction, configuration, and CLI
//! invocation. Application boundaries wrap these in `anyhow`.

use thiserror::Error;

/// Failure talking to a remote source or reading a local one.
#[derive(Error, Debug)]
pub enum SourceError {
    /// Rate limiting, 5xx, or a network error that outlived its retries.
    #[error("transient failure for {url}: {detail}")]
    Transient { url: String, detail: String },

    #[error("credentials rejected by {url} ({detail})")]
    Auth { url: String, detail: String },

    #[error("not found: {url}")]
    NotFound { url: String },

    /// Any other non-success status.
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    /// A success response whose body did not have the expected shape.
    #[error("unexpected response from {url}: {detail}")]
    Protocol { url: String, detail: String },

    #[error("invalid source configuration: {0}")]
    Config(String),

    #[error("scan cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SourceError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, SourceError::NotFound { .. })
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, SourceError::Auth { .. })
    }
}

/// Why an item produced no body.
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("content is not valid UTF-8: {0}")]
    Decode(#[from] std::string::FromUtf8Error),

    #[error("PDF extraction failed: {0}")]
    Pdf(String),

    #[error("document extraction failed: {0}")]
    Document(String),

    #[error("image decode failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("no extractor for content of type {0}")]
    Unsupported(String),
}

/// Fatal configuration problems, detected before any work starts.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing credential '{key}' required by the {adapter} source")]
    MissingCredential {
        adapter: &'static str,
        key: &'static str,
    },

    #[error("source '{0}' is not configured")]
    NotConfigured(String),

    #[error("unknown source '{0}'; expected all, filesystem, github, slack, or notion")]
    UnknownSource(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// A CLI invocation whose arguments failed validation.
#[derive(Error, Debug)]
pub enum InvocationError {
    #[error("argument '{arg}' is not valid JSON of the expected shape: {detail}")]
    Json { arg: &'static str, detail: String },

    #[error("{0}")]
    Invalid(String),
}
