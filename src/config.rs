//! Configuration loading.
//!
//! Runtime settings come from a TOML file (`sift.toml` by default);
//! per-source tokens come from a separate JSON credentials file so the
//! TOML can be committed without secrets.

use anyhow::{Context, Result};
use serde::Deserialize;
use sift_core::ids::IdStrategy;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    /// JSON file holding `github_token`, `github_username`, `notion_token`, `slack_token`.
    #[serde(default)]
    pub credentials_path: Option<PathBuf>,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub connectors: ConnectorsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    #[serde(default = "default_collection")]
    pub collection: String,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            collection: default_collection(),
        }
    }
}

fn default_collection() -> String {
    "siftfiles".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for the `ollama` provider.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "hashing".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_pdf_page_limit")]
    pub pdf_page_limit: usize,
    #[serde(default = "default_max_file_size_mb")]
    pub max_file_size_mb: u64,
    #[serde(default)]
    pub id_strategy: IdStrategy,
    /// Whole-run deadline; unset means no deadline.
    #[serde(default)]
    pub deadline_secs: Option<u64>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
            pdf_page_limit: default_pdf_page_limit(),
            max_file_size_mb: default_max_file_size_mb(),
            id_strategy: IdStrategy::default(),
            deadline_secs: None,
        }
    }
}

fn default_workers() -> usize {
    4
}
fn default_queue_capacity() -> usize {
    64
}
fn default_pdf_page_limit() -> usize {
    30
}
fn default_max_file_size_mb() -> u64 {
    25
}

/// Retry policy for remote source adapters.
#[derive(Debug, Deserialize, Clone)]
pub struct RemoteConfig {
    #[serde(default = "default_remote_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            max_retries: default_remote_retries(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_remote_retries() -> u32 {
    1
}
fn default_backoff_base_ms() -> u64 {
    500
}
fn default_backoff_max_ms() -> u64 {
    8000
}

impl RemoteConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:35437".to_string()
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ConnectorsConfig {
    pub filesystem: Option<FilesystemConnectorConfig>,
    pub github: Option<GithubConnectorConfig>,
    pub slack: Option<SlackConnectorConfig>,
    pub notion: Option<NotionConnectorConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FilesystemConnectorConfig {
    pub root: PathBuf,
    /// Directory names pruned in addition to the built-in denylist.
    #[serde(default)]
    pub exclude_dirs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

impl FilesystemConnectorConfig {
    pub fn at(root: PathBuf) -> Self {
        Self {
            root,
            exclude_dirs: Vec::new(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GithubConnectorConfig {
    #[serde(default = "default_github_api")]
    pub api_base: String,
    #[serde(default = "default_github_raw")]
    pub raw_base: String,
    #[serde(default = "default_primary_branch")]
    pub primary_branch: String,
    #[serde(default = "default_fallback_branch")]
    pub fallback_branch: String,
}

impl Default for GithubConnectorConfig {
    fn default() -> Self {
        Self {
            api_base: default_github_api(),
            raw_base: default_github_raw(),
            primary_branch: default_primary_branch(),
            fallback_branch: default_fallback_branch(),
        }
    }
}

fn default_github_api() -> String {
    "https://api.github.com".to_string()
}
fn default_github_raw() -> String {
    "https://raw.githubusercontent.com".to_string()
}
fn default_primary_branch() -> String {
    "main".to_string()
}
fn default_fallback_branch() -> String {
    "master".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct SlackConnectorConfig {
    #[serde(default = "default_slack_api")]
    pub api_base: String,
    /// Workspace subdomain used to build message permalinks.
    #[serde(default = "default_workspace")]
    pub workspace: String,
    #[serde(default = "default_history_limit")]
    pub history_limit: u32,
}

impl Default for SlackConnectorConfig {
    fn default() -> Self {
        Self {
            api_base: default_slack_api(),
            workspace: default_workspace(),
            history_limit: default_history_limit(),
        }
    }
}

fn default_slack_api() -> String {
    "https://slack.com/api".to_string()
}
fn default_workspace() -> String {
    "app".to_string()
}
fn default_history_limit() -> u32 {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct NotionConnectorConfig {
    #[serde(default = "default_notion_api")]
    pub api_base: String,
    #[serde(default = "default_notion_version")]
    pub notion_version: String,
}

impl Default for NotionConnectorConfig {
    fn default() -> Self {
        Self {
            api_base: default_notion_api(),
            notion_version: default_notion_version(),
        }
    }
}

fn default_notion_api() -> String {
    "https://api.notion.com/v1".to_string()
}
fn default_notion_version() -> String {
    "2022-06-28".to_string()
}

impl EmbeddingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    expand_paths(&mut config);
    validate(&config)?;
    Ok(config)
}

/// Resolve a leading `~` in user-facing paths.
fn expand_paths(config: &mut Config) {
    if let Some(path) = config.credentials_path.as_mut() {
        *path = expand_tilde(path);
    }
    if let Some(fs) = config.connectors.filesystem.as_mut() {
        fs.root = expand_tilde(&fs.root);
    }
}

/// Expand `~` at the start of a path to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    if s == "~" || s.starts_with("~/") {
        if let Some(home) = home_dir() {
            return home.join(s.strip_prefix("~/").unwrap_or(""));
        }
    }
    path.to_path_buf()
}

fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}

/// Load `path` if given, else `./sift.toml` if present, else defaults.
pub fn resolve_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(p) => load_config(p),
        None => {
            let local = Path::new("sift.toml");
            if local.exists() {
                load_config(local)
            } else {
                Ok(Config::default())
            }
        }
    }
}

pub fn validate(config: &Config) -> Result<()> {
    if config.index.collection.trim().is_empty() {
        anyhow::bail!("index.collection must not be empty");
    }

    if config.ingest.workers == 0 {
        anyhow::bail!("ingest.workers must be >= 1");
    }
    if config.ingest.queue_capacity == 0 {
        anyhow::bail!("ingest.queue_capacity must be >= 1");
    }
    if config.ingest.pdf_page_limit == 0 {
        anyhow::bail!("ingest.pdf_page_limit must be >= 1");
    }
    if config.ingest.deadline_secs == Some(0) {
        anyhow::bail!("ingest.deadline_secs must be > 0 when set");
    }

    if config.remote.backoff_base_ms > config.remote.backoff_max_ms {
        anyhow::bail!("remote.backoff_base_ms must not exceed remote.backoff_max_ms");
    }

    let provider = config.embedding.provider.as_str();
    match provider {
        "hashing" => {
            if config.embedding.dims == Some(0) {
                anyhow::bail!("embedding.dims must be > 0 when provider is 'hashing'");
            }
        }
        "openai" | "ollama" => {
            if config.embedding.model.is_none() {
                anyhow::bail!(
                    "embedding.model must be specified when provider is '{}'",
                    provider
                );
            }
            if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
                anyhow::bail!("embedding.dims must be > 0 when provider is '{}'", provider);
            }
        }
        "local" => {
            if config.embedding.dims == Some(0) {
                anyhow::bail!("embedding.dims must be > 0 when provider is 'local'");
            }
        }
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be hashing, openai, ollama, or local.",
            other
        ),
    }

    Ok(())
}

/// Per-source tokens read from the JSON credentials file.
///
/// Empty strings count as absent.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Credentials {
    #[serde(default)]
    pub github_token: Option<String>,
    #[serde(default)]
    pub github_username: Option<String>,
    #[serde(default)]
    pub notion_token: Option<String>,
    #[serde(default)]
    pub slack_token: Option<String>,
}

impl Credentials {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read credentials file: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse credentials file: {}", path.display()))
    }

    /// Credentials from `config.credentials_path`, or none at all.
    pub fn for_config(config: &Config) -> Result<Self> {
        match &config.credentials_path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }

    /// Fetch a required value, failing with the key name when absent.
    pub fn require<'a>(
        value: &'a Option<String>,
        adapter: &'static str,
        key: &'static str,
    ) -> std::result::Result<&'a str, ConfigError> {
        match value.as_deref().map(str::trim) {
            Some(v) if !v.is_empty() => Ok(v),
            _ => Err(ConfigError::MissingCredential { adapter, key }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> Result<Config> {
        let config: Config = toml::from_str(s)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn empty_file_yields_defaults() {
        let c = parse("").unwrap();
        assert_eq!(c.index.collection, "siftfiles");
        assert_eq!(c.ingest.pdf_page_limit, 30);
        assert_eq!(c.ingest.id_strategy, IdStrategy::Counter);
        assert_eq!(c.remote.max_retries, 1);
        assert_eq!(c.embedding.provider, "hashing");
        assert!(c.connectors.github.is_none());
    }

    #[test]
    fn connector_sections_fill_defaults() {
        let c = parse(
            r#"
            [ingest]
            id_strategy = "content_hash"

            [connectors.github]
            primary_branch = "trunk"

            [connectors.slack]
            workspace = "acme"
            "#,
        )
        .unwrap();
        assert_eq!(c.ingest.id_strategy, IdStrategy::ContentHash);
        let gh = c.connectors.github.unwrap();
        assert_eq!(gh.primary_branch, "trunk");
        assert_eq!(gh.fallback_branch, "master");
        assert_eq!(gh.api_base, "https://api.github.com");
        assert_eq!(c.connectors.slack.unwrap().history_limit, 100);
    }

    #[test]
    fn rejects_zero_workers_and_unknown_provider() {
        assert!(parse("[ingest]\nworkers = 0").is_err());
        assert!(parse("[embedding]\nprovider = \"magic\"").is_err());
        assert!(parse("[embedding]\nprovider = \"openai\"\ndims = 8").is_err());
        assert!(parse("[embedding]\nprovider = \"openai\"\nmodel = \"m\"\ndims = 8").is_ok());
    }

    #[test]
    fn load_config_expands_home_in_paths() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("sift.toml");
        std::fs::write(
            &path,
            r#"
            credentials_path = "~/.config/sift.config.json"

            [connectors.filesystem]
            root = "~/Documents"
            "#,
        )
        .unwrap();

        let c = load_config(&path).unwrap();
        let Some(home) = home_dir() else { return };
        assert_eq!(
            c.credentials_path.unwrap(),
            home.join(".config").join("sift.config.json")
        );
        assert_eq!(c.connectors.filesystem.unwrap().root, home.join("Documents"));
    }

    #[test]
    fn expand_tilde_only_touches_a_leading_home_marker() {
        assert_eq!(expand_tilde(Path::new("/srv/notes")), PathBuf::from("/srv/notes"));
        assert_eq!(expand_tilde(Path::new("~other/notes")), PathBuf::from("~other/notes"));
        assert_eq!(expand_tilde(Path::new("notes/~")), PathBuf::from("notes/~"));
        if let Some(home) = home_dir() {
            assert_eq!(expand_tilde(Path::new("~")), home);
        }
    }

    #[test]
    fn missing_or_blank_credentials_are_errors() {
        let creds: Credentials =
            serde_json::from_str(r#"{"github_token":"t","github_username":"  "}"#).unwrap();
        assert_eq!(Credentials::require(&creds.github_token, "github", "github_token").unwrap(), "t");
        assert!(Credentials::require(&creds.github_username, "github", "github_username").is_err());
        assert!(Credentials::require(&creds.slack_token, "slack", "slack_token").is_err());
    }
}
