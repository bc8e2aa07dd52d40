//! Source selection and construction.
//!
//! Turns `[connectors.*]` tables plus credentials into ready-to-scan
//! adapters. Construction fails fast on missing tokens so nothing is
//! fetched with an incomplete configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use serde::Serialize;

use crate::config::{Config, Credentials, FilesystemConnectorConfig};
use crate::connector_fs::FilesystemAdapter;
use crate::connector_github::GithubAdapter;
use crate::connector_notion::NotionAdapter;
use crate::connector_slack::SlackAdapter;
use crate::error::ConfigError;
use crate::traits::SourceAdapter;

/// Which adapters an ingestion run should include.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceSelector {
    All,
    Filesystem,
    Github,
    Slack,
    Notion,
}

impl FromStr for SourceSelector {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(SourceSelector::All),
            "filesystem" | "fs" | "local" => Ok(SourceSelector::Filesystem),
            "github" => Ok(SourceSelector::Github),
            "slack" => Ok(SourceSelector::Slack),
            "notion" => Ok(SourceSelector::Notion),
            other => Err(ConfigError::UnknownSource(other.to_string())),
        }
    }
}

impl SourceSelector {
    fn includes(&self, other: SourceSelector) -> bool {
        *self == SourceSelector::All || *self == other
    }
}

/// Build the adapters selected by `selector`.
///
/// With `All`, only configured sources are included. Naming a single
/// source that is not configured is an error. `root_override` replaces
/// (or supplies) the filesystem root.
pub fn build_adapters(
    config: &Config,
    credentials: &Credentials,
    selector: SourceSelector,
    root_override: Option<PathBuf>,
) -> Result<Vec<Arc<dyn SourceAdapter>>, ConfigError> {
    let mut adapters: Vec<Arc<dyn SourceAdapter>> = Vec::new();
    let connectors = &config.connectors;
    let explicit = selector != SourceSelector::All;

    if selector.includes(SourceSelector::Filesystem) {
        let fs = match (root_override, &connectors.filesystem) {
            (Some(root), Some(cfg)) => Some(FilesystemConnectorConfig {
                root,
                ..cfg.clone()
            }),
            (Some(root), None) => Some(FilesystemConnectorConfig::at(root)),
            (None, cfg) => cfg.clone(),
        };
        match fs {
            Some(cfg) => adapters.push(Arc::new(FilesystemAdapter::new(
                cfg,
                config.ingest.max_file_size_mb,
            )?)),
            None if explicit => return Err(ConfigError::NotConfigured("filesystem".into())),
            None => {}
        }
    }

    if selector.includes(SourceSelector::Github) {
        match &connectors.github {
            Some(cfg) => adapters.push(Arc::new(GithubAdapter::new(
                cfg.clone(),
                credentials,
                &config.remote,
            )?)),
            None if explicit => return Err(ConfigError::NotConfigured("github".into())),
            None => {}
        }
    }

    if selector.includes(SourceSelector::Slack) {
        match &connectors.slack {
            Some(cfg) => adapters.push(Arc::new(SlackAdapter::new(
                cfg.clone(),
                credentials,
                &config.remote,
            )?)),
            None if explicit => return Err(ConfigError::NotConfigured("slack".into())),
            None => {}
        }
    }

    if selector.includes(SourceSelector::Notion) {
        match &connectors.notion {
            Some(cfg) => adapters.push(Arc::new(NotionAdapter::new(
                cfg.clone(),
                credentials,
                &config.remote,
            )?)),
            None if explicit => return Err(ConfigError::NotConfigured("notion".into())),
            None => {}
        }
    }

    Ok(adapters)
}

/// One row of `sift sources`.
#[derive(Debug, Clone, Serialize)]
pub struct SourceStatus {
    pub name: &'static str,
    pub configured: bool,
    /// Root exists (filesystem) or required credentials are present.
    pub ready: bool,
    pub detail: String,
}

pub fn source_statuses(config: &Config, credentials: &Credentials) -> Vec<SourceStatus> {
    let connectors = &config.connectors;
    let has = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());

    let filesystem = match &connectors.filesystem {
        Some(fs) if fs.root.is_dir() => status("filesystem", true, true, fs.root.display().to_string()),
        Some(fs) => status(
            "filesystem",
            true,
            false,
            format!("root does not exist: {}", fs.root.display()),
        ),
        None => status("filesystem", false, false, String::new()),
    };

    let github = credential_status(
        "github",
        connectors.github.is_some(),
        &[
            ("github_token", has(&credentials.github_token)),
            ("github_username", has(&credentials.github_username)),
        ],
    );
    let slack = credential_status(
        "slack",
        connectors.slack.is_some(),
        &[("slack_token", has(&credentials.slack_token))],
    );
    let notion = credential_status(
        "notion",
        connectors.notion.is_some(),
        &[("notion_token", has(&credentials.notion_token))],
    );

    vec![filesystem, github, slack, notion]
}

fn status(name: &'static str, configured: bool, ready: bool, detail: String) -> SourceStatus {
    SourceStatus {
        name,
        configured,
        ready,
        detail,
    }
}

fn credential_status(name: &'static str, configured: bool, keys: &[(&str, bool)]) -> SourceStatus {
    let missing: Vec<&str> = keys.iter().filter(|(_, ok)| !ok).map(|(k, _)| *k).collect();
    let detail = if missing.is_empty() {
        String::new()
    } else {
        format!("missing {}", missing.join(", "))
    };
    status(name, configured, configured && missing.is_empty(), detail)
}

pub fn list_sources(config: &Config, credentials: &Credentials) {
    println!("{:<12} {:<12} {:<6} DETAIL", "SOURCE", "STATUS", "READY");
    for s in source_statuses(config, credentials) {
        let state = if s.configured { "CONFIGURED" } else { "-" };
        println!("{:<12} {:<12} {:<6} {}", s.name, state, s.ready, s.detail);
    }
}
