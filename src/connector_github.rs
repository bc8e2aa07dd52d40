//! GitHub repository source adapter.
//!
//! 1. `GET {api}/search/repositories?q=user:{username}` lists repositories.
//!    Failure here aborts the adapter.
//! 2. Each repository is walked through the contents API
//!    (`GET {api}/repos/{user}/{repo}/contents/{path}`) with an explicit
//!    stack. A failed directory listing drops that subtree only.
//! 3. Eligible files are fetched raw from `{raw}/{user}/{repo}/{branch}/{path}`
//!    on the primary branch, retried once on the fallback branch when the
//!    primary returns 404. Other fetch failures skip the file.

use async_trait::async_trait;
use serde::Deserialize;
use sift_core::filter::ContentFilter;
use sift_core::models::{ContentType, RawItem, SourceKind};

use crate::config::{Credentials, GithubConnectorConfig, RemoteConfig};
use crate::error::{ConfigError, SourceError};
use crate::http::{join_url, RemoteClient};
use crate::traits::{CancelToken, ItemSink, ScanReport, SourceAdapter};

pub struct GithubAdapter {
    name: String,
    config: GithubConnectorConfig,
    username: String,
    client: RemoteClient,
    filter: ContentFilter,
}

#[derive(Debug, Deserialize)]
struct RepoSearch {
    #[serde(default)]
    items: Vec<Repo>,
}

#[derive(Debug, Deserialize)]
struct Repo {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ContentEntry {
    #[serde(rename = "type")]
    kind: String,
    name: String,
    path: String,
    #[serde(default)]
    html_url: Option<String>,
}

impl GithubAdapter {
    pub fn new(
        config: GithubConnectorConfig,
        credentials: &Credentials,
        remote: &RemoteConfig,
    ) -> Result<Self, ConfigError> {
        let token = Credentials::require(&credentials.github_token, "github", "github_token")?;
        let username =
            Credentials::require(&credentials.github_username, "github", "github_username")?;
        let client = RemoteClient::new(
            remote,
            token,
            &[
                ("accept", "application/vnd.github+json"),
                ("x-github-api-version", "2022-11-28"),
            ],
        )?;
        Ok(Self {
            name: "github".to_string(),
            config,
            username: username.to_string(),
            client,
            filter: ContentFilter::repository(),
        })
    }

    async fn list_repositories(&self, cancel: &CancelToken) -> Result<Vec<Repo>, SourceError> {
        let mut url = join_url(&self.config.api_base, &["search", "repositories"])?;
        url.query_pairs_mut()
            .append_pair("q", &format!("user:{}", self.username))
            .append_pair("per_page", "100");
        let json = self.client.get_json(&url, cancel).await?;
        let search: RepoSearch = serde_json::from_value(json).map_err(|e| SourceError::Protocol {
            url: url.to_string(),
            detail: e.to_string(),
        })?;
        Ok(search.items)
    }

    async fn list_dir(
        &self,
        repo: &str,
        path: &str,
        cancel: &CancelToken,
    ) -> Result<Vec<ContentEntry>, SourceError> {
        let url = join_url(
            &self.config.api_base,
            &["repos", &self.username, repo, "contents", path],
        )?;
        let json = self.client.get_json(&url, cancel).await?;
        serde_json::from_value(json).map_err(|e| SourceError::Protocol {
            url: url.to_string(),
            detail: e.to_string(),
        })
    }

    /// Raw file bytes from the primary branch, or the fallback branch when
    /// the primary has no such file.
    async fn fetch_raw(
        &self,
        repo: &str,
        path: &str,
        cancel: &CancelToken,
    ) -> Result<Vec<u8>, SourceError> {
        match self.fetch_branch(repo, &self.config.primary_branch, path, cancel).await {
            Err(e) if e.is_not_found() => {
                tracing::debug!(repo, path, branch = %self.config.fallback_branch, "retrying on fallback branch");
                self.fetch_branch(repo, &self.config.fallback_branch, path, cancel)
                    .await
            }
            other => other,
        }
    }

    async fn fetch_branch(
        &self,
        repo: &str,
        branch: &str,
        path: &str,
        cancel: &CancelToken,
    ) -> Result<Vec<u8>, SourceError> {
        let url = join_url(&self.config.raw_base, &[&self.username, repo, branch, path])?;
        let response = self.client.get(&url, cancel).await?;
        let bytes = response.bytes().await.map_err(|e| SourceError::Transient {
            url: url.to_string(),
            detail: e.to_string(),
        })?;
        Ok(bytes.to_vec())
    }

    async fn scan_repository(
        &self,
        repo: &str,
        sink: &ItemSink,
        report: &mut ScanReport,
    ) -> Result<(), SourceError> {
        let cancel = sink.cancel_token();
        let mut stack = vec![String::new()];

        while let Some(dir) = stack.pop() {
            let entries = match self.list_dir(repo, &dir, cancel).await {
                Ok(entries) => entries,
                Err(SourceError::Cancelled) => return Err(SourceError::Cancelled),
                Err(e) if e.is_auth() => return Err(e),
                Err(e) => {
                    tracing::warn!(repo, dir = %dir, error = %e, "directory listing failed; skipping subtree");
                    report.record_failure(format!("{repo}/{dir}: {e}"));
                    continue;
                }
            };

            for entry in entries {
                match entry.kind.as_str() {
                    "dir" => {
                        if self.filter.eligible_dir(&entry.name) {
                            stack.push(entry.path);
                        }
                    }
                    "file" => {
                        let extension = extension_of(&entry.name);
                        if !self.filter.eligible(&entry.name, &extension) {
                            continue;
                        }
                        let bytes = match self.fetch_raw(repo, &entry.path, cancel).await {
                            Ok(b) => b,
                            Err(SourceError::Cancelled) => return Err(SourceError::Cancelled),
                            Err(e) if e.is_auth() => return Err(e),
                            Err(e) => {
                                tracing::warn!(repo, path = %entry.path, error = %e, "skipping file");
                                report.record_failure(format!("{repo}/{}: {e}", entry.path));
                                continue;
                            }
                        };
                        let location = entry.html_url.clone().unwrap_or_else(|| {
                            format!("https://github.com/{}/{repo}/blob/{}/{}", self.username, self.config.primary_branch, entry.path)
                        });
                        sink.emit(RawItem {
                            content_type: ContentType::from_extension(&extension),
                            name: entry.name,
                            extension,
                            location,
                            size: bytes.len() as u64,
                            bytes,
                            kind: SourceKind::Repository,
                        })
                        .await?;
                        report.emitted += 1;
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }
}

fn extension_of(name: &str) -> String {
    std::path::Path::new(name)
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default()
}

#[async_trait]
impl SourceAdapter for GithubAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Repository
    }

    fn filter(&self) -> &ContentFilter {
        &self.filter
    }

    async fn scan(&self, sink: ItemSink) -> Result<ScanReport, SourceError> {
        let repos = self.list_repositories(sink.cancel_token()).await?;
        tracing::info!(user = %self.username, repos = repos.len(), "listing GitHub repositories");

        let mut report = ScanReport::default();
        for repo in repos {
            if repo.name.starts_with('.') {
                continue;
            }
            self.scan_repository(&repo.name, &sink, &mut report).await?;
        }
        Ok(report)
    }
}
