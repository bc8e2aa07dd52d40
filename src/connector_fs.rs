//! Local filesystem source adapter.
//!
//! Walks a root directory depth-first with `walkdir` on the blocking
//! pool. Hidden entries, denylisted directory names, exclude globs, and
//! oversized files are pruned before any bytes are read. Directory
//! identities (device and inode on Unix, canonical path elsewhere) are
//! tracked so a symlinked directory is never walked twice and symlink
//! cycles terminate.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use globset::{Glob, GlobSet, GlobSetBuilder};
use sift_core::filter::ContentFilter;
use sift_core::models::{ContentType, RawItem, SourceKind};
use walkdir::WalkDir;

use crate::config::FilesystemConnectorConfig;
use crate::error::{ConfigError, SourceError};
use crate::traits::{ItemSink, ScanReport, SourceAdapter};

pub struct FilesystemAdapter {
    name: String,
    config: FilesystemConnectorConfig,
    filter: ContentFilter,
    excludes: GlobSet,
    max_file_bytes: u64,
}

impl FilesystemAdapter {
    pub fn new(config: FilesystemConnectorConfig, max_file_size_mb: u64) -> Result<Self, ConfigError> {
        let excludes = build_globset(&config.exclude_globs)?;
        let filter = ContentFilter::filesystem().with_denied_dirs(&config.exclude_dirs);
        Ok(Self {
            name: "filesystem".to_string(),
            config,
            filter,
            excludes,
            max_file_bytes: max_file_size_mb.saturating_mul(1024 * 1024),
        })
    }
}

#[async_trait]
impl SourceAdapter for FilesystemAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Local
    }

    fn filter(&self) -> &ContentFilter {
        &self.filter
    }

    async fn scan(&self, sink: ItemSink) -> Result<ScanReport, SourceError> {
        let root = self.config.root.clone();
        if !root.is_dir() {
            return Err(SourceError::Config(format!(
                "filesystem root is not a directory: {}",
                root.display()
            )));
        }

        let walk = Walk {
            root,
            follow_links: self.config.follow_symlinks,
            filter: self.filter.clone(),
            excludes: self.excludes.clone(),
            max_file_bytes: self.max_file_bytes,
        };
        tokio::task::spawn_blocking(move || walk.run(&sink))
            .await
            .map_err(|e| SourceError::Io(std::io::Error::other(e.to_string())))?
    }
}

struct Walk {
    root: PathBuf,
    follow_links: bool,
    filter: ContentFilter,
    excludes: GlobSet,
    max_file_bytes: u64,
}

#[derive(Debug, Hash, PartialEq, Eq)]
enum DirIdentity {
    #[cfg_attr(not(unix), allow(dead_code))]
    Inode(u64, u64),
    #[cfg_attr(unix, allow(dead_code))]
    Path(PathBuf),
}

impl Walk {
    fn run(&self, sink: &ItemSink) -> Result<ScanReport, SourceError> {
        let mut report = ScanReport::default();
        let mut visited: HashSet<DirIdentity> = HashSet::new();

        let walker = WalkDir::new(&self.root)
            .follow_links(self.follow_links)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                if entry.depth() == 0 {
                    if let Some(id) = dir_identity(entry.path()) {
                        visited.insert(id);
                    }
                    return true;
                }
                let name = entry.file_name().to_string_lossy();
                if !entry.file_type().is_dir() {
                    return !name.starts_with('.');
                }
                if !self.filter.eligible_dir(&name) || self.is_excluded(entry.path()) {
                    tracing::debug!(path = %entry.path().display(), "pruned directory");
                    return false;
                }
                match dir_identity(entry.path()) {
                    Some(id) => {
                        let first_visit = visited.insert(id);
                        if !first_visit {
                            tracing::debug!(path = %entry.path().display(), "directory already visited");
                        }
                        first_visit
                    }
                    None => true,
                }
            });

        for entry in walker {
            sink.cancel_token().check()?;

            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    if e.loop_ancestor().is_some() {
                        tracing::debug!(error = %e, "skipping symlink cycle");
                    } else {
                        tracing::warn!(error = %e, "filesystem walk error");
                        report.record_failure(e.to_string());
                    }
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let name = entry.file_name().to_string_lossy().to_string();
            let extension = path
                .extension()
                .map(|e| e.to_string_lossy().to_ascii_lowercase())
                .unwrap_or_default();

            if !self.filter.eligible(&name, &extension) || self.is_excluded(path) {
                tracing::debug!(path = %path.display(), "filtered");
                continue;
            }

            let size = match entry.metadata() {
                Ok(m) => m.len(),
                Err(e) => {
                    report.record_failure(format!("{}: {e}", path.display()));
                    continue;
                }
            };
            if size > self.max_file_bytes {
                tracing::debug!(path = %path.display(), size, "file exceeds size cap");
                report.record_failure(format!("{}: exceeds size cap ({size} bytes)", path.display()));
                continue;
            }

            let bytes = match std::fs::read(path) {
                Ok(b) => b,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "failed to read file");
                    report.record_failure(format!("{}: {e}", path.display()));
                    continue;
                }
            };

            sink.blocking_emit(RawItem {
                content_type: ContentType::from_extension(&extension),
                name,
                extension,
                location: path.display().to_string(),
                size,
                bytes,
                kind: SourceKind::Local,
            })?;
            report.emitted += 1;
        }

        Ok(report)
    }

    fn is_excluded(&self, path: &Path) -> bool {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        self.excludes.is_match(relative)
    }
}

#[cfg(unix)]
fn dir_identity(path: &Path) -> Option<DirIdentity> {
    use std::os::unix::fs::MetadataExt;
    let meta = std::fs::metadata(path).ok()?;
    Some(DirIdentity::Inode(meta.dev(), meta.ino()))
}

#[cfg(not(unix))]
fn dir_identity(path: &Path) -> Option<DirIdentity> {
    std::fs::canonicalize(path).ok().map(DirIdentity::Path)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet, ConfigError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| ConfigError::Invalid(format!("bad exclude glob '{pattern}': {e}")))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| ConfigError::Invalid(format!("bad exclude globs: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::CancelToken;
    use tokio::sync::mpsc;

    async fn collect(adapter: &FilesystemAdapter) -> (Vec<RawItem>, ScanReport) {
        let (tx, mut rx) = mpsc::channel(64);
        let sink = ItemSink::new(tx, CancelToken::new());
        let report = adapter.scan(sink).await.unwrap();
        let mut items = Vec::new();
        while let Some(item) = rx.recv().await {
            items.push(item);
        }
        items.sort_by(|a, b| a.location.cmp(&b.location));
        (items, report)
    }

    fn names(items: &[RawItem]) -> Vec<&str> {
        items.iter().map(|i| i.name.as_str()).collect()
    }

    #[tokio::test]
    async fn skips_hidden_denylisted_and_pruned_entries() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        std::fs::write(root.join("notes.txt"), "hello world").unwrap();
        std::fs::write(root.join("archive.zip"), "PK").unwrap();
        std::fs::write(root.join(".hidden"), "secret").unwrap();
        std::fs::create_dir_all(root.join("node_modules/pkg")).unwrap();
        std::fs::write(root.join("node_modules/pkg/index.js"), "x").unwrap();
        std::fs::create_dir_all(root.join(".cache")).unwrap();
        std::fs::write(root.join(".cache/entry.txt"), "x").unwrap();
        std::fs::create_dir_all(root.join("docs")).unwrap();
        std::fs::write(root.join("docs/guide.md"), "# Guide").unwrap();

        let adapter =
            FilesystemAdapter::new(FilesystemConnectorConfig::at(root.to_path_buf()), 25).unwrap();
        let (items, report) = collect(&adapter).await;

        assert_eq!(names(&items), vec!["guide.md", "notes.txt"]);
        assert_eq!(report.emitted, 2);
        let notes = &items[1];
        assert_eq!(notes.extension, "txt");
        assert_eq!(notes.size, 11);
        assert_eq!(notes.content_type, ContentType::PlainText);
    }

    #[tokio::test]
    async fn exclude_globs_and_extra_dirs_apply() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        std::fs::create_dir_all(root.join("drafts")).unwrap();
        std::fs::create_dir_all(root.join("scratch")).unwrap();
        std::fs::write(root.join("drafts/a.md"), "a").unwrap();
        std::fs::write(root.join("scratch/b.md"), "b").unwrap();
        std::fs::write(root.join("keep.md"), "c").unwrap();

        let mut cfg = FilesystemConnectorConfig::at(root.to_path_buf());
        cfg.exclude_globs = vec!["drafts/**".into()];
        cfg.exclude_dirs = vec!["scratch".into()];
        let adapter = FilesystemAdapter::new(cfg, 25).unwrap();
        let (items, _) = collect(&adapter).await;
        assert_eq!(names(&items), vec!["keep.md"]);
    }

    #[tokio::test]
    async fn oversized_files_are_reported_not_read() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("big.txt"), vec![b'a'; 2 * 1024 * 1024]).unwrap();
        let adapter =
            FilesystemAdapter::new(FilesystemConnectorConfig::at(tmp.path().to_path_buf()), 1)
                .unwrap();
        let (items, report) = collect(&adapter).await;
        assert!(items.is_empty());
        assert_eq!(report.failures.len(), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn symlink_cycles_terminate() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        std::fs::create_dir_all(root.join("a/b")).unwrap();
        std::fs::write(root.join("a/b/leaf.txt"), "leaf").unwrap();
        std::os::unix::fs::symlink(root.join("a"), root.join("a/b/back")).unwrap();
        std::os::unix::fs::symlink(root.join("a"), root.join("alias")).unwrap();

        let mut cfg = FilesystemConnectorConfig::at(root.to_path_buf());
        cfg.follow_symlinks = true;
        let adapter = FilesystemAdapter::new(cfg, 25).unwrap();
        let (items, _) = tokio::time::timeout(std::time::Duration::from_secs(10), collect(&adapter))
            .await
            .expect("walk did not terminate");
        assert_eq!(names(&items), vec!["leaf.txt"]);
    }

    #[tokio::test]
    async fn missing_root_fails_the_adapter() {
        let adapter = FilesystemAdapter::new(
            FilesystemConnectorConfig::at(PathBuf::from("/definitely/not/here")),
            25,
        )
        .unwrap();
        let (tx, _rx) = mpsc::channel(1);
        let err = adapter
            .scan(ItemSink::new(tx, CancelToken::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Config(_)));
    }
}
