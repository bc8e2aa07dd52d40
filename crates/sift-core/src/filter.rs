//! Content eligibility filter.
//!
//! A [`ContentFilter`] is a pure predicate over an item's name and
//! extension. It combines three rules:
//!
//! 1. hidden names (leading `.`) are never eligible;
//! 2. a fixed extension denylist (archives, binaries, media, databases, ...);
//! 3. a per-source list of name substrings (repository sources reject
//!    lockfiles, configuration, fonts, and similar noise).
//!
//! Directory pruning uses a separate name denylist via
//! [`ContentFilter::eligible_dir`]. All comparisons are case-insensitive.

/// Extensions that never carry indexable content.
pub const DENIED_EXTENSIONS: &[&str] = &[
    "dmg", "zip", "xls", "xlsx", "csv", "tar", "gz", "bz2", "xz", "7z", "rar", "iso", "exe", "dll",
    "bin", "so", "obj", "class", "o", "pyc", "lock", "lockb", "log", "tmp", "config", "cfg", "ini",
    "plist", "db", "db-wal", "db-shm", "mp4", "mpeg4", "mov", "avi", "mkv", "flv", "wmv", "webm",
    "sh", "photoslibrary",
];

/// Directory names pruned from local traversal.
pub const DENIED_DIRS: &[&str] = &[
    "node_modules",
    "venv",
    ".venv",
    "__pycache__",
    ".git",
    "target",
    "adobe",
    "library",
    "libraries",
    "lib",
];

/// Name substrings rejected for repository files.
pub const REPOSITORY_DENIED_SUBSTRINGS: &[&str] = &[
    "lock", "config", "xml", "yml", "yaml", "ttf", "png", "jpg", "jpeg", "toml", "svg", "csv",
    "pickle", "ico", "env", "bin", "csharp", "mp4", "webp", "avif", "woff", "__init__",
];

/// Directory names pruned from repository traversal.
pub const REPOSITORY_DENIED_DIRS: &[&str] = &["target", "dist", "build", "node_modules", "vendor"];

/// Eligibility predicate shared by the adapters and the coordinator.
#[derive(Debug, Clone)]
pub struct ContentFilter {
    denied_extensions: Vec<String>,
    denied_substrings: Vec<String>,
    denied_dirs: Vec<String>,
}

impl Default for ContentFilter {
    fn default() -> Self {
        Self::filesystem()
    }
}

impl ContentFilter {
    /// Filter for local filesystem trees.
    pub fn filesystem() -> Self {
        Self {
            denied_extensions: lowered(DENIED_EXTENSIONS),
            denied_substrings: Vec::new(),
            denied_dirs: lowered(DENIED_DIRS),
        }
    }

    /// Filter for repository hosts: the extension denylist plus
    /// repository-specific name substrings and build directories.
    pub fn repository() -> Self {
        Self {
            denied_extensions: lowered(DENIED_EXTENSIONS),
            denied_substrings: lowered(REPOSITORY_DENIED_SUBSTRINGS),
            denied_dirs: lowered(REPOSITORY_DENIED_DIRS),
        }
    }

    /// Filter for message and page sources, whose items have no extension.
    /// Only the hidden-name rule applies.
    pub fn messages() -> Self {
        Self {
            denied_extensions: Vec::new(),
            denied_substrings: Vec::new(),
            denied_dirs: Vec::new(),
        }
    }

    /// Add extra directory names to prune.
    pub fn with_denied_dirs<I, S>(mut self, dirs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.denied_dirs
            .extend(dirs.into_iter().map(|d| d.as_ref().to_ascii_lowercase()));
        self
    }

    /// Whether a file-like item may be indexed.
    pub fn eligible(&self, name: &str, extension: &str) -> bool {
        if is_hidden(name) {
            return false;
        }
        let ext = extension.trim_start_matches('.').to_ascii_lowercase();
        if !ext.is_empty() && self.denied_extensions.iter().any(|d| *d == ext) {
            return false;
        }
        let lower = name.to_ascii_lowercase();
        !self.denied_substrings.iter().any(|s| lower.contains(s.as_str()))
    }

    /// Whether a directory should be descended into.
    pub fn eligible_dir(&self, name: &str) -> bool {
        if is_hidden(name) {
            return false;
        }
        let lower = name.to_ascii_lowercase();
        !self.denied_dirs.iter().any(|d| *d == lower)
    }
}

fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

fn lowered(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_ascii_lowercase()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hidden_names_are_never_eligible() {
        for filter in [
            ContentFilter::filesystem(),
            ContentFilter::repository(),
            ContentFilter::messages(),
        ] {
            assert!(!filter.eligible(".hidden", ""));
            assert!(!filter.eligible(".env", "env"));
            assert!(!filter.eligible_dir(".cache"));
        }
    }

    #[test]
    fn denylisted_extensions_rejected_in_any_case() {
        let f = ContentFilter::filesystem();
        assert!(!f.eligible("archive.zip", "zip"));
        assert!(!f.eligible("ARCHIVE.ZIP", "ZIP"));
        assert!(!f.eligible("data.db-wal", "db-wal"));
        assert!(f.eligible("notes.txt", "txt"));
        assert!(f.eligible("README", ""));
    }

    #[test]
    fn every_denied_extension_is_rejected() {
        let f = ContentFilter::filesystem();
        for ext in DENIED_EXTENSIONS {
            assert!(!f.eligible(&format!("file.{ext}"), ext), "{ext} accepted");
        }
    }

    #[test]
    fn repository_filter_rejects_noise_substrings() {
        let f = ContentFilter::repository();
        assert!(!f.eligible("Cargo.lock", "lock"));
        assert!(!f.eligible("tsconfig.json", "json"));
        assert!(!f.eligible("__init__.py", "py"));
        assert!(!f.eligible("docker-compose.yml", "yml"));
        assert!(f.eligible("README.md", "md"));
        assert!(f.eligible("main.rs", "rs"));
    }

    #[test]
    fn directory_denylist_and_extras() {
        let f = ContentFilter::filesystem().with_denied_dirs(["Scratch"]);
        assert!(!f.eligible_dir("node_modules"));
        assert!(!f.eligible_dir("Library"));
        assert!(!f.eligible_dir("scratch"));
        assert!(f.eligible_dir("notes"));

        let r = ContentFilter::repository();
        assert!(!r.eligible_dir("dist"));
        assert!(r.eligible_dir("src"));
    }

    #[test]
    fn message_filter_accepts_extensionless_items() {
        let f = ContentFilter::messages();
        assert!(f.eligible("general-p1700000000000100", ""));
    }
}
