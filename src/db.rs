use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Database file created inside the index directory.
pub const DB_FILE: &str = "sift.sqlite";

pub fn db_path(index_dir: &Path) -> PathBuf {
    index_dir.join(DB_FILE)
}

/// Open (creating if needed) the index database under `index_dir`.
pub async fn connect(index_dir: &Path) -> Result<SqlitePool> {
    std::fs::create_dir_all(index_dir)
        .with_context(|| format!("Cannot create index directory: {}", index_dir.display()))?;
    open_pool(&db_path(index_dir), true).await
}

/// Open an index database that must already exist. Nothing is created on disk.
pub async fn connect_existing(index_dir: &Path) -> Result<SqlitePool> {
    let path = db_path(index_dir);
    if !path.is_file() {
        anyhow::bail!("No index database at {}", path.display());
    }
    open_pool(&path, false).await
}

async fn open_pool(path: &Path, create: bool) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
        .create_if_missing(create)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .with_context(|| format!("Cannot open index database: {}", path.display()))?;

    Ok(pool)
}
