//! # Sift CLI (`sift`)
//!
//! ## Usage
//!
//! ```bash
//! sift [--config sift.toml] <index_path> <action> <args...>
//! ```
//!
//! ## Actions
//!
//! | Action | Description |
//! |--------|-------------|
//! | `get_or_create <collection>` | Create the collection if absent |
//! | `add <collection> <documents_json> <ids_json> [metadatas_json]` | Upsert records |
//! | `query <collection> <text> <k>` | Print the top `k` matches as JSON |
//! | `ingest [--collection c] [--source s] [--root dir]` | Run the ingestion pipeline |
//! | `serve` | Start the query HTTP server |
//! | `sources` | Show configured sources and whether they are ready |
//!
//! `get_or_create` and `add` print exactly one status line on stdout.
//! Logs go to stderr; set `RUST_LOG` to change verbosity.
//!
//! ## Exit codes
//!
//! - `0`: the action ran (a failed index operation is reported in the status line)
//! - `1`: configuration error or unreachable index
//! - `2`: malformed invocation

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};

use sift::actions::{self, AddArgs, StatusLine};
use sift::config::{self, Config, Credentials};
use sift::embedding::create_embedder;
use sift::ingest::{IngestOptions, IngestionCoordinator};
use sift::server;
use sift::sources::{self, SourceSelector};
use sift::sqlite_index::SqliteIndex;
use sift::traits::CancelToken;

/// Sift: index local files, repositories, chat and notes for semantic search.
#[derive(Parser)]
#[command(name = "sift", version)]
struct Cli {
    /// Path to configuration file (TOML). Defaults to `./sift.toml` if present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding the index database.
    index_path: PathBuf,

    #[command(subcommand)]
    action: Action,
}

#[derive(Subcommand)]
enum Action {
    /// Create a collection if it does not exist.
    #[command(name = "get_or_create")]
    GetOrCreate { collection: String },

    /// Upsert records given as JSON arrays.
    Add {
        collection: String,
        /// JSON array of document strings.
        documents_json: String,
        /// JSON array of unique ids, one per document.
        ids_json: String,
        /// JSON array of metadata objects (`filepath`, `extension`, `size`, `location`).
        metadatas_json: Option<String>,
    },

    /// Print the top `k` matches for `text`.
    Query {
        collection: String,
        text: String,
        k: usize,
    },

    /// Scan sources and upsert their content.
    Ingest {
        /// Target collection. Defaults to `[index].collection`.
        #[arg(long)]
        collection: Option<String>,

        /// `all`, `filesystem`, `github`, `slack`, or `notion`.
        #[arg(long, default_value = "all")]
        source: String,

        /// Filesystem root, overriding `[connectors.filesystem].root`.
        #[arg(long)]
        root: Option<PathBuf>,
    },

    /// Serve `GET /query/{text}/{k}` over the index.
    Serve,

    /// List sources and their readiness.
    Sources,
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sift=info,sift_core=info".into()),
        )
        .with_ansi(false)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn open_index(cfg: &Config, index_path: &Path) -> anyhow::Result<SqliteIndex> {
    let embedder = create_embedder(&cfg.embedding)?;
    SqliteIndex::open(index_path, embedder)
        .await
        .with_context(|| format!("Cannot open index at {}", index_path.display()))
}

/// Open an index that must already exist, for read-only actions.
async fn open_existing_index(cfg: &Config, index_path: &Path) -> anyhow::Result<SqliteIndex> {
    let embedder = create_embedder(&cfg.embedding)?;
    SqliteIndex::open_existing(index_path, embedder)
        .await
        .with_context(|| format!("Cannot open index at {}", index_path.display()))
}

/// Print the status line and map an unusable index to exit code 1.
fn report_unreachable(e: anyhow::Error) -> ExitCode {
    println!("{}", StatusLine::failed(format!("{:#}", e)).render());
    tracing::error!("{:#}", e);
    ExitCode::FAILURE
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let cfg = config::resolve_config(cli.config.as_deref())?;

    match cli.action {
        Action::GetOrCreate { collection } => {
            let index = match open_index(&cfg, &cli.index_path).await {
                Ok(index) => index,
                Err(e) => return Ok(report_unreachable(e)),
            };
            let status = StatusLine::from(actions::get_or_create(&index, &collection).await);
            println!("{}", status.render());
        }
        Action::Add {
            collection,
            documents_json,
            ids_json,
            metadatas_json,
        } => {
            let args = match AddArgs::parse(&documents_json, &ids_json, metadatas_json.as_deref()) {
                Ok(args) => args,
                Err(e) => {
                    println!("{}", StatusLine::failed(&e).render());
                    return Ok(ExitCode::from(2));
                }
            };
            let index = match open_index(&cfg, &cli.index_path).await {
                Ok(index) => index,
                Err(e) => return Ok(report_unreachable(e)),
            };
            let status = StatusLine::from(actions::add(&index, &collection, args).await);
            println!("{}", status.render());
        }
        Action::Query {
            collection,
            text,
            k,
        } => {
            let index = open_existing_index(&cfg, &cli.index_path).await?;
            match actions::query(&index, &collection, &text, k).await {
                Ok(results) => println!("{}", serde_json::to_string(&results)?),
                Err(e) => println!("{}", StatusLine::failed(e).render()),
            }
        }
        Action::Ingest {
            collection,
            source,
            root,
        } => {
            let selector: SourceSelector = source.parse()?;
            let credentials = Credentials::for_config(&cfg)?;
            let adapters = sources::build_adapters(&cfg, &credentials, selector, root)?;
            if adapters.is_empty() {
                anyhow::bail!("No sources configured. Add a [connectors.*] table or pass --root.");
            }

            let index = open_index(&cfg, &cli.index_path).await?;
            let collection = collection.unwrap_or_else(|| cfg.index.collection.clone());
            let coordinator =
                IngestionCoordinator::new(Arc::new(index), IngestOptions::from_config(&cfg.ingest));

            let cancel = CancelToken::new();
            {
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        tracing::warn!("interrupt received; cancelling ingestion");
                        cancel.cancel();
                    }
                });
            }

            let report = coordinator.run(&collection, &adapters, cancel).await?;
            println!("{}", serde_json::to_string(&report)?);
        }
        Action::Serve => {
            let index = open_existing_index(&cfg, &cli.index_path).await?;
            server::run_server(&cfg, Arc::new(index)).await?;
        }
        Action::Sources => {
            let credentials = Credentials::for_config(&cfg)?;
            sources::list_sources(&cfg, &credentials);
        }
    }

    Ok(ExitCode::SUCCESS)
}
