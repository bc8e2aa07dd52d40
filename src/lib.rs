//! # Sift
//!
//! A personal content indexer: pulls files, repositories, chat messages and
//! notes into a vector index and answers similarity queries over it.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐   ┌──────────────────────┐   ┌───────────┐
//! │ Source adapters   │──▶│ Ingestion coordinator │──▶│  Vector   │
//! │ FS/GitHub/Slack/  │   │ filter → extract → id │   │  index    │
//! │ Notion            │   │ → single writer       │   │ (SQLite)  │
//! └──────────────────┘   └──────────────────────┘   └────┬──────┘
//!                                                        │
//!                               ┌────────────────────────┤
//!                               ▼                        ▼
//!                          ┌──────────┐            ┌──────────┐
//!                          │   CLI    │            │   HTTP   │
//!                          │  (sift)  │            │  /query  │
//!                          └──────────┘            └──────────┘
//! ```
//!
//! Domain types, the content filter, id allocation, embedders and the
//! index traits live in `sift-core`; this crate holds the adapters, the
//! pipeline, persistence and the front ends.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and JSON credentials |
//! | [`traits`] | `SourceAdapter`, item sink, cancellation |
//! | [`connector_fs`] | Local filesystem adapter |
//! | [`connector_github`] | GitHub repository adapter |
//! | [`connector_slack`] | Slack workspace adapter |
//! | [`connector_notion`] | Notion workspace adapter |
//! | [`http`] | Shared HTTP client with retry and backoff |
//! | [`extract`] | Text, PDF, docx and image extraction |
//! | [`ingest`] | Ingestion coordinator and run report |
//! | [`embedding`] | Embedding provider construction |
//! | [`sqlite_index`] | Persistent vector index |
//! | [`query`] | Query service and response envelope |
//! | [`server`] | Query HTTP server |
//! | [`actions`] | CLI index actions and status lines |
//! | [`sources`] | Source selection and readiness |

pub mod actions;
pub mod config;
pub mod connector_fs;
pub mod connector_github;
pub mod connector_notion;
pub mod connector_slack;
pub mod db;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod http;
pub mod ingest;
pub mod migrate;
pub mod query;
pub mod server;
pub mod sources;
pub mod sqlite_index;
pub mod traits;
