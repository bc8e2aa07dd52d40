//! Query HTTP server.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/query/{text}/{k}` | Top-`k` matches for `text` in the served collection |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Response Contract
//!
//! `/query` always answers HTTP 200 with a [`QueryEnvelope`]:
//!
//! ```json
//! { "status": "200", "results": [ { "id": "txt0", "score": 0.5, "distance": 0.5, "document": "...", "metadata": {} } ] }
//! { "status": "500", "error": "collection 'siftfiles' does not exist" }
//! ```
//!
//! A `k` that is not a positive integer yields the failure envelope.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted. There is no
//! authentication.

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::query::{QueryEnvelope, QueryService};
use sift_core::index::VectorIndex;

#[derive(Clone)]
struct AppState {
    service: QueryService,
}

/// Build the router over `service`. Exposed for in-process tests.
pub fn router(service: QueryService) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/query/{text}/{k}", get(handle_query))
        .route("/health", get(handle_health))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { service })
}

/// Serve `[index].collection` from `index` on `[server].bind` until the
/// process is terminated.
pub async fn run_server(config: &Config, index: Arc<dyn VectorIndex>) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let service = QueryService::new(index, config.index.collection.clone());
    let collection = service.collection().to_string();
    let app = router(service);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(
        addr = %listener.local_addr()?,
        collection = %collection,
        "query server listening"
    );
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ GET /query/{text}/{k} ============

async fn handle_query(
    State(state): State<AppState>,
    Path((text, k)): Path<(String, String)>,
) -> Json<QueryEnvelope> {
    let k = match k.trim().parse::<usize>() {
        Ok(k) => k,
        Err(_) => {
            return Json(QueryEnvelope::failed(format!(
                "k must be a positive integer, got '{}'",
                k
            )))
        }
    };
    Json(state.service.query(&text, k).await)
}
