//! HTTP query API.
//!
//! Exposes the query pipeline and the sources aggregation over JSON HTTP.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/query` | Answer a question from the indexed chunks |
//! | `GET`  | `/api/sources` | Per-source document counts and total chunks |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! All error responses share one shape:
//!
//! ```json
//! { "error": { "code": "invalid_request", "message": "query must not be empty" } }
//! ```
//!
//! Codes: `invalid_request` (400), `embedding_error` (502),
//! `generation_error` (502), `index_unavailable` (503), `internal` (500).
//! An empty retrieval is NOT an error — it answers 200 with the fallback
//! message and an empty sources list.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser
//! clients.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::error::PipelineError;
use crate::index::VectorIndex;
use crate::models::{QueryOutput, SourceType};
use crate::pipeline::QueryPipeline;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    query: Arc<QueryPipeline>,
    index: Arc<dyn VectorIndex>,
    default_top_k: usize,
}

/// Start the HTTP server on `bind`, serving until the process exits.
pub async fn run_server(
    bind: &str,
    query: Arc<QueryPipeline>,
    index: Arc<dyn VectorIndex>,
    default_top_k: usize,
) -> anyhow::Result<()> {
    let state = AppState {
        query,
        index,
        default_top_k,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/api/query", post(handle_query))
        .route("/api/sources", get(handle_sources))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state);

    tracing::info!(%bind, "query API listening");
    println!("Query API listening on http://{bind}");

    let listener = tokio::net::TcpListener::bind(bind).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(serde::Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(serde::Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

/// Map pipeline errors onto HTTP statuses. Provider failures are upstream
/// problems (502/503); everything else unexpected is a 500.
fn classify_error(err: PipelineError) -> AppError {
    let message = err.to_string();
    let (status, code) = match err.root() {
        PipelineError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
        PipelineError::EmbeddingService(_) | PipelineError::EmbeddingBatchTooLarge { .. } => {
            (StatusCode::BAD_GATEWAY, "embedding_error")
        }
        PipelineError::Generation(_) => (StatusCode::BAD_GATEWAY, "generation_error"),
        PipelineError::IndexUnavailable(_) => {
            (StatusCode::SERVICE_UNAVAILABLE, "index_unavailable")
        }
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
    };

    AppError {
        status,
        code,
        message,
    }
}

// ============ GET /health ============

#[derive(serde::Serialize)]
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

// ============ POST /api/query ============

#[derive(Deserialize)]
struct QueryRequest {
    query: String,
    top_k: Option<usize>,
    source_filter: Option<Vec<SourceType>>,
}

async fn handle_query(
    State(state): State<AppState>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<QueryOutput>, AppError> {
    let top_k = req.top_k.unwrap_or(state.default_top_k);
    let filter = req.source_filter.as_deref();

    let output = state
        .query
        .query(&req.query, top_k, filter)
        .await
        .map_err(classify_error)?;

    Ok(Json(output))
}

// ============ GET /api/sources ============

async fn handle_sources(
    State(state): State<AppState>,
) -> Result<Json<crate::index::IndexStats>, AppError> {
    let stats = state.index.source_stats().await.map_err(classify_error)?;
    Ok(Json(stats))
}
