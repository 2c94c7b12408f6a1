//! HTTP API server.
//!
//! Exposes search, indexing, and store inspection over a JSON API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/` | Service banner (status and version) |
//! | `GET`  | `/health` | Health check |
//! | `GET`  | `/documents` | Store summary counts |
//! | `POST` | `/search/{pipeline}` | Run a search pipeline |
//! | `POST` | `/index` | Rebuild the corpus from the source directory |
//!
//! # Error Contract
//!
//! All error responses carry a JSON envelope:
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `internal` (500).
//!
//! # Pipelines
//!
//! Pipelines are constructed lazily on first use and cached per kind. Each
//! cache slot has its own lock, so a slow summarization build never blocks
//! a concurrent qa request. `POST /index` drops the cache after a rebuild
//! so the next search sees the fresh artifacts.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};

use crate::build;
use crate::config::Config;
use crate::pipeline::{pipeline_factory, prepare_response, PipelineKind, SearchPipeline};
use crate::store::{self, DocumentStore};

type PipelineSlot = Arc<Mutex<Option<Arc<dyn SearchPipeline>>>>;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    store: Arc<dyn DocumentStore>,
    pipelines: Arc<HashMap<PipelineKind, PipelineSlot>>,
}

impl AppState {
    /// Fetch the cached pipeline for `kind`, building it on first use.
    async fn pipeline(&self, kind: PipelineKind) -> Result<Arc<dyn SearchPipeline>, AppError> {
        let slot = self
            .pipelines
            .get(&kind)
            .ok_or_else(|| internal("pipeline slot missing"))?;
        let mut guard = slot.lock().await;
        if let Some(pipeline) = guard.as_ref() {
            return Ok(Arc::clone(pipeline));
        }
        let pipeline: Arc<dyn SearchPipeline> =
            Arc::from(pipeline_factory(kind, &self.config, Arc::clone(&self.store))
                .map_err(|e| bad_request(e.to_string()))?);
        *guard = Some(Arc::clone(&pipeline));
        Ok(pipeline)
    }

    /// Empty every cache slot.
    async fn invalidate_pipelines(&self) {
        for slot in self.pipelines.values() {
            *slot.lock().await = None;
        }
    }
}

/// Start the HTTP server on the configured bind address. Runs until the
/// process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let store = store::open_store(&config.store).await?;

    let mut pipelines: HashMap<PipelineKind, PipelineSlot> = HashMap::new();
    for kind in [PipelineKind::Summarization, PipelineKind::Qa] {
        pipelines.insert(kind, Arc::new(Mutex::new(None)));
    }

    let state = AppState {
        config: Arc::new(config.clone()),
        store,
        pipelines: Arc::new(pipelines),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/", get(handle_root))
        .route("/health", get(handle_health))
        .route("/documents", get(handle_documents))
        .route("/search/{pipeline}", post(handle_search))
        .route("/index", post(handle_index))
        .layer(cors)
        .with_state(state);

    println!("quarry server listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

// ============ GET / and /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_root() -> Json<HealthResponse> {
    handle_health().await
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ GET /documents ============

async fn handle_documents(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let stats = state
        .store
        .describe()
        .await
        .map_err(|e| internal(e.to_string()))?;
    Ok(Json(serde_json::json!(stats)))
}

// ============ POST /search/{pipeline} ============

#[derive(Deserialize)]
struct SearchData {
    query: String,
    #[serde(default = "default_n_retrieve")]
    n_retrieve: usize,
    #[serde(default = "default_n_rank")]
    n_rank: usize,
}

fn default_n_retrieve() -> usize {
    10
}
fn default_n_rank() -> usize {
    5
}

async fn handle_search(
    State(state): State<AppState>,
    Path(pipeline_name): Path<String>,
    Json(data): Json<SearchData>,
) -> Result<Json<serde_json::Value>, AppError> {
    if data.query.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }
    let kind: PipelineKind = pipeline_name
        .parse()
        .map_err(|e: anyhow::Error| bad_request(e.to_string()))?;

    let pipeline = state.pipeline(kind).await?;
    let output = pipeline
        .run(&data.query, data.n_retrieve, data.n_rank)
        .await
        .map_err(|e| internal(e.to_string()))?;

    Ok(Json(prepare_response(&data.query, &output)))
}

// ============ POST /index ============

#[derive(Serialize)]
struct IndexResponse {
    status: String,
    detail: String,
}

/// Rebuilds the corpus. A failed build reports its error in the response
/// body rather than an opaque 500, since rebuilds are operator-triggered.
async fn handle_index(State(state): State<AppState>) -> Json<IndexResponse> {
    match build::run_build_with_store(&state.config, &state.config.pipeline.index, &state.store)
        .await
    {
        Ok(report) => {
            state.invalidate_pipelines().await;
            Json(IndexResponse {
                status: "ok".to_string(),
                detail: format!(
                    "indexed {} documents from {} files",
                    report.documents, report.files
                ),
            })
        }
        Err(e) => Json(IndexResponse {
            status: "error".to_string(),
            detail: e.to_string(),
        }),
    }
}
