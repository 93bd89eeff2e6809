//! HTTP server for the question-answering pipeline.
//!
//! A single [`Pipeline`] (and therefore a single query session) is shared by
//! all requests behind a `tokio::sync::Mutex`, so builds and queries never
//! overlap.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/status` | Index location, entry count and a sample of chunks |
//! | `POST` | `/ingest` | Rebuild the index from `{ "documents": [{ "source", "text" }] }` |
//! | `POST` | `/upload` | Save `{ "filename", "content_base64" }` to the input dir and re-ingest it |
//! | `POST` | `/question` | Answer `{ "question", "k"? }` |
//! | `GET`  | `/history` | Questions and answers of the current session |
//! | `DELETE` | `/history` | Forget the session |
//! | `GET`  | `/theme` | Theme summary of the indexed documents |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "question must not be empty" } }
//! ```
//!
//! Pipeline errors keep their own codes (`empty_input`, `index_absent`,
//! `embedding_unavailable`, ...), with 503 for unreachable models.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};

use docqa_core::error::PipelineError;
use docqa_core::models::{Chunk, Document, Exchange, IndexMeta, ScoredChunk};
use docqa_core::pipeline::{BuildReport, Pipeline, QueryOutcome};
use docqa_core::progress::NoProgress;

use crate::config::Config;
use crate::ingest::{self, FileLoader};
use crate::runtime;

#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    pipeline: Arc<Mutex<Pipeline>>,
}

impl AppState {
    pub fn new(config: Config, pipeline: Pipeline) -> Self {
        Self {
            config: Arc::new(config),
            pipeline: Arc::new(Mutex::new(pipeline)),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/status", get(handle_status))
        .route("/ingest", post(handle_ingest))
        .route("/upload", post(handle_upload))
        .route("/question", post(handle_question))
        .route("/history", get(handle_history).delete(handle_clear_history))
        .route("/theme", get(handle_theme))
        .layer(cors)
        .with_state(state)
}

/// Bind to `[server].bind` and serve until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let pipeline = runtime::build_pipeline(config, Arc::new(NoProgress))?;
    let app = router(AppState::new(config.clone(), pipeline));

    println!("docqa server listening on http://{}", bind_addr);
    tracing::info!(bind = %bind_addr, index = %config.index_path().display(), "server started");

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

#[derive(Debug)]
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

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        let status = match &err {
            PipelineError::EmptyInput | PipelineError::InvalidConfig(_) => StatusCode::BAD_REQUEST,
            PipelineError::IndexAbsent => StatusCode::NOT_FOUND,
            PipelineError::EmbeddingUnavailable(_) | PipelineError::GenerationUnavailable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            PipelineError::ModelMismatch { .. } => StatusCode::CONFLICT,
            PipelineError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        tracing::warn!(code = err.code(), error = %err, "request failed");
        AppError {
            status,
            code: err.code().to_string(),
            message: err.user_message(),
        }
    }
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

// ============ GET /status ============

#[derive(Debug, Serialize)]
struct StatusResponse {
    location: String,
    count: u64,
    meta: Option<IndexMeta>,
    sample: Vec<Chunk>,
    history_len: usize,
}

async fn handle_status(State(state): State<AppState>) -> Result<Json<StatusResponse>, AppError> {
    let pipeline = state.pipeline.lock().await;
    let report = pipeline.inspect(3).await?;
    Ok(Json(StatusResponse {
        location: report.location,
        count: report.count,
        meta: report.meta,
        sample: report.sample,
        history_len: pipeline.history().len(),
    }))
}

// ============ POST /ingest, POST /upload ============

#[derive(Deserialize)]
struct IngestRequest {
    documents: Vec<Document>,
}

#[derive(Debug, Serialize)]
struct IngestResponse {
    documents: usize,
    chunks: u64,
    reused: bool,
    model: String,
}

impl From<BuildReport> for IngestResponse {
    fn from(report: BuildReport) -> Self {
        Self {
            documents: report.documents,
            chunks: report.meta.chunk_count,
            reused: report.reused,
            model: report.meta.model,
        }
    }
}

async fn handle_ingest(
    State(state): State<AppState>,
    Json(req): Json<IngestRequest>,
) -> Result<Json<IngestResponse>, AppError> {
    let mut pipeline = state.pipeline.lock().await;
    let report = pipeline.build(&req.documents).await?;
    Ok(Json(report.into()))
}

#[derive(Deserialize)]
struct UploadRequest {
    filename: String,
    content_base64: String,
}

/// Keep only the final path component so uploads cannot escape the input dir.
fn safe_filename(name: &str) -> Option<String> {
    let base = Path::new(name.trim()).file_name()?.to_string_lossy().to_string();
    if base.is_empty() || base.starts_with('.') {
        return None;
    }
    Some(base)
}

async fn handle_upload(
    State(state): State<AppState>,
    Json(req): Json<UploadRequest>,
) -> Result<Json<IngestResponse>, AppError> {
    let filename = safe_filename(&req.filename)
        .ok_or_else(|| bad_request(format!("invalid filename: {:?}", req.filename)))?;
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(req.content_base64.trim())
        .map_err(|e| bad_request(format!("content_base64 is not valid base64: {}", e)))?;

    let input_dir = &state.config.ingest.input_dir;
    std::fs::create_dir_all(input_dir)
        .and_then(|_| std::fs::write(input_dir.join(&filename), &bytes))
        .map_err(|e| internal(format!("failed to save upload: {}", e)))?;
    tracing::info!(file = %filename, bytes = bytes.len(), "saved upload");

    let files = ingest::discover(&state.config, &[]).map_err(|e| internal(format!("{:#}", e)))?;
    let loader = FileLoader::new(files, &state.config);

    let mut pipeline = state.pipeline.lock().await;
    // An upload always re-indexes the input directory, including the new file.
    pipeline.set_force_rebuild(true);
    let built = pipeline.build(&loader).await;
    pipeline.set_force_rebuild(state.config.index.force_rebuild);
    Ok(Json(built?.into()))
}

// ============ POST /question ============

#[derive(Deserialize)]
struct QuestionRequest {
    question: String,
    #[serde(default)]
    k: Option<usize>,
}

#[derive(Debug, Serialize)]
struct QuestionResponse {
    status: &'static str,
    answer: String,
    sources: Vec<ScoredChunk>,
}

impl From<QueryOutcome> for QuestionResponse {
    fn from(outcome: QueryOutcome) -> Self {
        let answer = outcome.message();
        match outcome {
            QueryOutcome::Answered { sources, .. } => Self {
                status: "answered",
                answer,
                sources,
            },
            QueryOutcome::NoDocuments => Self {
                status: "no_documents",
                answer,
                sources: Vec::new(),
            },
            QueryOutcome::NoContext => Self {
                status: "no_context",
                answer,
                sources: Vec::new(),
            },
        }
    }
}

async fn handle_question(
    State(state): State<AppState>,
    Json(req): Json<QuestionRequest>,
) -> Result<Json<QuestionResponse>, AppError> {
    let question = req.question.trim();
    if question.is_empty() {
        return Err(bad_request("question must not be empty"));
    }

    let mut pipeline = state.pipeline.lock().await;
    let k = req.k.unwrap_or(pipeline.settings().top_k);
    let outcome = pipeline.ask_with_k(question, k).await?;
    Ok(Json(outcome.into()))
}

// ============ /history ============

#[derive(Debug, Serialize)]
struct HistoryResponse {
    exchanges: Vec<Exchange>,
}

async fn handle_history(State(state): State<AppState>) -> Json<HistoryResponse> {
    let pipeline = state.pipeline.lock().await;
    Json(HistoryResponse {
        exchanges: pipeline.history().to_vec(),
    })
}

async fn handle_clear_history(State(state): State<AppState>) -> Json<serde_json::Value> {
    let mut pipeline = state.pipeline.lock().await;
    let cleared = pipeline.history().len();
    pipeline.clear_history();
    Json(serde_json::json!({ "cleared": cleared }))
}

// ============ GET /theme ============

async fn handle_theme(State(state): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    let pipeline = state.pipeline.lock().await;
    let theme = pipeline.summarize().await?;
    Ok(Json(serde_json::json!({ "theme": theme })))
}
