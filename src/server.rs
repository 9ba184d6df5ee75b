//! HTTP API over a single [`Pipeline`].
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (version, whether a document is indexed) |
//! | `POST` | `/documents` | Upload base64-encoded SRS documents and rebuild the index |
//! | `POST` | `/generate` | Generate test cases for a user story |
//! | `GET`  | `/history` | Conversation history of the session |
//! | `GET`  | `/download/archive` | Zip archive of the last generation |
//! | `GET`  | `/download/text` | Combined text of the last generation |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "no_document", "message": "no document indexed; upload an SRS document first" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `no_document` (409),
//! `upstream_error` (502), `internal` (500).
//!
//! The pipeline serves one request at a time: every handler holds the
//! pipeline lock until it responds.

use axum::{
    extract::{DefaultBodyLimit, State},
    http::{header, StatusCode},
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
use tracing::info;

use crate::config::Config;
use crate::error::{ErrorKind, PipelineError};
use crate::extract::{media_type_for_path, normalize_media_type};
use crate::models::{Exchange, UploadedDocument};
use crate::pipeline::{GenerationReport, IndexSummary, Pipeline};

const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

#[derive(Clone)]
struct AppState {
    pipeline: Arc<Mutex<Pipeline>>,
}

/// Builds the router around `pipeline`. Used by [`run_server`] and by tests
/// that bind their own listener.
pub fn router(pipeline: Pipeline) -> Router {
    let state = AppState {
        pipeline: Arc::new(Mutex::new(pipeline)),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/documents", post(handle_documents))
        .route("/generate", post(handle_generate))
        .route("/history", get(handle_history))
        .route("/download/archive", get(handle_download_archive))
        .route("/download/text", get(handle_download_text))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP server on `[server].bind` and runs until the process is
/// terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let pipeline = Pipeline::from_config(config.clone())?;
    let app = router(pipeline);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("story2test listening on http://{}", bind_addr);
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

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        let (status, code) = match err.kind() {
            ErrorKind::InputValidation => (StatusCode::BAD_REQUEST, "bad_request"),
            ErrorKind::NoDocumentIndexed => (StatusCode::CONFLICT, "no_document"),
            ErrorKind::Upstream => (StatusCode::BAD_GATEWAY, "upstream_error"),
            ErrorKind::Config => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        AppError {
            status,
            code: code.to_string(),
            message: err.to_string(),
        }
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
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

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    indexed: bool,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    let pipeline = state.pipeline.lock().await;
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        indexed: pipeline.session().is_indexed(),
    })
}

// ============ POST /documents ============

#[derive(Deserialize)]
struct DocumentsRequest {
    documents: Vec<DocumentUpload>,
}

#[derive(Deserialize)]
struct DocumentUpload {
    name: String,
    /// Guessed from the file extension when absent.
    #[serde(default)]
    media_type: Option<String>,
    content_base64: String,
}

async fn handle_documents(
    State(state): State<AppState>,
    Json(req): Json<DocumentsRequest>,
) -> Result<Json<IndexSummary>, AppError> {
    let mut docs = Vec::with_capacity(req.documents.len());
    for upload in req.documents {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(upload.content_base64.trim())
            .map_err(|e| bad_request(format!("'{}' is not valid base64: {}", upload.name, e)))?;
        let media_type = match upload.media_type {
            Some(declared) => normalize_media_type(&declared),
            None => media_type_for_path(Path::new(&upload.name)),
        };
        docs.push(UploadedDocument::new(upload.name, media_type, bytes));
    }

    let mut pipeline = state.pipeline.lock().await;
    let summary = pipeline.index_documents(&docs).await?;
    Ok(Json(summary))
}

// ============ POST /generate ============

#[derive(Deserialize)]
struct GenerateRequest {
    story: String,
    #[serde(default)]
    count: Option<u8>,
}

async fn handle_generate(
    State(state): State<AppState>,
    Json(req): Json<GenerateRequest>,
) -> Result<Json<GenerationReport>, AppError> {
    let mut pipeline = state.pipeline.lock().await;
    let report = pipeline.generate(&req.story, req.count).await?;
    Ok(Json(report))
}

// ============ GET /history ============

#[derive(Serialize)]
struct HistoryResponse {
    session_id: String,
    exchanges: Vec<Exchange>,
}

async fn handle_history(State(state): State<AppState>) -> Json<HistoryResponse> {
    let pipeline = state.pipeline.lock().await;
    let session = pipeline.session();
    Json(HistoryResponse {
        session_id: session.id().to_string(),
        exchanges: session.history().to_vec(),
    })
}

// ============ GET /download/* ============

async fn handle_download_archive(State(state): State<AppState>) -> Result<Response, AppError> {
    let pipeline = state.pipeline.lock().await;
    let archive = pipeline
        .last_report()
        .and_then(|report| report.package.as_ref())
        .and_then(|package| package.archive.clone())
        .ok_or_else(|| not_found("no test case archive available"))?;

    let bytes = tokio::fs::read(&archive)
        .await
        .map_err(|e| internal(format!("cannot read {}: {}", archive.display(), e)))?;
    let file_name = pipeline.config().output.archive_name.clone();

    Ok((
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file_name),
            ),
        ],
        bytes,
    )
        .into_response())
}

async fn handle_download_text(State(state): State<AppState>) -> Result<Response, AppError> {
    let pipeline = state.pipeline.lock().await;
    let text = pipeline
        .last_report()
        .and_then(|report| report.package.as_ref())
        .map(|package| package.combined_text.clone())
        .ok_or_else(|| not_found("no test cases available"))?;
    let file_name = pipeline.config().output.text_name.clone();

    Ok((
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file_name),
            ),
        ],
        text,
    )
        .into_response())
}
