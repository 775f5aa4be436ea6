//! StyleSync HTTP API
//!
//! Axum server for the operator dashboard and the catalog endpoint. As with
//! the rest of the server, handlers are thin and delegate to inner functions
//! that can be tested without axum dispatch.
//!
//! Endpoints:
//! - GET  /                : operator dashboard (HTML)
//! - POST /generate-catalog: multipart `file` upload → PipelineResult
//! - GET  /health          : liveness and memory backend

use std::error::Error as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use axum::extract::multipart::{Multipart, MultipartRejection};
use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use stylesync_core::config::HttpConfig;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;

use crate::subsystems::pipeline::{CatalogPipeline, PipelineError};
use crate::subsystems::upload::UploadStore;

/// Multipart field carrying the image.
pub const UPLOAD_FIELD: &str = "file";

/// Shared state for all HTTP handlers
#[derive(Clone)]
pub struct HttpState {
    pub pipeline: Arc<CatalogPipeline>,
    pub uploads: Arc<UploadStore>,
    pub dashboard_path: PathBuf,
}

/// Build the Axum router with all endpoints
pub fn build_router(state: Arc<HttpState>, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(dashboard_handler))
        .route("/generate-catalog", post(generate_handler))
        .route("/health", get(health_handler))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server on the configured address.
/// Gracefully shuts down when the broadcast shutdown signal fires.
pub async fn start_http_server(
    state: Arc<HttpState>,
    config: &HttpConfig,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let max_upload_bytes = config.max_upload_mb * 1024 * 1024;

    let app = build_router(state, max_upload_bytes);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("StyleSync listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

// ============================================================================
// Request types
// ============================================================================

/// The image part of a catalog request, read fully into memory.
#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub bytes: Bytes,
    pub filename: Option<String>,
    pub content_type: Option<String>,
}

/// `500 {error, type, details}` for a request that could not be processed.
pub fn error_body(err: &PipelineError) -> serde_json::Value {
    let mut details = Vec::new();
    let mut source = err.source();
    while let Some(cause) = source {
        details.push(cause.to_string());
        source = cause.source();
    }
    let details = if details.is_empty() {
        format!("{:?}", err)
    } else {
        details.join(": ")
    };

    serde_json::json!({
        "error": err.to_string(),
        "type": err.kind(),
        "details": details,
    })
}

// ============================================================================
// Inner (directly testable) business logic functions
// ============================================================================

pub async fn dashboard_inner(path: &Path) -> (StatusCode, String) {
    match tokio::fs::read_to_string(path).await {
        Ok(html) => (StatusCode::OK, html),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Dashboard not found");
            (
                StatusCode::NOT_FOUND,
                format!(
                    "<h1>Dashboard not found</h1><p>Expected it at {}</p>",
                    path.display()
                ),
            )
        }
    }
}

pub fn health_inner(state: &HttpState) -> serde_json::Value {
    serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "memory": state.pipeline.memory().backend_name(),
        "notifications": state.pipeline.notifications_enabled(),
    })
}

/// Pull the `file` field out of a multipart body.
pub async fn read_upload(multipart: &mut Multipart) -> Result<UploadedImage, PipelineError> {
    loop {
        let field = multipart
            .next_field()
            .await
            .map_err(|e| PipelineError::InvalidRequest(e.to_string()))?;
        let Some(field) = field else {
            return Err(PipelineError::InvalidRequest(format!(
                "multipart field '{}' is required",
                UPLOAD_FIELD
            )));
        };
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let filename = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| PipelineError::InvalidRequest(e.to_string()))?;
        return Ok(UploadedImage {
            bytes,
            filename,
            content_type,
        });
    }
}

/// Store the upload, run the pipeline, and answer. The stored file is
/// removed when this returns, whatever the outcome.
pub async fn generate_inner(
    state: &HttpState,
    image: UploadedImage,
) -> (StatusCode, serde_json::Value) {
    let upload = match state
        .uploads
        .store(
            &image.bytes,
            image.filename.as_deref(),
            image.content_type.as_deref(),
        )
        .await
    {
        Ok(upload) => upload,
        Err(e) => return failure(PipelineError::UploadStorage(e)),
    };

    let result = match state.pipeline.run(&upload).await {
        Ok(result) => result,
        Err(e) => return failure(e),
    };

    match serde_json::to_value(&result) {
        Ok(body) => (StatusCode::OK, body),
        Err(e) => failure(PipelineError::Serialization(e)),
    }
}

fn failure(err: PipelineError) -> (StatusCode, serde_json::Value) {
    tracing::error!(error = %err, kind = err.kind(), "Catalog request failed");
    (StatusCode::INTERNAL_SERVER_ERROR, error_body(&err))
}

// ============================================================================
// Axum handler wrappers (thin, delegate to inner functions)
// ============================================================================

pub async fn dashboard_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let (status, html) = dashboard_inner(&state.dashboard_path).await;
    (status, Html(html))
}

pub async fn health_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    (StatusCode::OK, Json(health_inner(&state)))
}

pub async fn generate_handler(
    State(state): State<Arc<HttpState>>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> impl IntoResponse {
    let mut multipart = match multipart {
        Ok(m) => m,
        Err(rejection) => {
            let (status, body) = failure(PipelineError::InvalidRequest(rejection.body_text()));
            return (status, Json(body));
        }
    };

    let (status, body) = match read_upload(&mut multipart).await {
        Ok(image) => generate_inner(&state, image).await,
        Err(e) => failure(e),
    };
    (status, Json(body))
}

// ============================================================================
// Unit Tests: call inner functions directly
// ============================================================================
