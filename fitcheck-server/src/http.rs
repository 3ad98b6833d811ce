//! Fitcheck HTTP API
//!
//! Axum server exposing the session workflow: create a session, upload a
//! spreadsheet, ask questions, download the PDF report. A single HTML page at
//! `/` drives the same endpoints from a browser.
//!
//! Each endpoint has a thin axum handler that delegates to an inner function
//! returning `(StatusCode, serde_json::Value)`, so the logic is testable
//! without going through the router.
//!
//! Endpoints:
//! - GET    /                     : upload / question page
//! - GET    /health               : store health
//! - GET    /version              : server version info
//! - POST   /sessions             : create a session
//! - GET    /sessions/:id         : session state
//! - POST   /sessions/:id/upload  : multipart spreadsheet upload (field `file`)
//! - POST   /sessions/:id/query   : ask a question
//! - GET    /sessions/:id/report  : download the latest PDF report
//! - DELETE /sessions/:id         : close a session

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use fitcheck_core::{FitcheckConfig, MetadataFilter, VectorStore};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::report::REPORT_FILENAME;
use crate::sessions::{SessionHandle, SessionRegistry};
use crate::workflow::{Question, SessionState, WorkflowError, NO_RESULTS_MESSAGE};

const INDEX_HTML: &str = include_str!("../static/index.html");

/// Shared state for all HTTP handlers
pub struct HttpState {
    pub registry: SessionRegistry,
    pub config: FitcheckConfig,
}

/// Build the Axum router with all endpoints
pub fn build_router(state: Arc<HttpState>) -> Router {
    let upload_limit = state.config.http.max_upload_bytes;
    Router::new()
        .route("/", get(index_handler))
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        .route("/sessions", post(create_session_handler))
        .route(
            "/sessions/:id",
            get(session_state_handler).delete(delete_session_handler),
        )
        .route("/sessions/:id/upload", post(upload_handler))
        .route("/sessions/:id/query", post(query_handler))
        .route("/sessions/:id/report", get(report_handler))
        .layer(DefaultBodyLimit::max(upload_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server on the configured address.
/// Gracefully shuts down when the broadcast shutdown signal fires.
pub async fn start_http_server(
    state: Arc<HttpState>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let addr = format!("{}:{}", state.config.http.host, state.config.http.port);

    let app = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Fitcheck HTTP API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

// ============================================================================
// Request / Response DTOs
// ============================================================================

#[derive(Debug, Deserialize, Default)]
pub struct QueryRequest {
    pub question: Option<String>,
    pub limit: Option<u32>,
    #[serde(default)]
    pub filter: MetadataFilter,
}

/// Standard HTTP error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub status: String,
}

impl ErrorResponse {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            error: msg.into(),
            status: "error".to_string(),
        }
    }
}

type HttpReply = (StatusCode, serde_json::Value);

fn error_reply(status: StatusCode, msg: impl Into<String>) -> HttpReply {
    let body = serde_json::to_value(ErrorResponse::new(msg))
        .unwrap_or_else(|_| serde_json::json!({"status": "error"}));
    (status, body)
}

fn state_body(id: Uuid, state: &SessionState) -> serde_json::Value {
    serde_json::json!({
        "session_id": id,
        "state": state,
    })
}

// ============================================================================
// Inner (directly testable) business logic functions
// ============================================================================

/// Inner health check: asks the store for its status.
pub async fn health_inner(store: &dyn VectorStore) -> HttpReply {
    match store.health().await {
        Ok(detail) => (
            StatusCode::OK,
            serde_json::json!({
                "status": "healthy",
                "version": env!("CARGO_PKG_VERSION"),
                "store": store.name(),
                "detail": detail,
            }),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            serde_json::json!({
                "status": "unhealthy",
                "store": store.name(),
                "error": e.to_string(),
            }),
        ),
    }
}

/// Inner version: returns version info (pure, no IO).
pub fn version_inner() -> serde_json::Value {
    serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "protocol": "fitcheck/1",
    })
}

pub async fn create_session_inner(registry: &SessionRegistry) -> HttpReply {
    let (id, handle) = registry.create().await;
    let session = handle.lock().await;
    (StatusCode::CREATED, state_body(id, session.state()))
}

/// Resolve a path id to a live session, or a 404 reply.
pub async fn find_session(
    registry: &SessionRegistry,
    raw_id: &str,
) -> Result<(Uuid, SessionHandle), HttpReply> {
    let not_found = || error_reply(StatusCode::NOT_FOUND, format!("session {} not found", raw_id));
    let id = Uuid::parse_str(raw_id).map_err(|_| not_found())?;
    let handle = registry.get(id).await.ok_or_else(not_found)?;
    Ok((id, handle))
}

pub async fn session_state_inner(registry: &SessionRegistry, raw_id: &str) -> HttpReply {
    let (id, handle) = match find_session(registry, raw_id).await {
        Ok(found) => found,
        Err(reply) => return reply,
    };
    let session = handle.lock().await;
    (StatusCode::OK, state_body(id, session.state()))
}

/// Map a workflow failure to an HTTP status.
pub fn workflow_status(err: &WorkflowError) -> StatusCode {
    match err {
        WorkflowError::Ingestion(_) => StatusCode::UNPROCESSABLE_ENTITY,
        WorkflowError::EmptyQuestion => StatusCode::BAD_REQUEST,
        WorkflowError::InvalidTransition { .. } => StatusCode::CONFLICT,
        WorkflowError::Records(_)
        | WorkflowError::Store(_)
        | WorkflowError::Synthesis(_)
        | WorkflowError::Report(_)
        | WorkflowError::Task(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn workflow_reply(id: Uuid, err: WorkflowError) -> HttpReply {
    let status = workflow_status(&err);
    if status.is_server_error() {
        tracing::error!(session = %id, error = %err, "Request failed");
    }
    error_reply(status, err.to_string())
}

/// Inner upload: parse, embed and index `bytes` for the session.
pub async fn upload_inner(
    registry: &SessionRegistry,
    raw_id: &str,
    filename: &str,
    bytes: Vec<u8>,
) -> HttpReply {
    let (id, handle) = match find_session(registry, raw_id).await {
        Ok(found) => found,
        Err(reply) => return reply,
    };

    let start = Instant::now();
    let mut session = handle.lock().await;
    match session.upload(bytes, filename).await {
        Ok(state) => {
            let mut body = state_body(id, state);
            if let Some(obj) = body.as_object_mut() {
                obj.insert(
                    "took_ms".to_string(),
                    serde_json::json!(start.elapsed().as_millis() as u64),
                );
            }
            (StatusCode::OK, body)
        }
        Err(e) => workflow_reply(id, e),
    }
}

/// Inner query: run retrieval and synthesis, render the report.
pub async fn query_inner(
    registry: &SessionRegistry,
    raw_id: &str,
    req: QueryRequest,
) -> HttpReply {
    let (id, handle) = match find_session(registry, raw_id).await {
        Ok(found) => found,
        Err(reply) => return reply,
    };

    let question = Question {
        text: req.question.unwrap_or_default(),
        limit: req.limit,
        filter: req.filter,
    };

    let start = Instant::now();
    let mut session = handle.lock().await;
    let state = match session.submit_question(question).await {
        Ok(state) => state,
        Err(e) => return workflow_reply(id, e),
    };
    let took_ms = start.elapsed().as_millis() as u64;

    match state {
        SessionState::Reported {
            answer, sources, ..
        } => (
            StatusCode::OK,
            serde_json::json!({
                "session_id": id,
                "state": state.name(),
                "answer": answer.answer,
                "thought_process": answer.thought_process,
                "enough_context": answer.enough_context,
                "sources": sources,
                "report_url": format!("/sessions/{}/report", id),
                "took_ms": took_ms,
            }),
        ),
        SessionState::NoResults { .. } => {
            let (status, mut body) = error_reply(StatusCode::NOT_FOUND, NO_RESULTS_MESSAGE);
            if let Some(obj) = body.as_object_mut() {
                obj.insert("state".to_string(), serde_json::json!(state.name()));
            }
            (status, body)
        }
        other => (StatusCode::OK, state_body(id, other)),
    }
}

/// Inner report: the latest report bytes, or an error reply.
pub async fn report_inner(
    registry: &SessionRegistry,
    raw_id: &str,
) -> Result<Vec<u8>, HttpReply> {
    let (_, handle) = find_session(registry, raw_id).await?;
    let session = handle.lock().await;
    session
        .report()
        .map(|report| report.bytes.clone())
        .ok_or_else(|| error_reply(StatusCode::NOT_FOUND, "no report has been generated yet"))
}

pub async fn delete_session_inner(registry: &SessionRegistry, raw_id: &str) -> HttpReply {
    let not_found = error_reply(StatusCode::NOT_FOUND, format!("session {} not found", raw_id));
    let Ok(id) = Uuid::parse_str(raw_id) else {
        return not_found;
    };
    if registry.remove(id).await {
        (
            StatusCode::OK,
            serde_json::json!({"session_id": id, "deleted": true}),
        )
    } else {
        not_found
    }
}

// ============================================================================
// Axum handler wrappers (thin: delegate to inner functions)
// ============================================================================

pub async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

pub async fn health_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let (status, body) = health_inner(state.registry.pipeline().store.as_ref()).await;
    (status, Json(body))
}

pub async fn version_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(version_inner()))
}

pub async fn create_session_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let (status, body) = create_session_inner(&state.registry).await;
    (status, Json(body))
}

pub async fn session_state_handler(
    State(state): State<Arc<HttpState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let (status, body) = session_state_inner(&state.registry, &id).await;
    (status, Json(body))
}

pub async fn upload_handler(
    State(state): State<Arc<HttpState>>,
    Path(id): Path<String>,
    multipart: Multipart,
) -> impl IntoResponse {
    let (status, body) = match read_upload(multipart).await {
        Ok((filename, bytes)) => upload_inner(&state.registry, &id, &filename, bytes).await,
        Err(reply) => reply,
    };
    (status, Json(body))
}

pub async fn query_handler(
    State(state): State<Arc<HttpState>>,
    Path(id): Path<String>,
    Json(req): Json<QueryRequest>,
) -> impl IntoResponse {
    let (status, body) = query_inner(&state.registry, &id, req).await;
    (status, Json(body))
}

pub async fn report_handler(
    State(state): State<Arc<HttpState>>,
    Path(id): Path<String>,
) -> Response {
    match report_inner(&state.registry, &id).await {
        Ok(bytes) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "application/pdf".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}\"", REPORT_FILENAME),
                ),
            ],
            bytes,
        )
            .into_response(),
        Err((status, body)) => (status, Json(body)).into_response(),
    }
}

pub async fn delete_session_handler(
    State(state): State<Arc<HttpState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let (status, body) = delete_session_inner(&state.registry, &id).await;
    (status, Json(body))
}

// ============================================================================
// Helpers
// ============================================================================

/// Pull the `file` field out of a multipart body.
async fn read_upload(mut multipart: Multipart) -> Result<(String, Vec<u8>), HttpReply> {
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => {
                return Err(error_reply(
                    StatusCode::BAD_REQUEST,
                    "multipart field 'file' is required",
                ))
            }
            Err(e) => return Err(error_reply(e.status(), e.body_text())),
        };

        if field.name() != Some("file") {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        return match field.bytes().await {
            Ok(bytes) => Ok((filename, bytes.to_vec())),
            Err(e) => Err(error_reply(e.status(), e.body_text())),
        };
    }
}

// ============================================================================
// Unit Tests: call inner functions directly
// ============================================================================
