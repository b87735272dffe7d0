//! dlqops HTTP REST API
//!
//! Axum server exposing the operations tools over HTTP, next to the Unix socket
//! IPC server. Each endpoint has a thin axum handler that delegates to an inner
//! function which builds the `OpsRequest` and runs it through the router.
//!
//! Endpoints:
//! - GET  /health             — service status and configured backends
//! - GET  /version            — server version info
//! - GET  /dlqs               — configured DLQ names
//! - GET  /dlqs/:name/count   — approximate queue depth
//! - POST /summary            — run the DLQ summary pipeline
//! - POST /brackets           — first/last ERROR logs per event id
//! - POST /logs/errors        — recent logs, optionally by level
//! - POST /orders/status      — position item statuses of an order
//! - POST /archive            — back up a DLQ and delete archived messages

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use dlqops_core::ipc::{OpsRequest, OpsResponse};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use crate::context::AppContext;

/// Shared state for all HTTP handlers
#[derive(Clone)]
pub struct HttpState {
    pub ctx: Arc<AppContext>,
}

/// Build the Axum router with all endpoints
pub fn build_router(state: Arc<HttpState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        .route("/dlqs", get(dlqs_handler))
        .route("/dlqs/:name/count", get(count_handler))
        .route("/summary", post(summary_handler))
        .route("/brackets", post(brackets_handler))
        .route("/logs/errors", post(error_logs_handler))
        .route("/orders/status", post(order_status_handler))
        .route("/archive", post(archive_handler))
        .with_state(state)
}

/// Start the HTTP server on the configured address.
/// Gracefully shuts down when the broadcast shutdown signal fires.
pub async fn start_http_server(
    ctx: Arc<AppContext>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let addr = format!("{}:{}", ctx.config.http.host, ctx.config.http.port);
    let state = Arc::new(HttpState { ctx });

    let app = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("dlqops HTTP API listening on http://{}", addr);

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
pub struct SummaryRequest {
    pub max_messages: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct BracketsRequest {
    #[serde(default)]
    pub event_ids: Vec<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ErrorLogsRequest {
    pub index: Option<String>,
    pub level: Option<String>,
    pub size: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct OrderStatusRequest {
    pub sales_order_id: Option<String>,
    #[serde(default)]
    pub item_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ArchiveRequest {
    pub queue_name: Option<String>,
    pub visibility_timeout: Option<u32>,
    #[serde(default)]
    pub delete: bool,
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

// ============================================================================
// Inner (directly testable) business logic functions
// ============================================================================

pub fn health_inner(ctx: &AppContext) -> (StatusCode, serde_json::Value) {
    let mut body = crate::router::health_status(ctx);
    if let Some(obj) = body.as_object_mut() {
        obj.insert(
            "version".to_string(),
            serde_json::json!(env!("CARGO_PKG_VERSION")),
        );
        obj.insert(
            "socket".to_string(),
            serde_json::json!(ctx.config.service.socket_path),
        );
    }
    (StatusCode::OK, body)
}

/// Inner version: returns version info (pure, no IO).
pub fn version_inner() -> serde_json::Value {
    serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "protocol": "dlqops/1",
    })
}

pub async fn dlqs_inner(ctx: &AppContext) -> (StatusCode, serde_json::Value) {
    dispatch(ctx, OpsRequest::ListAvailableDlqs).await
}

pub async fn count_inner(ctx: &AppContext, queue_name: String) -> (StatusCode, serde_json::Value) {
    if !ctx.config.dlq_names().contains(&queue_name) {
        return (
            StatusCode::NOT_FOUND,
            error_body(format!("queue {} is not a configured DLQ", queue_name)),
        );
    }
    dispatch(ctx, OpsRequest::GetQueueMessageCount { queue_name }).await
}

/// Inner summary: runs the pipeline and reports elapsed time.
pub async fn summary_inner(ctx: &AppContext, req: SummaryRequest) -> (StatusCode, serde_json::Value) {
    let start = Instant::now();
    let (status, mut body) = dispatch(
        ctx,
        OpsRequest::GenerateDlqSummary {
            max_messages: req.max_messages,
        },
    )
    .await;

    if let Some(obj) = body.as_object_mut() {
        let took_ms = start.elapsed().as_millis() as u64;
        obj.insert("took_ms".to_string(), serde_json::json!(took_ms));
    }
    (status, body)
}

pub async fn brackets_inner(
    ctx: &AppContext,
    req: BracketsRequest,
) -> (StatusCode, serde_json::Value) {
    if req.event_ids.iter().all(|id| id.trim().is_empty()) {
        return (
            StatusCode::BAD_REQUEST,
            error_body("event_ids must contain at least one id"),
        );
    }
    dispatch(
        ctx,
        OpsRequest::ResolveErrorBrackets {
            event_ids: req.event_ids,
        },
    )
    .await
}

pub async fn error_logs_inner(
    ctx: &AppContext,
    req: ErrorLogsRequest,
) -> (StatusCode, serde_json::Value) {
    dispatch(
        ctx,
        OpsRequest::FetchErrorLogs {
            index: req.index,
            level: req.level,
            size: req.size,
        },
    )
    .await
}

pub async fn order_status_inner(
    ctx: &AppContext,
    req: OrderStatusRequest,
) -> (StatusCode, serde_json::Value) {
    let sales_order_id = match req.sales_order_id {
        Some(id) if !id.trim().is_empty() => id,
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                error_body("sales_order_id field is required"),
            );
        }
    };
    dispatch(
        ctx,
        OpsRequest::GetOrderItemsStatus {
            sales_order_id,
            item_ids: req.item_ids,
        },
    )
    .await
}

pub async fn archive_inner(ctx: &AppContext, req: ArchiveRequest) -> (StatusCode, serde_json::Value) {
    let queue_name = match req.queue_name {
        Some(q) if !q.trim().is_empty() => q,
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                error_body("queue_name field is required"),
            );
        }
    };
    dispatch(
        ctx,
        OpsRequest::ArchiveDlq {
            queue_name,
            visibility_timeout: req
                .visibility_timeout
                .unwrap_or(ctx.config.queue.visibility_timeout_seconds),
            delete: req.delete,
        },
    )
    .await
}

// ============================================================================
// Axum handler wrappers, delegating to inner functions
// ============================================================================

pub async fn health_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let (status, body) = health_inner(&state.ctx);
    (status, Json(body))
}

pub async fn version_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(version_inner()))
}

pub async fn dlqs_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let (status, body) = dlqs_inner(&state.ctx).await;
    (status, Json(body))
}

pub async fn count_handler(
    State(state): State<Arc<HttpState>>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    let (status, body) = count_inner(&state.ctx, name).await;
    (status, Json(body))
}

pub async fn summary_handler(
    State(state): State<Arc<HttpState>>,
    Json(req): Json<SummaryRequest>,
) -> impl IntoResponse {
    let (status, body) = summary_inner(&state.ctx, req).await;
    (status, Json(body))
}

pub async fn brackets_handler(
    State(state): State<Arc<HttpState>>,
    Json(req): Json<BracketsRequest>,
) -> impl IntoResponse {
    let (status, body) = brackets_inner(&state.ctx, req).await;
    (status, Json(body))
}

pub async fn error_logs_handler(
    State(state): State<Arc<HttpState>>,
    Json(req): Json<ErrorLogsRequest>,
) -> impl IntoResponse {
    let (status, body) = error_logs_inner(&state.ctx, req).await;
    (status, Json(body))
}

pub async fn order_status_handler(
    State(state): State<Arc<HttpState>>,
    Json(req): Json<OrderStatusRequest>,
) -> impl IntoResponse {
    let (status, body) = order_status_inner(&state.ctx, req).await;
    (status, Json(body))
}

pub async fn archive_handler(
    State(state): State<Arc<HttpState>>,
    Json(req): Json<ArchiveRequest>,
) -> impl IntoResponse {
    let (status, body) = archive_inner(&state.ctx, req).await;
    (status, Json(body))
}

// ============================================================================
// Helpers
// ============================================================================

async fn dispatch(ctx: &AppContext, request: OpsRequest) -> (StatusCode, serde_json::Value) {
    let response = crate::router::handle_request(request, ctx).await;
    match response_to_http(response) {
        Ok(data) => (StatusCode::OK, data),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, error_body(e)),
    }
}

fn error_body(msg: impl Into<String>) -> serde_json::Value {
    serde_json::json!(ErrorResponse::new(msg))
}

/// Convert an IPC `OpsResponse` into an HTTP body value, or an error string.
pub fn response_to_http(response: OpsResponse) -> std::result::Result<serde_json::Value, String> {
    if response.is_ok() {
        Ok(response.data.unwrap_or(serde_json::json!({})))
    } else {
        Err(response.error.unwrap_or_else(|| "unknown error".to_string()))
    }
}

// ============================================================================
// Unit Tests: pure helpers. Endpoint behaviour is covered in tests/
// ============================================================================
