// src/daemon/routes.rs

//! Axum router configuration for lockmgrd
//!
//! Defines all HTTP routes for the daemon REST API:
//! - `/health` - Health check endpoint
//! - `/v1/status` - Lock holder and handle cache snapshot
//! - `/v1/metrics` - Prometheus metrics
//! - `/v1/clients` - Init/close handshakes
//! - `/v1/lock` - Acquire and release the global lock
//! - `/v1/files` - Appends by the lock holder

use crate::coordinator::ClientId;
use crate::daemon::DaemonState;
use crate::protocol::{
    AppendRequest, DaemonError, HealthResponse, LockRequest, LockStatusResponse, RcResponse,
    StatusResponse,
};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, info};

/// Shared daemon state type
pub type SharedState = Arc<DaemonState>;

/// Error response wrapper for RFC 7807 format
pub struct ApiError(DaemonError);

impl From<DaemonError> for ApiError {
    fn from(err: DaemonError) -> Self {
        ApiError(err)
    }
}

impl From<crate::Error> for ApiError {
    fn from(err: crate::Error) -> Self {
        ApiError(DaemonError::from(&err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let body = Json(&self.0);

        (
            status,
            [("content-type", "application/problem+json")],
            body,
        )
            .into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

fn join_error(err: tokio::task::JoinError) -> ApiError {
    ApiError(DaemonError::internal(&format!("Task join error: {}", err)))
}

/// Build the main router
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .nest("/v1", build_v1_router())
        .with_state(state)
}

/// Build the v1 API router
fn build_v1_router() -> Router<SharedState> {
    Router::new()
        .route("/status", get(status_handler))
        .route("/metrics", get(metrics_handler))
        // Session handshakes
        .route("/clients/init", post(client_init_handler))
        .route("/clients/close", post(client_close_handler))
        // Global lock
        .route("/lock/acquire", post(acquire_handler))
        .route("/lock/release", post(release_handler))
        // Writes
        .route("/files/append", post(append_handler))
}

// =============================================================================
// Health & Status Handlers
// =============================================================================

/// Health check endpoint
///
/// GET /health
async fn health_handler(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        pid: std::process::id(),
        uptime_secs: state.uptime_secs(),
    })
}

/// Lock and handle cache snapshot
///
/// GET /v1/status
async fn status_handler(State(state): State<SharedState>) -> Json<LockStatusResponse> {
    Json(LockStatusResponse {
        holder: state.coordinator.holder(),
        waiting: state.coordinator.waiting(),
        open_handles: state.files.open_handles(),
        file_count: state.files.file_count(),
    })
}

/// Metrics endpoint (Prometheus format)
///
/// GET /v1/metrics
async fn metrics_handler(State(state): State<SharedState>) -> String {
    let m = &state.metrics;
    let held = u8::from(state.coordinator.holder().is_some());

    format!(
        r#"# HELP lockmgr_lock_acquired_total Locks granted
# TYPE lockmgr_lock_acquired_total counter
lockmgr_lock_acquired_total {}

# HELP lockmgr_lock_released_total Locks released by their holder
# TYPE lockmgr_lock_released_total counter
lockmgr_lock_released_total {}

# HELP lockmgr_release_rejected_total Releases by a client that did not hold the lock
# TYPE lockmgr_release_rejected_total counter
lockmgr_release_rejected_total {}

# HELP lockmgr_lock_held Whether the lock is currently held
# TYPE lockmgr_lock_held gauge
lockmgr_lock_held {}

# HELP lockmgr_lock_waiting Callers parked in acquire
# TYPE lockmgr_lock_waiting gauge
lockmgr_lock_waiting {}

# HELP lockmgr_append_ok_total Appends that succeeded
# TYPE lockmgr_append_ok_total counter
lockmgr_append_ok_total {}

# HELP lockmgr_append_failed_total Appends that were rejected or failed
# TYPE lockmgr_append_failed_total counter
lockmgr_append_failed_total {}

# HELP lockmgr_append_bytes_total Payload bytes appended
# TYPE lockmgr_append_bytes_total counter
lockmgr_append_bytes_total {}

# HELP lockmgr_connections_active Open client connections
# TYPE lockmgr_connections_active gauge
lockmgr_connections_active {}
"#,
        m.lock_acquired_total.load(Ordering::Relaxed),
        m.lock_released_total.load(Ordering::Relaxed),
        m.release_rejected_total.load(Ordering::Relaxed),
        held,
        state.coordinator.waiting(),
        m.append_ok_total.load(Ordering::Relaxed),
        m.append_failed_total.load(Ordering::Relaxed),
        m.append_bytes_total.load(Ordering::Relaxed),
        m.connections_active.load(Ordering::Relaxed),
    )
}

// =============================================================================
// Client Handshakes
// =============================================================================

/// Client session start
///
/// POST /v1/clients/init
///
/// Carries no state; always answers rc 0.
async fn client_init_handler(Json(req): Json<LockRequest>) -> Json<RcResponse> {
    info!("Client {} connected", req.client_id);
    Json(RcResponse { rc: 0 })
}

/// Client session end
///
/// POST /v1/clients/close
///
/// Does not release a lock the client still holds.
async fn client_close_handler(
    State(state): State<SharedState>,
    Json(req): Json<LockRequest>,
) -> Json<RcResponse> {
    if state.coordinator.is_held_by(req.client_id) {
        info!("Client {} closed while holding the lock", req.client_id);
    } else {
        info!("Client {} closed", req.client_id);
    }
    Json(RcResponse { rc: 0 })
}

// =============================================================================
// Lock Handlers
// =============================================================================

/// Acquire the global lock
///
/// POST /v1/lock/acquire
///
/// Granted inline when the lock is free. Otherwise the caller parks on its
/// own waiter thread, so parked acquires never occupy the blocking pool that
/// appends run on. There is no timeout.
async fn acquire_handler(
    State(state): State<SharedState>,
    Json(req): Json<LockRequest>,
) -> ApiResult<Json<StatusResponse>> {
    let client_id = req.client_id;

    if state.coordinator.try_acquire(client_id) {
        state.metrics.lock_acquired_total.fetch_add(1, Ordering::Relaxed);
    } else {
        park_until_granted(&state, client_id).await?;
    }

    Ok(Json(StatusResponse::success()))
}

/// Wait for the lock on a dedicated thread and await its grant
///
/// The grant is counted on the waiter thread: a client that hangs up while
/// parked still ends up holding the lock.
async fn park_until_granted(state: &SharedState, client_id: ClientId) -> ApiResult<()> {
    let (granted_tx, granted_rx) = oneshot::channel();
    let worker = state.clone();

    std::thread::Builder::new()
        .name(format!("lockmgr-acquire-{}", client_id))
        .spawn(move || {
            worker.coordinator.acquire(client_id);
            worker.metrics.lock_acquired_total.fetch_add(1, Ordering::Relaxed);
            // Receiver is gone when the client disconnected
            let _ = granted_tx.send(());
        })
        .map_err(|e| {
            ApiError(DaemonError::internal(&format!(
                "Failed to start acquire waiter: {}",
                e
            )))
        })?;

    granted_rx
        .await
        .map_err(|_| ApiError(DaemonError::internal("Acquire waiter exited without a grant")))
}

/// Release the global lock
///
/// POST /v1/lock/release
///
/// Only the holder may release. Anyone else gets a permission error and the
/// lock is left as it was.
async fn release_handler(
    State(state): State<SharedState>,
    Json(req): Json<LockRequest>,
) -> ApiResult<Json<StatusResponse>> {
    match state.coordinator.release(req.client_id) {
        Ok(()) => {
            state.metrics.lock_released_total.fetch_add(1, Ordering::Relaxed);
            Ok(Json(StatusResponse::success()))
        }
        Err(e) => {
            state.metrics.release_rejected_total.fetch_add(1, Ordering::Relaxed);
            Err(ApiError::from(e).with_instance("/v1/lock/release"))
        }
    }
}

// =============================================================================
// File Handlers
// =============================================================================

/// Append to a managed file
///
/// POST /v1/files/append
///
/// The caller must hold the global lock. The name is validated before any
/// I/O; the payload is written with a single write call.
async fn append_handler(
    State(state): State<SharedState>,
    Json(req): Json<AppendRequest>,
) -> ApiResult<Json<StatusResponse>> {
    let result = append_as_holder(&state, req).await;

    match &result {
        Ok(len) => {
            state.metrics.append_ok_total.fetch_add(1, Ordering::Relaxed);
            state.metrics.append_bytes_total.fetch_add(*len as u64, Ordering::Relaxed);
        }
        Err(_) => {
            state.metrics.append_failed_total.fetch_add(1, Ordering::Relaxed);
        }
    }

    result
        .map(|_| Json(StatusResponse::success()))
        .map_err(|e| e.with_instance("/v1/files/append"))
}

async fn append_as_holder(state: &SharedState, req: AppendRequest) -> ApiResult<usize> {
    if !state.coordinator.is_held_by(req.client_id) {
        return Err(crate::Error::NotHolder {
            client_id: req.client_id,
        }
        .into());
    }

    let content = req
        .decode_content()
        .map_err(|e| ApiError(DaemonError::bad_request(&format!("content is not valid base64: {}", e))))?;

    let worker = state.clone();
    let filename = req.filename;
    let len = content.len();

    tokio::task::spawn_blocking(move || worker.files.append(&filename, &content))
        .await
        .map_err(join_error)??;

    debug!("Client {} appended {} bytes", req.client_id, len);
    Ok(len)
}

impl ApiError {
    fn with_instance(self, instance: &str) -> Self {
        ApiError(self.0.with_instance(instance.to_string()))
    }
}
