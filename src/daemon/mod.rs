// src/daemon/mod.rs

//! lockmgrd - lock-granting service
//!
//! The daemon provides:
//! - Ownership of the single global lock (acquire/release)
//! - Serialized appends to `file_0 .. file_{N-1}` for the current holder
//! - Health, status and Prometheus metrics endpoints
//!
//! # Architecture
//!
//! ```text
//! client                                 lockmgrd
//!   │                                       │
//!   ├─ POST /v1/lock/acquire ─────────────► │ parks until the lock is free
//!   │◄──────────── 200 success ─────────────┤
//!   ├─ POST /v1/files/append ─────────────► │ holder check, then per-file write
//!   │◄──────────── 200 success ─────────────┤
//!   ├─ POST /v1/lock/release ─────────────► │ wakes every parked acquire
//!   │◄──────────── 200 success ─────────────┤
//! ```
//!
//! Lock ownership is process memory only. Restarting the daemon forgets the
//! holder and every parked caller.
//!
//! # Module Structure
//!
//! - `routes` - Axum router and request handlers
//! - `socket` - Unix socket and TCP listeners

pub mod routes;
pub mod socket;

use crate::coordinator::LockCoordinator;
use crate::error::{Error, Result};
use crate::files::{FileSerializer, DEFAULT_FILE_COUNT};
use axum::Router;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, UnixListener};
use tracing::{debug, error, info, warn};

pub use routes::{build_router, SharedState};
pub use socket::{SocketConfig, SocketManager};

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Path to Unix socket (default: /run/lockmgr/lockmgrd.sock)
    pub socket_path: PathBuf,
    /// Socket file mode (default: 0o660)
    pub socket_mode: u32,
    /// Enable TCP listener (default: false)
    pub enable_tcp: bool,
    /// TCP bind address (default: 127.0.0.1:50051)
    pub tcp_bind: Option<String>,
    /// Directory holding the managed files
    pub data_dir: PathBuf,
    /// Number of managed files
    pub file_count: u32,
    /// Sync each append before acknowledging it
    pub sync_writes: bool,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from("/run/lockmgr/lockmgrd.sock"),
            socket_mode: 0o660,
            enable_tcp: false,
            tcp_bind: Some("127.0.0.1:50051".to_string()),
            data_dir: PathBuf::from("data"),
            file_count: DEFAULT_FILE_COUNT,
            sync_writes: false,
        }
    }
}

impl DaemonConfig {
    /// Set the socket path
    pub fn with_socket_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.socket_path = path.into();
        self
    }

    /// Enable or disable TCP listener
    pub fn with_tcp(mut self, enable: bool, bind: Option<String>) -> Self {
        self.enable_tcp = enable;
        self.tcp_bind = bind;
        self
    }

    /// Set the data directory
    pub fn with_data_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.data_dir = path.into();
        self
    }

    /// Set the number of managed files
    pub fn with_file_count(mut self, count: u32) -> Self {
        self.file_count = count;
        self
    }

    /// Enable or disable synced appends
    pub fn with_sync_writes(mut self, enable: bool) -> Self {
        self.sync_writes = enable;
        self
    }

    fn socket_config(&self) -> SocketConfig {
        SocketConfig {
            unix_path: self.socket_path.clone(),
            unix_mode: self.socket_mode,
            enable_tcp: self.enable_tcp,
            tcp_bind: self.tcp_bind.clone(),
        }
    }
}

/// Daemon state (shared across handlers)
pub struct DaemonState {
    /// Configuration
    pub config: DaemonConfig,
    /// The global lock
    pub coordinator: LockCoordinator,
    /// Per-file append serialization
    pub files: FileSerializer,
    /// Metrics
    pub metrics: DaemonMetrics,
    started_at: Instant,
}

impl DaemonState {
    /// Create a new daemon state with an unheld lock
    pub fn new(config: DaemonConfig) -> Self {
        let files = FileSerializer::new(&config.data_dir)
            .with_file_count(config.file_count)
            .with_sync_writes(config.sync_writes);

        Self {
            config,
            coordinator: LockCoordinator::new(),
            files,
            metrics: DaemonMetrics::default(),
            started_at: Instant::now(),
        }
    }

    /// Seconds since the state was created
    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

/// Daemon metrics
#[derive(Debug, Default)]
pub struct DaemonMetrics {
    /// Locks granted
    pub lock_acquired_total: AtomicU64,
    /// Locks released by their holder
    pub lock_released_total: AtomicU64,
    /// Releases rejected because the caller was not the holder
    pub release_rejected_total: AtomicU64,
    /// Appends that succeeded
    pub append_ok_total: AtomicU64,
    /// Appends rejected or failed
    pub append_failed_total: AtomicU64,
    /// Payload bytes appended
    pub append_bytes_total: AtomicU64,
    /// Open client connections
    pub connections_active: AtomicU64,
}

/// Run the daemon
///
/// This is the main entry point for the daemon. It:
/// 1. Creates any missing data files
/// 2. Binds to the Unix and optionally TCP sockets
/// 3. Serves the Axum router until `shutdown` resolves
/// 4. Closes every cached file handle
///
/// Acquire calls still parked at shutdown stay on their waiter threads and
/// end with the process.
pub async fn run_daemon<F>(config: DaemonConfig, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send,
{
    info!("Starting lockmgrd version {}", env!("CARGO_PKG_VERSION"));

    let state = Arc::new(DaemonState::new(config.clone()));

    let bootstrap = state.clone();
    tokio::task::spawn_blocking(move || bootstrap.files.create_all())
        .await
        .map_err(|e| Error::Transport(format!("Bootstrap task failed: {}", e)))??;

    let app = build_router(state.clone());

    let mut socket_manager = SocketManager::new(config.socket_config());
    socket_manager.bind().await?;

    let mut accept_tasks = tokio::task::JoinSet::new();
    if let Some(listener) = socket_manager.take_unix_listener() {
        accept_tasks.spawn(accept_unix(listener, app.clone(), state.clone()));
    }
    if let Some(listener) = socket_manager.take_tcp_listener() {
        accept_tasks.spawn(accept_tcp(listener, app.clone(), state.clone()));
    }

    info!("Daemon ready, accepting connections");

    shutdown.await;
    info!("Received shutdown signal");

    accept_tasks.abort_all();

    let closed = state.files.cleanup();
    if let Some(holder) = state.coordinator.holder() {
        warn!("Shutting down while client {} holds the lock", holder);
    }
    info!("Daemon shutting down ({} file handle(s) closed)", closed);

    // Socket file is removed when socket_manager drops
    Ok(())
}

async fn accept_unix(listener: UnixListener, app: Router, state: SharedState) {
    loop {
        match listener.accept().await {
            Ok((stream, _addr)) => {
                tokio::spawn(serve_connection(stream, app.clone(), state.clone()));
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}

async fn accept_tcp(listener: TcpListener, app: Router, state: SharedState) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                debug!("Accepted TCP connection from {}", addr);
                tokio::spawn(serve_connection(stream, app.clone(), state.clone()));
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}

async fn serve_connection<S>(stream: S, app: Router, state: SharedState)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    use hyper::server::conn::http1;
    use hyper_util::rt::TokioIo;
    use hyper_util::service::TowerToHyperService;

    state.metrics.connections_active.fetch_add(1, Ordering::Relaxed);

    let io = TokioIo::new(stream);
    let service = TowerToHyperService::new(app);
    if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
        warn!("Error serving connection: {:?}", err);
    }

    state.metrics.connections_active.fetch_sub(1, Ordering::Relaxed);
}
