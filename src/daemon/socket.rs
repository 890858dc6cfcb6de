// src/daemon/socket.rs

//! Listeners for lockmgrd
//!
//! The Unix socket is always bound. A TCP listener is added only when
//! `enable_tcp` is set. The socket file is removed again when the
//! [`SocketManager`] is dropped.

use crate::error::{Error, Result};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tokio::net::{TcpListener, UnixListener};
use tracing::{info, warn};

/// Where and how to listen
#[derive(Debug, Clone)]
pub struct SocketConfig {
    pub unix_path: PathBuf,
    /// Permission bits applied to the socket file
    pub unix_mode: u32,
    pub enable_tcp: bool,
    pub tcp_bind: Option<String>,
}

/// Owns the bound listeners until the accept loops take them
pub struct SocketManager {
    config: SocketConfig,
    unix_listener: Option<UnixListener>,
    tcp_listener: Option<TcpListener>,
}

impl SocketManager {
    pub fn new(config: SocketConfig) -> Self {
        Self {
            config,
            unix_listener: None,
            tcp_listener: None,
        }
    }

    /// Bind the Unix socket, then TCP if enabled
    pub async fn bind(&mut self) -> Result<()> {
        self.unix_listener = Some(bind_unix(&self.config.unix_path, self.config.unix_mode)?);

        if let (true, Some(addr)) = (self.config.enable_tcp, self.config.tcp_bind.as_deref()) {
            self.tcp_listener = Some(bind_tcp(addr).await?);
        }
        Ok(())
    }

    pub fn take_unix_listener(&mut self) -> Option<UnixListener> {
        self.unix_listener.take()
    }

    pub fn take_tcp_listener(&mut self) -> Option<TcpListener> {
        self.tcp_listener.take()
    }
}

impl Drop for SocketManager {
    fn drop(&mut self) {
        let path = &self.config.unix_path;
        match std::fs::remove_file(path) {
            Ok(()) => info!("Removed socket {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove socket {}: {}", path.display(), e),
        }
    }
}

/// Bind a Unix socket at `path`, replacing a leftover socket file
fn bind_unix(path: &Path, mode: u32) -> Result<UnixListener> {
    match std::fs::remove_file(path) {
        Ok(()) => warn!("Replaced stale socket {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(Error::file_op("remove stale socket", path, e)),
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| Error::file_op("create socket directory", parent, e))?;
    }

    let listener = UnixListener::bind(path).map_err(|e| {
        Error::Transport(format!("Failed to bind Unix socket at {}: {}", path.display(), e))
    })?;

    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
        .map_err(|e| Error::file_op("set permissions on", path, e))?;

    info!("Listening on unix://{} (mode {:o})", path.display(), mode);
    Ok(listener)
}

async fn bind_tcp(addr: &str) -> Result<TcpListener> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Transport(format!("Failed to bind TCP socket at {}: {}", addr, e)))?;

    match listener.local_addr() {
        Ok(local) => info!("Listening on tcp://{}", local),
        Err(_) => info!("Listening on tcp://{}", addr),
    }
    Ok(listener)
}
