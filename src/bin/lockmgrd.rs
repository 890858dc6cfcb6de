// src/bin/lockmgrd.rs

//! lockmgrd - lock service daemon

use anyhow::{Context, Result};
use clap::Parser;
use lockmgr::daemon::run_daemon;
use lockmgr::LockmgrConfig;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

#[derive(Parser)]
#[command(name = "lockmgrd")]
#[command(author, version, about = "Single-lock coordination daemon", long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Unix socket path (overrides config)
    #[arg(long)]
    socket: Option<PathBuf>,

    /// Also listen on this TCP address, e.g. 127.0.0.1:50051
    #[arg(long)]
    tcp: Option<String>,

    /// Data directory (overrides config)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Number of managed files (overrides config)
    #[arg(long)]
    file_count: Option<u32>,

    /// Sync every append to disk before acknowledging it
    #[arg(long)]
    sync: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => LockmgrConfig::load(path)?,
        None => LockmgrConfig::new(),
    };

    if let Some(socket) = args.socket {
        config.server.socket_path = socket;
    }
    if let Some(tcp) = args.tcp {
        config.server.enable_tcp = true;
        config.server.tcp_bind = Some(tcp);
    }
    if let Some(data_dir) = args.data_dir {
        config.storage.data_dir = data_dir;
    }
    if let Some(file_count) = args.file_count {
        config.storage.file_count = file_count;
    }
    if args.sync {
        config.storage.sync_writes = true;
    }
    config.validate()?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;

    let result = runtime.block_on(run_daemon(config.to_daemon_config(), async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for shutdown signal: {}", e);
        }
    }));

    // Bounded wait for appends still running on the blocking pool
    runtime.shutdown_timeout(Duration::from_secs(1));
    info!("lockmgrd stopped");

    result.context("Daemon failed")
}
