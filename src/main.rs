// src/main.rs

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lockmgr::{Endpoint, FileSerializer, LockClient};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "lockmgr")]
#[command(author, version, about = "Client for the lockmgrd lock service", long_about = None)]
struct Cli {
    /// Daemon endpoint: a socket path, unix://PATH, tcp://HOST:PORT or HOST:PORT
    #[arg(short, long, global = true, default_value = "/run/lockmgr/lockmgrd.sock")]
    endpoint: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the managed files locally without a daemon
    Init {
        /// Data directory
        #[arg(short, long, default_value = "data")]
        data_dir: PathBuf,
        /// Number of files
        #[arg(short = 'n', long, default_value_t = lockmgr::DEFAULT_FILE_COUNT)]
        file_count: u32,
    },
    /// Block until the lock is granted
    Acquire {
        #[arg(short, long)]
        client_id: i32,
    },
    /// Release the lock
    Release {
        #[arg(short, long)]
        client_id: i32,
    },
    /// Append to a file (the client must already hold the lock)
    Append {
        #[arg(short, long)]
        client_id: i32,
        /// Target file, e.g. file_0
        #[arg(short, long)]
        file: String,
        /// Bytes to append
        #[arg(short, long)]
        data: String,
    },
    /// Full session: init, acquire, append, release, close
    Write {
        #[arg(short, long)]
        client_id: i32,
        /// Target file, e.g. file_0
        #[arg(short, long)]
        file: String,
        /// Bytes to append
        #[arg(short, long)]
        data: String,
    },
    /// Show the lock holder and handle cache
    Status,
    /// Check that the daemon is up
    Health,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    if let Commands::Init {
        data_dir,
        file_count,
    } = &cli.command
    {
        let serializer = FileSerializer::new(data_dir).with_file_count(*file_count);
        let created = serializer.create_all()?;
        println!(
            "{} file(s) ready in {} ({} created)",
            file_count,
            data_dir.display(),
            created
        );
        return Ok(());
    }

    let endpoint: Endpoint = cli
        .endpoint
        .parse()
        .with_context(|| format!("Invalid endpoint: {}", cli.endpoint))?;
    let client = LockClient::new(endpoint);

    match cli.command {
        Commands::Init { .. } => {}
        Commands::Acquire { client_id } => {
            client.acquire(client_id)?;
            println!("Client {} holds the lock", client_id);
        }
        Commands::Release { client_id } => {
            client.release(client_id)?;
            println!("Client {} released the lock", client_id);
        }
        Commands::Append {
            client_id,
            file,
            data,
        } => {
            client.append(client_id, &file, data.as_bytes())?;
            println!("Appended {} byte(s) to {}", data.len(), file);
        }
        Commands::Write {
            client_id,
            file,
            data,
        } => {
            client.init(client_id)?;
            info!("Client {} waiting for the lock", client_id);
            let written = client.append_locked(client_id, &file, data.as_bytes());
            client.close(client_id)?;
            written?;
            println!("Client {} appended {} byte(s) to {}", client_id, data.len(), file);
        }
        Commands::Status => {
            let status = client.status()?;
            match status.holder {
                Some(holder) => println!("Holder: client {}", holder),
                None => println!("Holder: none"),
            }
            println!("Waiting: {}", status.waiting);
            println!("Open handles: {}", status.open_handles);
            println!("Files: {}", status.file_count);
        }
        Commands::Health => {
            let health = client.health()?;
            println!(
                "{} (version {}, pid {}, up {}s)",
                health.status, health.version, health.pid, health.uptime_secs
            );
        }
    }

    Ok(())
}
