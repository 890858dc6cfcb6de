// src/lib.rs

//! lockmgr - single-process lock manager
//!
//! Clients take one global exclusive lock, append to a fixed set of numbered
//! files while holding it, then release it.
//!
//! # Architecture
//!
//! - `coordinator` - the global lock: ownership state plus broadcast wake-up
//! - `files` - per-file write serialization and the open-handle cache
//! - `daemon` - HTTP/JSON service wiring the two together (feature `daemon`)
//! - `client` - blocking client for the daemon
//! - `protocol` - JSON bodies shared by the daemon and the client
//!
//! The coordinator and the serializer never call each other. The daemon's
//! handlers check lock ownership before every append.

pub mod client;
pub mod config;
pub mod coordinator;
mod error;
pub mod files;
pub mod protocol;

#[cfg(feature = "daemon")]
pub mod daemon;

pub use client::{Endpoint, LockClient};
pub use config::LockmgrConfig;
pub use coordinator::{ClientId, LockCoordinator, LockState};
pub use error::{Error, ErrorKind, Result};
pub use files::{FileSerializer, ResourceName, DEFAULT_FILE_COUNT};
