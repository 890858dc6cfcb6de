// src/config.rs
//! Configuration file parsing for lockmgrd
//!
//! Supports TOML configuration files with the following sections:
//! - [server] - Unix socket and optional TCP listener
//! - [storage] - Data directory, number of files, write durability
//!
//! Every field has a default, so an empty file (or no file at all) is valid.

use crate::files::{FileSerializer, DEFAULT_FILE_COUNT};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// TOML configuration file structure
#[derive(Debug, Default, Deserialize)]
pub struct LockmgrConfig {
    /// Listener settings
    #[serde(default)]
    pub server: ServerSection,

    /// File storage settings
    #[serde(default)]
    pub storage: StorageSection,
}

/// Server configuration section
#[derive(Debug, Deserialize)]
pub struct ServerSection {
    /// Path to the Unix socket
    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,

    /// Unix socket file permissions
    #[serde(default = "default_socket_mode")]
    pub socket_mode: u32,

    /// Also listen on TCP
    #[serde(default)]
    pub enable_tcp: bool,

    /// TCP bind address
    #[serde(default = "default_tcp_bind")]
    pub tcp_bind: Option<String>,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            socket_mode: default_socket_mode(),
            enable_tcp: false,
            tcp_bind: default_tcp_bind(),
        }
    }
}

fn default_socket_path() -> PathBuf {
    PathBuf::from("/run/lockmgr/lockmgrd.sock")
}

fn default_socket_mode() -> u32 {
    0o660
}

fn default_tcp_bind() -> Option<String> {
    Some("127.0.0.1:50051".to_string())
}

/// Storage configuration section
#[derive(Debug, Deserialize)]
pub struct StorageSection {
    /// Directory holding file_0 .. file_{file_count - 1}
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Number of managed files
    #[serde(default = "default_file_count")]
    pub file_count: u32,

    /// Sync every append to stable storage before acknowledging it
    #[serde(default)]
    pub sync_writes: bool,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            file_count: default_file_count(),
            sync_writes: false,
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_file_count() -> u32 {
    DEFAULT_FILE_COUNT
}

impl LockmgrConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: LockmgrConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Create a default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.storage.file_count == 0 {
            anyhow::bail!("storage.file_count must be greater than zero");
        }

        if self.server.enable_tcp && self.server.tcp_bind.is_none() {
            anyhow::bail!("server.tcp_bind is required when server.enable_tcp is set");
        }

        if self.server.socket_mode > 0o777 {
            anyhow::bail!(
                "server.socket_mode {:o} is not a valid permission mode",
                self.server.socket_mode
            );
        }

        Ok(())
    }

    /// Build the file serializer described by the [storage] section
    pub fn serializer(&self) -> FileSerializer {
        FileSerializer::new(&self.storage.data_dir)
            .with_file_count(self.storage.file_count)
            .with_sync_writes(self.storage.sync_writes)
    }

    /// Convert to the runtime daemon configuration
    #[cfg(feature = "daemon")]
    pub fn to_daemon_config(&self) -> crate::daemon::DaemonConfig {
        crate::daemon::DaemonConfig {
            socket_path: self.server.socket_path.clone(),
            socket_mode: self.server.socket_mode,
            enable_tcp: self.server.enable_tcp,
            tcp_bind: self.server.tcp_bind.clone(),
            data_dir: self.storage.data_dir.clone(),
            file_count: self.storage.file_count,
            sync_writes: self.storage.sync_writes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = LockmgrConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.storage.file_count, 100);
        assert_eq!(config.storage.data_dir, PathBuf::from("data"));
        assert!(!config.storage.sync_writes);
        assert_eq!(config.server.tcp_bind.as_deref(), Some("127.0.0.1:50051"));
    }

    #[test]
    fn test_parse_full_file() {
        let config: LockmgrConfig = toml::from_str(
            r#"
            [server]
            socket_path = "/tmp/lockmgr.sock"
            socket_mode = 0o600
            enable_tcp = true
            tcp_bind = "0.0.0.0:6000"

            [storage]
            data_dir = "/srv/lockmgr"
            file_count = 12
            sync_writes = true
            "#,
        )
        .unwrap();

        assert!(config.validate().is_ok());
        assert_eq!(config.server.socket_path, PathBuf::from("/tmp/lockmgr.sock"));
        assert_eq!(config.server.socket_mode, 0o600);
        assert!(config.server.enable_tcp);
        assert_eq!(config.server.tcp_bind.as_deref(), Some("0.0.0.0:6000"));
        assert_eq!(config.storage.file_count, 12);
        assert!(config.storage.sync_writes);
    }

    #[test]
    fn test_partial_sections_use_defaults() {
        let config: LockmgrConfig = toml::from_str("[storage]\nfile_count = 3\n").unwrap();
        assert_eq!(config.storage.file_count, 3);
        assert_eq!(config.storage.data_dir, PathBuf::from("data"));
        assert_eq!(config.server.socket_mode, 0o660);
    }

    #[test]
    fn test_zero_files_rejected() {
        let config: LockmgrConfig = toml::from_str("[storage]\nfile_count = 0\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_tcp_without_bind_rejected() {
        let mut config = LockmgrConfig::default();
        config.server.enable_tcp = true;
        config.server.tcp_bind = None;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("lockmgr.toml");
        std::fs::write(&path, "[storage]\ndata_dir = \"files\"\nfile_count = 4\n").unwrap();

        let config = LockmgrConfig::load(&path).unwrap();
        let serializer = config.serializer();
        assert_eq!(serializer.file_count(), 4);
        assert_eq!(serializer.data_dir(), Path::new("files"));
    }

    #[test]
    fn test_load_missing_file_fails() {
        let err = LockmgrConfig::load(Path::new("/nonexistent/lockmgr.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
