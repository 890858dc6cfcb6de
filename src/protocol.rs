// src/protocol.rs

//! Request and response bodies shared by lockmgrd and `LockClient`
//!
//! Everything travels as JSON over HTTP/1.1. Append payloads are base64
//! (standard alphabet) so arbitrary bytes survive the JSON encoding. Errors
//! use the RFC 7807 problem format.

use crate::coordinator::ClientId;
use crate::error::ErrorKind;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

/// Body of init, close, acquire and release calls
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LockRequest {
    pub client_id: ClientId,
}

/// Body of an append call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendRequest {
    pub client_id: ClientId,
    pub filename: String,
    /// Payload, base64-encoded
    pub content: String,
}

impl AppendRequest {
    /// Build a request, encoding `content`
    pub fn new(client_id: ClientId, filename: &str, content: &[u8]) -> Self {
        Self {
            client_id,
            filename: filename.to_string(),
            content: STANDARD.encode(content),
        }
    }

    /// Decode the payload bytes
    pub fn decode_content(&self) -> Result<Vec<u8>, base64::DecodeError> {
        STANDARD.decode(&self.content)
    }
}

/// Acknowledgement for successful lock and append calls
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
}

impl StatusResponse {
    pub fn success() -> Self {
        Self {
            status: "success".to_string(),
        }
    }
}

/// Return code for client init/close handshakes (always 0)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RcResponse {
    pub rc: i32,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub pid: u32,
    pub uptime_secs: u64,
}

/// Snapshot of lock and storage state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockStatusResponse {
    /// Current holder, `None` when unheld
    pub holder: Option<ClientId>,
    /// Callers parked in acquire
    pub waiting: usize,
    /// Cached open file handles
    pub open_handles: usize,
    /// Number of managed files
    pub file_count: u32,
}

/// Error response format (RFC 7807)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonError {
    /// Error type URI
    #[serde(rename = "type")]
    pub error_type: String,
    /// Human-readable title
    pub title: String,
    /// HTTP status code
    pub status: u16,
    /// Detailed description
    pub detail: String,
    /// Instance URI (the request that caused the error)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
}

const ERROR_URN_PREFIX: &str = "urn:lockmgr:error:";

impl DaemonError {
    /// Create a new daemon error
    pub fn new(error_type: &str, title: &str, status: u16, detail: &str) -> Self {
        Self {
            error_type: format!("{}{}", ERROR_URN_PREFIX, error_type),
            title: title.to_string(),
            status,
            detail: detail.to_string(),
            instance: None,
        }
    }

    /// Caller does not hold the lock
    pub fn permission(detail: &str) -> Self {
        Self::new("permission", "Forbidden", 403, detail)
    }

    /// Invalid resource name
    pub fn validation(detail: &str) -> Self {
        Self::new("validation", "Invalid Resource", 400, detail)
    }

    /// Malformed request body
    pub fn bad_request(detail: &str) -> Self {
        Self::new("bad_request", "Bad Request", 400, detail)
    }

    /// Storage failure
    pub fn file_error(detail: &str) -> Self {
        Self::new("file", "File Operation Failed", 500, detail)
    }

    /// Internal error
    pub fn internal(detail: &str) -> Self {
        Self::new("internal", "Internal Error", 500, detail)
    }

    /// Set the instance URI
    pub fn with_instance(mut self, instance: String) -> Self {
        self.instance = Some(instance);
        self
    }

    /// Error kind this problem type stands for
    pub fn kind(&self) -> ErrorKind {
        match self.error_type.strip_prefix(ERROR_URN_PREFIX) {
            Some("permission") => ErrorKind::Permission,
            Some("validation") | Some("bad_request") => ErrorKind::Validation,
            Some("file") => ErrorKind::Io,
            _ => ErrorKind::Transport,
        }
    }
}

impl From<&crate::Error> for DaemonError {
    fn from(err: &crate::Error) -> Self {
        let detail = err.to_string();
        match err.kind() {
            ErrorKind::Permission => Self::permission(&detail),
            ErrorKind::Validation => Self::validation(&detail),
            ErrorKind::Io => Self::file_error(&detail),
            ErrorKind::Config | ErrorKind::Transport => Self::internal(&detail),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_content_survives_binary() {
        let payload = [0u8, 159, 146, 150, b'\n', 255];
        let request = AppendRequest::new(3, "file_1", &payload);
        let json = serde_json::to_string(&request).unwrap();

        let parsed: AppendRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.client_id, 3);
        assert_eq!(parsed.filename, "file_1");
        assert_eq!(parsed.decode_content().unwrap(), payload);
    }

    #[test]
    fn test_bad_base64_is_rejected() {
        let request = AppendRequest {
            client_id: 1,
            filename: "file_0".to_string(),
            content: "not base64!".to_string(),
        };
        assert!(request.decode_content().is_err());
    }

    #[test]
    fn test_error_kind_mapping() {
        let cases = [
            (crate::Error::NotHolder { client_id: 1 }, 403, ErrorKind::Permission),
            (
                crate::Error::InvalidResource {
                    name: "bogus".to_string(),
                    reason: "nope".to_string(),
                },
                400,
                ErrorKind::Validation,
            ),
            (
                crate::Error::ShortWrite {
                    path: "data/file_0".into(),
                    written: 1,
                    expected: 2,
                },
                500,
                ErrorKind::Io,
            ),
        ];

        for (err, status, kind) in cases {
            let problem = DaemonError::from(&err);
            assert_eq!(problem.status, status);
            assert_eq!(problem.kind(), kind);
        }
    }

    #[test]
    fn test_daemon_error_serialization() {
        let error = DaemonError::permission("client 2 does not hold the lock")
            .with_instance("/v1/lock/release".to_string());
        let json = serde_json::to_string(&error).unwrap();

        assert!(json.contains("\"type\":\"urn:lockmgr:error:permission\""));
        assert!(json.contains("/v1/lock/release"));

        let parsed: DaemonError = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.kind(), ErrorKind::Permission);
    }

    #[test]
    fn test_unknown_problem_type_is_transport() {
        let error = DaemonError::internal("boom");
        assert_eq!(error.kind(), ErrorKind::Transport);
    }
}
