// src/client.rs

//! Blocking client for lockmgrd
//!
//! Each call opens a fresh connection, sends one HTTP/1.1 request with
//! `Connection: close`, and reads the response to EOF.
//!
//! # Example
//!
//! ```ignore
//! use lockmgr::{Endpoint, LockClient};
//!
//! let client = LockClient::new("/run/lockmgr/lockmgrd.sock".parse()?);
//! client.init(1)?;
//! client.append_locked(1, "file_0", b"A")?;
//! client.close(1)?;
//! ```

use crate::coordinator::ClientId;
use crate::error::{Error, Result};
use crate::protocol::{
    AppendRequest, DaemonError, HealthResponse, LockRequest, LockStatusResponse, RcResponse,
    StatusResponse,
};
use std::fmt;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

/// Where the daemon listens
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// Unix domain socket path
    Unix(PathBuf),
    /// TCP `host:port`
    Tcp(String),
}

impl Default for Endpoint {
    fn default() -> Self {
        Endpoint::Unix(PathBuf::from("/run/lockmgr/lockmgrd.sock"))
    }
}

impl FromStr for Endpoint {
    type Err = Error;

    /// Accepts `unix://<path>`, `tcp://<host:port>`, a bare `host:port`, or a
    /// bare socket path.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::Config("endpoint must not be empty".to_string()));
        }

        if let Some(addr) = s.strip_prefix("tcp://") {
            if addr.is_empty() {
                return Err(Error::Config("tcp endpoint is missing an address".to_string()));
            }
            return Ok(Endpoint::Tcp(addr.to_string()));
        }
        if let Some(path) = s.strip_prefix("unix://") {
            if path.is_empty() {
                return Err(Error::Config("unix endpoint is missing a path".to_string()));
            }
            return Ok(Endpoint::Unix(PathBuf::from(path)));
        }

        if !s.contains('/') && s.rsplit_once(':').is_some_and(|(_, port)| port.parse::<u16>().is_ok()) {
            Ok(Endpoint::Tcp(s.to_string()))
        } else {
            Ok(Endpoint::Unix(PathBuf::from(s)))
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Unix(path) => write!(f, "unix://{}", path.display()),
            Endpoint::Tcp(addr) => write!(f, "tcp://{}", addr),
        }
    }
}

/// An open connection of either kind
enum Conn {
    Unix(UnixStream),
    Tcp(TcpStream),
}

impl Conn {
    fn set_timeouts(&self, read: Option<Duration>, write: Option<Duration>) -> std::io::Result<()> {
        match self {
            Conn::Unix(s) => {
                s.set_read_timeout(read)?;
                s.set_write_timeout(write)
            }
            Conn::Tcp(s) => {
                s.set_read_timeout(read)?;
                s.set_write_timeout(write)
            }
        }
    }
}

impl Read for Conn {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            Conn::Unix(s) => s.read(buf),
            Conn::Tcp(s) => s.read(buf),
        }
    }
}

impl Write for Conn {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            Conn::Unix(s) => s.write(buf),
            Conn::Tcp(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            Conn::Unix(s) => s.flush(),
            Conn::Tcp(s) => s.flush(),
        }
    }
}

/// HTTP response from daemon
struct HttpResponse {
    status_code: u16,
    body: String,
}

/// Client for lockmgrd
#[derive(Debug, Clone)]
pub struct LockClient {
    endpoint: Endpoint,
    /// Read/write timeout for every call except acquire
    timeout: Duration,
}

impl LockClient {
    /// Create a client for `endpoint`
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            timeout: Duration::from_secs(30),
        }
    }

    /// Set the timeout for non-blocking calls
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Endpoint this client talks to
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Check that the daemon is up
    pub fn health(&self) -> Result<HealthResponse> {
        let response = self.request("GET", "/health", None, Some(self.timeout))?;
        parse_response(response)
    }

    /// Lock holder and handle cache snapshot
    pub fn status(&self) -> Result<LockStatusResponse> {
        let response = self.request("GET", "/v1/status", None, Some(self.timeout))?;
        parse_response(response)
    }

    /// Session start handshake; returns the daemon's rc (always 0)
    pub fn init(&self, client_id: ClientId) -> Result<i32> {
        let response: RcResponse = self.post("/v1/clients/init", &LockRequest { client_id }, Some(self.timeout))?;
        Ok(response.rc)
    }

    /// Session end handshake; returns the daemon's rc (always 0)
    pub fn close(&self, client_id: ClientId) -> Result<i32> {
        let response: RcResponse = self.post("/v1/clients/close", &LockRequest { client_id }, Some(self.timeout))?;
        Ok(response.rc)
    }

    /// Block until the daemon grants the lock to `client_id`
    ///
    /// No read timeout applies; the call may wait indefinitely.
    pub fn acquire(&self, client_id: ClientId) -> Result<()> {
        let _: StatusResponse = self.post("/v1/lock/acquire", &LockRequest { client_id }, None)?;
        Ok(())
    }

    /// Release the lock held by `client_id`
    pub fn release(&self, client_id: ClientId) -> Result<()> {
        let _: StatusResponse = self.post("/v1/lock/release", &LockRequest { client_id }, Some(self.timeout))?;
        Ok(())
    }

    /// Append `content` to `filename`; `client_id` must hold the lock
    pub fn append(&self, client_id: ClientId, filename: &str, content: &[u8]) -> Result<()> {
        let request = AppendRequest::new(client_id, filename, content);
        let _: StatusResponse = self.post("/v1/files/append", &request, Some(self.timeout))?;
        Ok(())
    }

    /// Acquire, append once, then release
    ///
    /// The release is attempted even when the append fails. The first error
    /// wins.
    pub fn append_locked(&self, client_id: ClientId, filename: &str, content: &[u8]) -> Result<()> {
        self.acquire(client_id)?;
        let appended = self.append(client_id, filename, content);
        let released = self.release(client_id);
        appended.and(released)
    }

    fn post<B, T>(&self, path: &str, body: &B, read_timeout: Option<Duration>) -> Result<T>
    where
        B: serde::Serialize,
        T: serde::de::DeserializeOwned,
    {
        let body = serde_json::to_string(body)
            .map_err(|e| Error::Transport(format!("Failed to encode request: {}", e)))?;
        let response = self.request("POST", path, Some(&body), read_timeout)?;
        parse_response(response)
    }

    fn connect(&self) -> Result<Conn> {
        let conn = match &self.endpoint {
            Endpoint::Unix(path) => UnixStream::connect(path).map(Conn::Unix),
            Endpoint::Tcp(addr) => TcpStream::connect(addr).map(Conn::Tcp),
        };
        conn.map_err(|e| transport(&format!("connect to {}", self.endpoint), e))
    }

    /// Make an HTTP request to the daemon
    fn request(
        &self,
        method: &str,
        path: &str,
        body: Option<&str>,
        read_timeout: Option<Duration>,
    ) -> Result<HttpResponse> {
        let mut stream = self.connect()?;
        stream
            .set_timeouts(read_timeout, Some(self.timeout))
            .map_err(|e| transport("configure connection", e))?;

        let content_length = body.map(|b| b.len()).unwrap_or(0);
        let mut request = format!(
            "{} {} HTTP/1.1\r\n\
             Host: localhost\r\n\
             Content-Type: application/json\r\n\
             Content-Length: {}\r\n\
             Connection: close\r\n\
             \r\n",
            method, path, content_length
        );

        if let Some(body) = body {
            request.push_str(body);
        }

        debug!("{} {} via {}", method, path, self.endpoint);
        stream
            .write_all(request.as_bytes())
            .map_err(|e| transport("send request", e))?;

        let mut response = String::new();
        stream
            .read_to_string(&mut response)
            .map_err(|e| transport("read response", e))?;

        parse_http_response(&response)
    }
}

/// Socket failures talking to the daemon are transport errors, never storage ones
fn transport(action: &str, err: std::io::Error) -> Error {
    Error::Transport(format!("Failed to {}: {}", action, err))
}

/// Split a raw HTTP response into status code and body
fn parse_http_response(response: &str) -> Result<HttpResponse> {
    let (head, body) = response
        .split_once("\r\n\r\n")
        .ok_or_else(|| Error::Transport("Malformed response from daemon".to_string()))?;

    let status_line = head
        .lines()
        .next()
        .ok_or_else(|| Error::Transport("Empty response from daemon".to_string()))?;

    let status_code: u16 = status_line
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| Error::Transport(format!("Bad status line: {}", status_line)))?;

    Ok(HttpResponse {
        status_code,
        body: body.to_string(),
    })
}

/// Parse successful response body
fn parse_response<T: serde::de::DeserializeOwned>(response: HttpResponse) -> Result<T> {
    if (200..300).contains(&response.status_code) {
        serde_json::from_str(&response.body)
            .map_err(|e| Error::Transport(format!("Failed to parse response: {}", e)))
    } else {
        Err(parse_error(response))
    }
}

/// Turn a non-2xx response into an error, keeping the problem kind
fn parse_error(response: HttpResponse) -> Error {
    match serde_json::from_str::<DaemonError>(&response.body) {
        Ok(problem) => Error::Remote {
            kind: problem.kind(),
            status: problem.status,
            detail: problem.detail,
        },
        Err(_) => Error::Transport(format!(
            "Request failed with status {}: {}",
            response.status_code,
            response.body.trim()
        )),
    }
}
