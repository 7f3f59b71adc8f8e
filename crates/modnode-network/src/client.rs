//! HTTP client for reporting to the coordinator.
//!
//! The coordinator learns which modules a node carries through a single JSON
//! POST. This module provides the transport for it: one short-lived TCP
//! connection per report, `Connection: close`, every I/O step bounded by the
//! configured timeout.
//!
//! # Design Principles
//!
//! The client is a plain transport:
//! - **No automatic retry**: the reporter decides the retry strategy
//! - **No keepalive**: one connection per report
//! - **Any response counts**: the status line is parsed for logging only
//!
//! # Example Usage
//!
//! ```no_run
//! use modnode_network::{CoordinatorClient, CoordinatorClientConfig, ReportEntry};
//! use modnode_core::ModuleId;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = CoordinatorClient::new(
//!     CoordinatorClientConfig::default().timeout(Duration::from_millis(1500)),
//! );
//!
//! let entries = vec![ReportEntry::new("Relay", ModuleId::new("8c1f02a4d9e37b60")?, "10.0.0.7:8080")];
//! client
//!     .post_json("10.0.0.1", 5002, "/rasberry/Peripheral/refreshPeripherals", &serde_json::to_vec(&entries)?)
//!     .await?;
//! # Ok(())
//! # }
//! ```

use crate::error::ClientError;
use futures::future::BoxFuture;
use modnode_core::ModuleId;
use modnode_core::constants::DEFAULT_NETWORK_TIMEOUT_MS;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info, trace, warn};

/// Size of the response prefix read back from the coordinator.
const RESPONSE_READ_LIMIT: usize = 1024;

/// One module in a coordinator report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportEntry {
    #[serde(rename = "PeripheralType")]
    pub peripheral_type: String,

    #[serde(rename = "Uuid")]
    pub uuid: ModuleId,

    /// `<node_ip>:<http_port>` where the module can be reached
    #[serde(rename = "Url")]
    pub url: String,
}

impl ReportEntry {
    pub fn new(peripheral_type: impl Into<String>, uuid: ModuleId, url: impl Into<String>) -> Self {
        Self {
            peripheral_type: peripheral_type.into(),
            uuid,
            url: url.into(),
        }
    }
}

/// Transport used by the reporter.
///
/// Object-safe so the reporter can hold an `Arc<dyn ReportTransport>` and tests
/// can script failures.
pub trait ReportTransport: Send + Sync {
    /// Deliver `entries` to `host:port` at `path`.
    fn send_report<'a>(
        &'a self,
        host: &'a str,
        port: u16,
        path: &'a str,
        entries: &'a [ReportEntry],
    ) -> BoxFuture<'a, Result<(), ClientError>>;
}

/// Configuration for [`CoordinatorClient`]
///
/// # Example
///
/// ```
/// use modnode_network::CoordinatorClientConfig;
/// use std::time::Duration;
///
/// let config = CoordinatorClientConfig::default().timeout(Duration::from_millis(500));
/// assert_eq!(config.timeout, Duration::from_millis(500));
/// ```
#[derive(Debug, Clone)]
pub struct CoordinatorClientConfig {
    /// Timeout for each I/O step (connect, write, read)
    pub timeout: Duration,
}

impl Default for CoordinatorClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(DEFAULT_NETWORK_TIMEOUT_MS),
        }
    }
}

impl CoordinatorClientConfig {
    /// Set the per-step timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Build the raw HTTP/1.1 POST request.
pub fn build_request(host: &str, path: &str, body: &[u8]) -> Vec<u8> {
    let mut request = format!(
        "POST {path} HTTP/1.1\r\nHost: {host}\r\nAccept: */*\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    )
    .into_bytes();
    request.extend_from_slice(body);
    request
}

/// Status code from the first line of a raw HTTP response.
pub fn parse_status_line(response: &[u8]) -> Option<u16> {
    let text = std::str::from_utf8(response).ok()?;
    let line = text.lines().next()?;
    let mut parts = line.split_whitespace();
    if !parts.next()?.starts_with("HTTP/") {
        return None;
    }
    parts.next()?.parse().ok()
}

/// HTTP client for the coordinator.
#[derive(Debug, Clone)]
pub struct CoordinatorClient {
    timeout: Duration,
}

impl Default for CoordinatorClient {
    fn default() -> Self {
        Self::new(CoordinatorClientConfig::default())
    }
}

impl CoordinatorClient {
    pub fn new(config: CoordinatorClientConfig) -> Self {
        Self {
            timeout: config.timeout,
        }
    }

    fn timeout_ms(&self) -> u64 {
        self.timeout.as_millis() as u64
    }

    /// POST `body` as JSON to `host:port` at `path`.
    ///
    /// Returns the response status code when the coordinator sent a parseable
    /// status line. A connection closed without a response still counts as
    /// delivered.
    ///
    /// # Errors
    ///
    /// Returns an error if connecting, writing or reading fails or times out.
    pub async fn post_json(
        &self,
        host: &str,
        port: u16,
        path: &str,
        body: &[u8],
    ) -> Result<Option<u16>, ClientError> {
        debug!(host, port, path, len = body.len(), "Posting to coordinator");

        let mut stream =
            match tokio::time::timeout(self.timeout, TcpStream::connect((host, port))).await {
                Ok(Ok(stream)) => stream,
                Ok(Err(e)) => {
                    warn!(host, port, error = %e, "Coordinator connection failed");
                    return Err(e.into());
                }
                Err(_) => {
                    warn!(host, port, "Connection timeout after {}ms", self.timeout_ms());
                    return Err(ClientError::ConnectionTimeout(self.timeout_ms()));
                }
            };

        let request = build_request(host, path, body);
        match tokio::time::timeout(self.timeout, stream.write_all(&request)).await {
            Ok(Ok(())) => trace!(len = request.len(), "Request sent"),
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => return Err(ClientError::WriteTimeout(self.timeout_ms())),
        }

        let mut response = vec![0u8; RESPONSE_READ_LIMIT];
        let read = match tokio::time::timeout(self.timeout, stream.read(&mut response)).await {
            Ok(Ok(read)) => read,
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => return Err(ClientError::ReadTimeout(self.timeout_ms())),
        };

        let status = parse_status_line(&response[..read]);
        info!(host, port, path, ?status, "Coordinator report delivered");

        // Best effort: the peer may already have closed.
        let _ = stream.shutdown().await;
        Ok(status)
    }
}

impl ReportTransport for CoordinatorClient {
    fn send_report<'a>(
        &'a self,
        host: &'a str,
        port: u16,
        path: &'a str,
        entries: &'a [ReportEntry],
    ) -> BoxFuture<'a, Result<(), ClientError>> {
        Box::pin(async move {
            let body = serde_json::to_vec(entries)?;
            self.post_json(host, port, path, &body).await.map(|_| ())
        })
    }
}
