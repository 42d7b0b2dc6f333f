//! reqwest-backed HTTPS transport.
//!
//! Constructed once at startup, then cheaply cloned because `reqwest::Client`
//! is an `Arc` internally. The whole exchange (connect, send, read body) is
//! bounded by the configured call timeout.

use std::error::Error as _;
use std::io;
use std::time::Duration;

use reqwest::Client;
use reqwest::header::{ACCEPT, HeaderValue};
use tracing::{debug, trace, warn};

use super::{HttpRequest, Method, RawResponse, TransportFault};
use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, timeout })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn execute(&self, request: &HttpRequest) -> Result<RawResponse, TransportFault> {
        let builder = match &request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post(body) => self.client.post(&request.url).json(body),
        };
        // Accept-Encoding is left to reqwest so compressed bodies stay transparent.
        let builder = builder.header(ACCEPT, HeaderValue::from_static("application/json"));

        let response = builder.send().await.map_err(|e| {
            warn!(url = %request.url, error = %e, "transport request failed");
            fault_from(&e)
        })?;

        let status = response.status().as_u16();
        let bytes = response.bytes().await.map_err(|e| {
            warn!(url = %request.url, %status, error = %e, "failed to read response body");
            fault_from(&e)
        })?;

        debug!(url = %request.url, %status, body_len = bytes.len(), "transport exchange complete");
        let body = if bytes.is_empty() {
            None
        } else {
            Some(String::from_utf8_lossy(&bytes).into_owned())
        };
        if let Some(body) = body.as_deref() {
            trace!(%body, "raw response body");
        }
        Ok(RawResponse { status, body })
    }
}

/// Sort a reqwest error into the three fault categories.
fn fault_from(err: &reqwest::Error) -> TransportFault {
    let detail = error_chain(err);
    if err.is_timeout() {
        return TransportFault::TimedOut(detail);
    }
    if looks_like_dns_failure(&detail) {
        return TransportFault::HostUnresolved(detail);
    }
    if let Some(kind) = io_kind(err) {
        if matches!(
            kind,
            io::ErrorKind::TimedOut
                | io::ErrorKind::Interrupted
                | io::ErrorKind::ConnectionReset
                | io::ErrorKind::ConnectionAborted
                | io::ErrorKind::BrokenPipe
                | io::ErrorKind::UnexpectedEof
        ) {
            return TransportFault::TimedOut(detail);
        }
    }
    TransportFault::Io(detail)
}

fn error_chain(err: &reqwest::Error) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}

fn io_kind(err: &reqwest::Error) -> Option<io::ErrorKind> {
    let mut source = err.source();
    while let Some(cause) = source {
        if let Some(io_err) = cause.downcast_ref::<io::Error>() {
            return Some(io_err.kind());
        }
        source = cause.source();
    }
    None
}

fn looks_like_dns_failure(detail: &str) -> bool {
    let lower = detail.to_ascii_lowercase();
    lower.contains("dns error")
        || lower.contains("failed to lookup address")
        || lower.contains("name or service not known")
        || lower.contains("no such host")
}
