//! Outbound transport abstraction.
//!
//! `Transport` is an enum over concrete backends, matching how the rest of the
//! crate avoids `dyn` trait objects and the `async-trait` dependency. Adding a
//! backend = new module + new variant + new `execute` arm.
//!
//! A transport only moves bytes: it returns the status and raw body, or a
//! [`TransportFault`]. Turning that into an outcome is the classifier's job.

pub mod http;
pub mod scripted;

use serde_json::Value;
use thiserror::Error;

/// Transport-level failures, before classification.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportFault {
    /// Timeout, stream reset or interrupted IO.
    #[error("timed out: {0}")]
    TimedOut(String),
    /// The host name could not be resolved.
    #[error("host unresolved: {0}")]
    HostUnresolved(String),
    /// Any other IO failure.
    #[error("io failure: {0}")]
    Io(String),
}

/// HTTP method plus body, if any.
#[derive(Debug, Clone, PartialEq)]
pub enum Method {
    Get,
    Post(Value),
}

/// One outbound call, fully built.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub url: String,
    pub method: Method,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self { url: url.into(), method: Method::Get }
    }

    pub fn post(url: impl Into<String>, body: Value) -> Self {
        Self { url: url.into(), method: Method::Post(body) }
    }

    /// The JSON body for POST requests.
    pub fn body(&self) -> Option<&Value> {
        match &self.method {
            Method::Post(body) => Some(body),
            Method::Get => None,
        }
    }
}

/// Status and body of a completed exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    /// `None` when the server sent no body at all.
    pub body: Option<String>,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self { status, body: Some(body.into()) }
    }

    pub fn empty(status: u16) -> Self {
        Self { status, body: None }
    }
}

/// All available transport backends.
#[derive(Debug, Clone)]
pub enum Transport {
    Http(http::HttpTransport),
    Scripted(scripted::ScriptedTransport),
}

impl Transport {
    /// Perform one exchange. Timeouts are enforced by the backend.
    pub async fn execute(&self, request: &HttpRequest) -> Result<RawResponse, TransportFault> {
        match self {
            Transport::Http(t) => t.execute(request).await,
            Transport::Scripted(t) => t.execute(request).await,
        }
    }
}
