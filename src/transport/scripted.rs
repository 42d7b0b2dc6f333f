//! Scripted transport: answers from canned replies keyed by URL.
//!
//! Used by tests and the CLI's offline mode to exercise the full dispatch
//! path without a network. Each route holds a queue of replies; the last
//! reply of a route repeats once the queue is drained. Every request is
//! recorded so callers can inspect what would have gone over the wire.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tracing::debug;

use super::{HttpRequest, RawResponse, TransportFault};

/// One canned answer, optionally delayed.
#[derive(Debug, Clone)]
pub struct ScriptedReply {
    pub delay: Duration,
    pub result: Result<RawResponse, TransportFault>,
}

impl ScriptedReply {
    pub fn json(status: u16, body: impl Into<String>) -> Self {
        Self { delay: Duration::ZERO, result: Ok(RawResponse::new(status, body)) }
    }

    pub fn empty(status: u16) -> Self {
        Self { delay: Duration::ZERO, result: Ok(RawResponse::empty(status)) }
    }

    pub fn fault(fault: TransportFault) -> Self {
        Self { delay: Duration::ZERO, result: Err(fault) }
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[derive(Debug, Default)]
struct Script {
    routes: HashMap<String, VecDeque<ScriptedReply>>,
    seen: Vec<HttpRequest>,
}

#[derive(Debug, Clone, Default)]
pub struct ScriptedTransport {
    inner: Arc<Mutex<Script>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `reply` for `url`. The query string is ignored when matching.
    pub fn route(self, url: &str, reply: ScriptedReply) -> Self {
        self.push(url, reply);
        self
    }

    pub fn push(&self, url: &str, reply: ScriptedReply) {
        let mut script = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        script.routes.entry(strip_query(url).to_string()).or_default().push_back(reply);
    }

    /// Every request executed so far, oldest first.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).seen.clone()
    }

    /// Requests whose URL (query ignored) matches `url`.
    pub fn requests_to(&self, url: &str) -> Vec<HttpRequest> {
        let key = strip_query(url);
        self.requests().into_iter().filter(|r| strip_query(&r.url) == key).collect()
    }

    pub async fn execute(&self, request: &HttpRequest) -> Result<RawResponse, TransportFault> {
        let reply = {
            let mut script = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            script.seen.push(request.clone());
            let key = strip_query(&request.url);
            match script.routes.get_mut(key) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            }
        };

        let Some(reply) = reply else {
            debug!(url = %request.url, "no scripted route");
            return Err(TransportFault::Io(format!("no scripted route for {}", request.url)));
        };

        if !reply.delay.is_zero() {
            tokio::time::sleep(reply.delay).await;
        }
        reply.result
    }
}

fn strip_query(url: &str) -> &str {
    url.split_once('?').map_or(url, |(base, _)| base)
}
