//! One attempt of one outbound call.
//!
//! # Exactly-once delivery
//!
//! A task can finish along two paths:
//!
//! - natural completion, on a pool worker, when the transport returns
//! - forced cancellation, by whoever displaced the task from its slot
//!
//! Both paths race for the same guard. The first one to move the state out of
//! `Created`/`Running` takes the callback and delivers; the other is a no-op.
//! A canceled task therefore never delivers `Ok`, even if the body had
//! already arrived.
//!
//! Cancellation flips the guard *before* signalling the transport handle, so
//! an IO error provoked by aborting the exchange is attributed to `Canceled`
//! rather than to a transport failure. The flip ([`RequestTask::claim_cancel`])
//! never waits on the pool; only the abort and the delivery may be deferred.
//!
//! The pending RTT sample is consumed when the exchange starts, not when the
//! task is created, so a task superseded before it runs leaves it in place.

use std::fmt;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::Instant;

use reqwest::Url;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use super::rtt::RttTracker;
use crate::classify::{Outcome, SearchError, classify};
use crate::payload::keys;
use crate::transport::{HttpRequest, Method, Transport};

/// Read calls are GETs, write calls are POSTs. RTT samples are kept per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    Read,
    Write,
}

impl CallKind {
    pub fn of(request: &HttpRequest) -> Self {
        match request.method {
            Method::Get => CallKind::Read,
            Method::Post(_) => CallKind::Write,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Created,
    Running,
    Completed,
    Canceled,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Canceled)
    }
}

/// Receives a task's outcome. Called at most once, from whichever thread wins.
pub type OutcomeCallback = Box<dyn FnOnce(Outcome) + Send + 'static>;

struct Guard {
    state: TaskState,
    callback: Option<OutcomeCallback>,
}

pub struct RequestTask {
    id: Uuid,
    kind: CallKind,
    request: HttpRequest,
    /// The request as sent, RTT echo included. Set when the exchange starts.
    sent: OnceLock<HttpRequest>,
    guard: Mutex<Guard>,
    token: CancellationToken,
    started_at: OnceLock<Instant>,
}

impl fmt::Debug for RequestTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestTask")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("url", &self.request.url)
            .field("state", &self.state())
            .finish()
    }
}

impl RequestTask {
    pub fn new(request: HttpRequest, callback: OutcomeCallback) -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4(),
            kind: CallKind::of(&request),
            request,
            sent: OnceLock::new(),
            guard: Mutex::new(Guard { state: TaskState::Created, callback: Some(callback) }),
            token: CancellationToken::new(),
            started_at: OnceLock::new(),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> CallKind {
        self.kind
    }

    /// The request as dispatched.
    pub fn request(&self) -> &HttpRequest {
        &self.request
    }

    /// The request as it went over the wire, once the exchange has started.
    pub fn sent(&self) -> Option<&HttpRequest> {
        self.sent.get()
    }

    pub fn state(&self) -> TaskState {
        self.lock().state
    }

    /// When the transport call started, once it has.
    pub fn started_at(&self) -> Option<Instant> {
        self.started_at.get().copied()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Guard> {
        self.guard.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// `Created → Running`. Returns `false` if the task was already past
    /// `Created`.
    pub(crate) fn mark_running(&self) -> bool {
        let mut guard = self.lock();
        if guard.state != TaskState::Created {
            return false;
        }
        guard.state = TaskState::Running;
        true
    }

    /// Claim the terminal state and the callback, or `None` if another path
    /// already finished the task.
    fn finish(&self, terminal: TaskState) -> Option<OutcomeCallback> {
        let mut guard = self.lock();
        if guard.state.is_terminal() {
            return None;
        }
        guard.state = terminal;
        guard.callback.take()
    }

    /// Natural completion path. Returns `true` if this call delivered.
    pub(crate) fn complete(&self, outcome: Outcome) -> bool {
        let Some(callback) = self.finish(TaskState::Completed) else {
            debug!(task_id = %self.id, "outcome dropped, task already finished");
            return false;
        };
        match &outcome {
            Ok(_) => debug!(task_id = %self.id, "task completed"),
            Err(e) => debug!(task_id = %self.id, kind = %e.kind, "task failed"),
        }
        callback(outcome);
        true
    }

    /// Forced cancellation path. Safe to call any number of times, from any
    /// thread; only the first call on a live task has an effect.
    pub fn cancel(&self) -> bool {
        match self.claim_cancel() {
            Some(callback) => {
                self.abort(callback);
                true
            }
            None => false,
        }
    }

    /// First half of a cancellation: force the state to `Canceled` and take
    /// the callback. From here on a natural completion is dropped. Hand the
    /// callback to [`RequestTask::abort`] to finish the job.
    pub(crate) fn claim_cancel(&self) -> Option<OutcomeCallback> {
        let callback = self.finish(TaskState::Canceled);
        if callback.is_none() {
            trace!(task_id = %self.id, "cancel ignored, task already finished");
        }
        callback
    }

    /// Second half: abort the in-flight exchange, then deliver `Canceled`.
    pub(crate) fn abort(&self, callback: OutcomeCallback) {
        self.token.cancel();
        debug!(task_id = %self.id, url = %self.request.url, "task canceled");
        callback(Err(SearchError::canceled()));
    }

    /// Run the transport call and deliver its classified outcome.
    pub(crate) async fn run(self: Arc<Self>, transport: Transport, rtt: Arc<RttTracker>) {
        if self.state().is_terminal() {
            trace!(task_id = %self.id, "task finished before it started");
            return;
        }

        let wire = match rtt.take(self.kind) {
            Some(millis) => attach_rtt(self.request.clone(), millis),
            None => self.request.clone(),
        };
        let wire = self.sent.get_or_init(|| wire);

        let started = Instant::now();
        let _ = self.started_at.set(started);
        if tracing::enabled!(tracing::Level::TRACE) {
            if let Some(body) = wire.body() {
                trace!(task_id = %self.id, payload = %body, "outgoing payload");
            }
        }

        let result = tokio::select! {
            biased;
            () = self.token.cancelled() => {
                trace!(task_id = %self.id, "exchange aborted");
                return;
            }
            result = transport.execute(wire) => result,
        };

        let elapsed = started.elapsed();
        match &result {
            Ok(response) => {
                rtt.record(self.kind, elapsed);
                debug!(
                    task_id = %self.id,
                    status = response.status,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "exchange finished"
                );
            }
            Err(fault) => warn!(task_id = %self.id, url = %self.request.url, %fault, "exchange failed"),
        }

        self.complete(classify(result));
    }
}

/// Echo the previous round-trip time: a query parameter on reads, a body
/// field on writes.
fn attach_rtt(mut request: HttpRequest, millis: u64) -> HttpRequest {
    match &mut request.method {
        Method::Get => match Url::parse(&request.url) {
            Ok(mut url) => {
                url.query_pairs_mut().append_pair(keys::LAST_RTT, &millis.to_string());
                request.url = url.into();
            }
            Err(e) => warn!(url = %request.url, error = %e, "cannot attach rtt to unparseable url"),
        },
        Method::Post(Value::Object(body)) => {
            body.insert(keys::LAST_RTT.to_string(), Value::from(millis));
        }
        Method::Post(_) => {}
    }
    request
}
