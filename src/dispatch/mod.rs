//! Per-channel request dispatcher.
//!
//! Each [`Channel`] owns one slot holding its most recent [`RequestTask`].
//! Dispatching on a channel installs the new task, submits it to the
//! [`ExecutionPool`] and cancels whatever occupied the slot before. The
//! swap happens under one lock per dispatcher, so two dispatches on the same
//! channel always agree on which task they displaced.
//!
//! The raw path ([`ChannelDispatcher::execute_raw`]) runs a task without a
//! slot; raw tasks never supersede anything and are never superseded.

pub mod pool;
pub mod rtt;
pub mod task;

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, trace};

use crate::classify::Outcome;
use crate::transport::{HttpRequest, Transport};

pub use pool::{ExecutionPool, PoolConfig};
pub use rtt::RttTracker;
pub use task::{CallKind, OutcomeCallback, RequestTask, TaskState};

/// Logical request kinds, each with an independent single-flight slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Search,
    AutoSuggest,
    QueryHint,
}

impl Channel {
    pub const ALL: [Channel; 3] = [Channel::Search, Channel::AutoSuggest, Channel::QueryHint];

    fn index(self) -> usize {
        match self {
            Channel::Search => 0,
            Channel::AutoSuggest => 1,
            Channel::QueryHint => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Channel::Search => "search",
            Channel::AutoSuggest => "autosuggest",
            Channel::QueryHint => "queryhint",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a displaced task is canceled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CancelPolicy {
    /// Cancel inline, before `dispatch` returns. Use from background threads.
    Synchronous,
    /// Mark the task canceled inline and hand the abort and the `Canceled`
    /// delivery to the pool. Never blocks the caller.
    #[default]
    Deferred,
}

type Slots = [Option<Arc<RequestTask>>; 3];

pub struct ChannelDispatcher {
    transport: Transport,
    pool: ExecutionPool,
    rtt: Arc<RttTracker>,
    slots: Mutex<Slots>,
}

impl fmt::Debug for ChannelDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelDispatcher")
            .field("pool", &self.pool)
            .field("transport", &self.transport)
            .finish_non_exhaustive()
    }
}

impl ChannelDispatcher {
    /// A dispatcher sharing the process-wide RTT tracker.
    pub fn new(transport: Transport, pool: ExecutionPool) -> Self {
        Self {
            transport,
            pool,
            rtt: RttTracker::global(),
            slots: Mutex::new([None, None, None]),
        }
    }

    /// Use a private RTT tracker instead of the process-wide one.
    pub fn with_rtt(mut self, rtt: Arc<RttTracker>) -> Self {
        self.rtt = rtt;
        self
    }

    pub fn pool(&self) -> &ExecutionPool {
        &self.pool
    }

    pub fn rtt(&self) -> &Arc<RttTracker> {
        &self.rtt
    }

    /// Run `request` on `channel`, superseding the channel's current task.
    ///
    /// Never fails; every failure, including being superseded, reaches
    /// `callback` as an [`Outcome`], exactly once.
    pub fn dispatch<F>(&self, channel: Channel, request: HttpRequest, policy: CancelPolicy, callback: F)
    where
        F: FnOnce(Outcome) + Send + 'static,
    {
        let task = RequestTask::new(request, Box::new(callback));
        debug!(%channel, task_id = %task.id(), url = %task.request().url, "dispatch");

        let previous = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            task.mark_running();
            slots[channel.index()].replace(Arc::clone(&task))
        };

        self.pool
            .spawn(Arc::clone(&task).run(self.transport.clone(), Arc::clone(&self.rtt)));

        let Some(previous) = previous else { return };
        // The state flip is inline under both policies; only the abort and
        // the delivery of `Canceled` may be deferred.
        let Some(callback) = previous.claim_cancel() else { return };
        trace!(%channel, task_id = %previous.id(), superseded_by = %task.id(), ?policy, "superseding");
        match policy {
            CancelPolicy::Synchronous => previous.abort(callback),
            CancelPolicy::Deferred => self.pool.execute_now(move || previous.abort(callback)),
        }
    }

    /// Run `request` outside every slot.
    pub fn execute_raw<F>(&self, request: HttpRequest, callback: F) -> Arc<RequestTask>
    where
        F: FnOnce(Outcome) + Send + 'static,
    {
        let task = RequestTask::new(request, Box::new(callback));
        debug!(task_id = %task.id(), url = %task.request().url, "dispatch raw");
        task.mark_running();
        self.pool
            .spawn(Arc::clone(&task).run(self.transport.clone(), Arc::clone(&self.rtt)));
        task
    }

    /// The channel's current task, if it has not finished yet.
    pub fn active(&self, channel: Channel) -> Option<Arc<RequestTask>> {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots[channel.index()]
            .as_ref()
            .filter(|task| !task.state().is_terminal())
            .cloned()
    }

    /// Cancel the channel's current task, if any. Returns `true` if a live
    /// task was canceled by this call.
    pub fn cancel(&self, channel: Channel) -> bool {
        let occupant = {
            let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            slots[channel.index()].clone()
        };
        occupant.is_some_and(|task| task.cancel())
    }
}
