//! Last-observed round-trip times, one slot per call kind.
//!
//! A sample is recorded when a transport exchange completes and is consumed
//! (taken and cleared) by the next call of the same kind, which echoes it to
//! the server as `lr_rtt`. Races between concurrent calls may drop or reuse a
//! stale sample; that is acceptable, a sample is never invented.

use std::sync::{Arc, OnceLock};
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use super::task::CallKind;

const EMPTY: i64 = -1;

#[derive(Debug)]
pub struct RttTracker {
    read: AtomicI64,
    write: AtomicI64,
}

impl Default for RttTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl RttTracker {
    pub const fn new() -> Self {
        Self { read: AtomicI64::new(EMPTY), write: AtomicI64::new(EMPTY) }
    }

    /// The process-wide tracker shared by dispatchers that were not given
    /// their own.
    pub fn global() -> Arc<RttTracker> {
        static GLOBAL: OnceLock<Arc<RttTracker>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(RttTracker::new())))
    }

    fn slot(&self, kind: CallKind) -> &AtomicI64 {
        match kind {
            CallKind::Read => &self.read,
            CallKind::Write => &self.write,
        }
    }

    pub fn record(&self, kind: CallKind, elapsed: Duration) {
        let millis = i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX);
        self.slot(kind).store(millis, Ordering::Relaxed);
    }

    /// Take the pending sample for `kind`, leaving the slot empty.
    pub fn take(&self, kind: CallKind) -> Option<u64> {
        let value = self.slot(kind).swap(EMPTY, Ordering::Relaxed);
        u64::try_from(value).ok()
    }

    pub fn peek(&self, kind: CallKind) -> Option<u64> {
        u64::try_from(self.slot(kind).load(Ordering::Relaxed)).ok()
    }
}
