//! Execution pool: runs every network attempt and every deferred
//! cancellation.
//!
//! The pool owns (or borrows) a Tokio runtime and gates every job behind a
//! semaphore with `size` permits: at most `size` jobs run at once and the rest
//! wait in FIFO order. The wait queue is unbounded; in practice it stays short
//! because superseded attempts are canceled and free their permit quickly.
//!
//! [`ExecutionPool::execute_now`] bypasses the permits for short jobs such as
//! cancellations.
//!
//! A dedicated runtime is built with `size` worker threads and a short
//! `thread_keep_alive`, so helper threads are reclaimed soon after the pool
//! goes idle.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::runtime::{Builder, Handle, Runtime};
use tokio::sync::Semaphore;
use tracing::debug;

use crate::error::AppError;

pub const DEFAULT_POOL_SIZE: usize = 6;
pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub size: usize,
    pub keep_alive: Duration,
    pub thread_name: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            size: DEFAULT_POOL_SIZE,
            keep_alive: DEFAULT_KEEP_ALIVE,
            thread_name: "search-worker".to_string(),
        }
    }
}

struct PoolInner {
    /// `Some` when the pool built its own runtime.
    runtime: Option<Runtime>,
    handle: Handle,
    permits: Arc<Semaphore>,
    size: usize,
    queued: Arc<AtomicUsize>,
}

impl Drop for PoolInner {
    fn drop(&mut self) {
        // Never blocks, so the last handle may be dropped from async code.
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

/// Cheaply cloneable handle to a bounded job pool.
#[derive(Clone)]
pub struct ExecutionPool {
    inner: Arc<PoolInner>,
}

impl std::fmt::Debug for ExecutionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionPool")
            .field("size", &self.inner.size)
            .field("owns_runtime", &self.inner.runtime.is_some())
            .field("queued", &self.queued())
            .finish()
    }
}

impl ExecutionPool {
    /// Build a pool with its own multi-thread runtime.
    pub fn new(config: &PoolConfig) -> Result<Self, AppError> {
        if config.size == 0 {
            return Err(AppError::Pool("pool size must be at least 1".into()));
        }
        let counter = Arc::new(AtomicUsize::new(1));
        let name = config.thread_name.clone();
        let runtime = Builder::new_multi_thread()
            .worker_threads(config.size)
            .max_blocking_threads(config.size)
            .thread_keep_alive(config.keep_alive)
            .thread_name_fn(move || {
                let n = counter.fetch_add(1, Ordering::Relaxed);
                format!("{name} #{n}")
            })
            .enable_all()
            .build()
            .map_err(|e| AppError::Pool(format!("failed to build runtime: {e}")))?;
        let handle = runtime.handle().clone();
        debug!(size = config.size, keep_alive = ?config.keep_alive, "execution pool started");
        Ok(Self::assemble(Some(runtime), handle, config.size))
    }

    /// Run jobs on an existing runtime, still bounded to `size` at a time.
    pub fn with_handle(handle: Handle, size: usize) -> Result<Self, AppError> {
        if size == 0 {
            return Err(AppError::Pool("pool size must be at least 1".into()));
        }
        Ok(Self::assemble(None, handle, size))
    }

    fn assemble(runtime: Option<Runtime>, handle: Handle, size: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                runtime,
                handle,
                permits: Arc::new(Semaphore::new(size)),
                size,
                queued: Arc::new(AtomicUsize::new(0)),
            }),
        }
    }

    pub fn size(&self) -> usize {
        self.inner.size
    }

    /// Jobs submitted but not yet holding a permit.
    pub fn queued(&self) -> usize {
        self.inner.queued.load(Ordering::Relaxed)
    }

    /// Jobs currently running.
    pub fn active(&self) -> usize {
        self.inner.size - self.inner.permits.available_permits()
    }

    /// Submit an async job. Returns immediately.
    pub fn spawn<F>(&self, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let permits = Arc::clone(&self.inner.permits);
        let queued = Arc::clone(&self.inner.queued);
        queued.fetch_add(1, Ordering::Relaxed);
        self.inner.handle.spawn(async move {
            let permit = permits.acquire_owned().await;
            queued.fetch_sub(1, Ordering::Relaxed);
            // The semaphore is never closed, so a permit always arrives.
            let Ok(_permit) = permit else { return };
            job.await;
        });
    }

    /// Submit a fire-and-forget synchronous job.
    pub fn execute<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.spawn(async move { job() });
    }

    /// Run a short job on the pool's runtime without waiting for a permit.
    /// Cancellations go here so they never queue behind the attempts they
    /// are meant to abort.
    pub fn execute_now<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.inner.handle.spawn(async move { job() });
    }
}
