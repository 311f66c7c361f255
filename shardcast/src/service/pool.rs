use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Runs partition units on tokio's blocking thread pool.
///
/// The pool grows on demand and reuses idle threads, so every submitted unit
/// starts right away.
#[derive(Debug, Default)]
pub struct WorkerPool {
    handle: Option<Handle>,
    submitted: AtomicUsize,
}

impl WorkerPool {
    /// Creates a pool submitting to the runtime of the calling task.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a pool submitting to the runtime behind `handle`.
    pub fn with_handle(handle: Handle) -> Self {
        WorkerPool {
            handle: Some(handle),
            submitted: AtomicUsize::new(0),
        }
    }

    /// Number of units submitted so far.
    pub fn submitted(&self) -> usize {
        self.submitted.load(Ordering::Relaxed)
    }

    pub(crate) fn submit<F, R>(&self, unit: F) -> JoinHandle<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        self.submitted.fetch_add(1, Ordering::Relaxed);
        match &self.handle {
            Some(handle) => handle.spawn_blocking(unit),
            None => tokio::task::spawn_blocking(unit),
        }
    }
}
