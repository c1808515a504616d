//! Coordination primitives shared by the session workers

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, Instrument};

/// Single-slot, non-blocking notification.
///
/// `fire` never blocks and repeated fires coalesce into one pending event.
/// Exactly one consumer observes each pending event, through either
/// [`Signal::try_take`] or [`Signal::wait`].
#[derive(Debug, Default)]
pub struct Signal {
    pending: AtomicBool,
    notify: Notify,
}

impl Signal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fire(&self) {
        self.pending.store(true, Ordering::SeqCst);
        self.notify.notify_one();
    }

    /// Consume a pending event without waiting
    pub fn try_take(&self) -> bool {
        self.pending.swap(false, Ordering::SeqCst)
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::SeqCst)
    }

    /// Wait for an event and consume it. Cancel safe.
    pub async fn wait(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.try_take() {
                return;
            }
            notified.await;
        }
    }
}

/// Tracks the spawned session workers so a caller can await all of them.
///
/// Every worker counts as complete exactly once: when its task finishes,
/// whichever exit path it took.
#[derive(Debug, Default)]
pub struct WorkerGroup {
    handles: Mutex<Vec<(&'static str, JoinHandle<()>)>>,
}

impl WorkerGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn<F>(&self, name: &'static str, worker: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let span = crate::session_span!(worker = name);
        let handle = tokio::spawn(worker.instrument(span));
        self.lock().push((name, handle));
        debug!(worker = name, "Worker started");
    }

    /// Number of workers spawned and not yet awaited
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Wait for every worker spawned so far to finish
    pub async fn wait(&self) {
        let handles = std::mem::take(&mut *self.lock());
        for (name, handle) in handles {
            match handle.await {
                Ok(()) => debug!(worker = name, "Worker finished"),
                Err(e) if e.is_cancelled() => debug!(worker = name, "Worker cancelled"),
                Err(e) => error!(worker = name, error = %e, "Worker panicked"),
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(&'static str, JoinHandle<()>)>> {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
