//! Single-consumer serializer enforcing at-most-one-in-flight request
//! execution for a [`crate::session::ResidentSession`].
//!
//! `tokio::sync::Mutex` grants waiters in arrival order, which is exactly the
//! FIFO-plus-mutual-exclusion guarantee this needs; building a bespoke
//! channel-and-worker-task pair on top would only reintroduce the
//! process-ownership cycle the design notes warn against (the worker would
//! have to borrow back into the session that owns the queue).

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::Mutex;

/// Serializes access to a resident session's child process.
///
/// Each call to [`RequestQueue::run`] waits for its turn, then executes
/// exclusively: no other call's body runs concurrently with it, and calls
/// are admitted in the order they arrived.
pub struct RequestQueue {
    gate: Mutex<()>,
    next_sequence: AtomicU64,
}

impl Default for RequestQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self { gate: Mutex::new(()), next_sequence: AtomicU64::new(0) }
    }

    /// Run `body` with exclusive access, once all requests submitted earlier
    /// have completed. `body` receives this request's monotonically
    /// increasing sequence number, for tracing.
    pub async fn run<F, Fut, T>(&self, body: F) -> T
    where
        F: FnOnce(u64) -> Fut,
        Fut: Future<Output = T>,
    {
        let _permit = self.gate.lock().await;
        let sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(sequence, "request dequeued");
        let result = body(sequence).await;
        tracing::debug!(sequence, "request completed");
        result
    }
}
