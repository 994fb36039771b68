//! The queue engine contract.

use std::time::Duration;

use async_trait::async_trait;

use fracscale_core::{CompletionRecord, QueueStatus, WorkItem, WorkerId};

use crate::error::QueueResult;

/// Operations the orchestrator, workers, and load generator consume from
/// the queue engine.
///
/// Every blocking operation takes a bounded wait; nothing here may block
/// indefinitely.
#[async_trait]
pub trait QueueEngine: Send + Sync {
    /// Create (or reactivate) a routable queue for `id`.
    async fn register(&self, id: &str) -> QueueResult<()>;

    /// Stop routing new items to `id`. Items already queued stay
    /// claimable by the owner and are reassigned if its heartbeat lapses.
    async fn deregister(&self, id: &str) -> QueueResult<()>;

    /// Admit one unit of work system-wide. Returns the queue it was
    /// routed to.
    async fn enqueue(&self, payload: &str, sent_at: f64, seq: u64) -> QueueResult<WorkerId>;

    /// Pop from `id`, waiting at most `timeout`. `None` on timeout or
    /// when the queue is unknown.
    async fn pop(&self, id: &str, timeout: Duration) -> QueueResult<Option<WorkItem>>;

    /// Pop from `id` without waiting.
    async fn try_pop(&self, id: &str) -> QueueResult<Option<WorkItem>>;

    /// Record a finished unit on the completion feed.
    async fn complete(&self, record: CompletionRecord) -> QueueResult<()>;

    /// Refresh the health timestamp for `id`.
    ///
    /// Returns `false` when the engine no longer treats `id` as a live
    /// queue (never registered, or abandoned after a lapse); the caller
    /// must re-register before trusting its queue again.
    async fn heartbeat(&self, id: &str) -> QueueResult<bool>;

    /// Per-queue depths plus raw arrival timestamps since the last call.
    async fn status(&self) -> QueueResult<QueueStatus>;

    /// Take every completion record recorded since the last call.
    async fn drain_completions(&self) -> QueueResult<Vec<CompletionRecord>>;
}
