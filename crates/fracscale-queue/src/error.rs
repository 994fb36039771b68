//! Queue engine error types.

use thiserror::Error;

/// Result type alias for queue engine and parameter store operations.
pub type QueueResult<T> = Result<T, QueueError>;

/// Errors surfaced by the queue engine or parameter store.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The engine could not be reached; retry on the next tick.
    #[error("queue engine unavailable: {0}")]
    Unavailable(String),

    /// An item was offered while no queue was routable.
    #[error("no routable queue registered")]
    NoQueues,
}

impl QueueError {
    /// Whether retrying later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::NoQueues)
    }
}
