//! Worker error types.

use thiserror::Error;

use fracscale_core::WorkerState;
use fracscale_queue::QueueError;

/// Result type alias for worker lifecycle operations.
pub type LifecycleResult<T> = Result<T, LifecycleError>;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("illegal transition {from} → {to}")]
    InvalidTransition { from: WorkerState, to: WorkerState },

    #[error("queue engine: {0}")]
    Queue(#[from] QueueError),
}
