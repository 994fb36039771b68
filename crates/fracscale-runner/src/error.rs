//! Scaler error types.

use thiserror::Error;

/// Result type alias for scaler operations.
pub type ScaleResult<T> = Result<T, ScaleError>;

#[derive(Debug, Error)]
pub enum ScaleError {
    /// The scaler could not be reached. Retried on the next tick.
    #[error("scaler unavailable: {0}")]
    Unavailable(String),

    /// The scaler refused or clamped the request.
    #[error("scaling to {requested} rejected: {reason}")]
    Rejected { requested: u32, reason: String },
}
