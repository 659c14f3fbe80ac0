//! Errors raised by the resampling engine.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResampleError {
    /// Caller error: bad geometry, mismatched channel counts, or a buffer
    /// that doesn't match its declared dimensions. Never retried.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    /// A worker failed mid-pass. Partial output is discarded.
    #[error("Resampling failed: {0}")]
    ResamplingFailed(String),
}
