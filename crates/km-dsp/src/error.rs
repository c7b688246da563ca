//! Error types for the loudness engine

use thiserror::Error;

/// Loudness engine error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DspError {
    /// Invalid construction parameter or out-of-range channel
    #[error("Invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// Ring buffer write larger than its fixed capacity
    #[error("Ring buffer capacity exceeded: requested {requested}, capacity {capacity}")]
    CapacityExceeded {
        /// Number of samples the caller tried to write
        requested: usize,
        /// Fixed capacity of the ring buffer
        capacity: usize,
    },
}

/// Result type for loudness engine operations
pub type DspResult<T> = Result<T, DspError>;
