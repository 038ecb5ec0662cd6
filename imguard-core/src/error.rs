//! Error types for the pipeline. Per-file failures end up as outcomes; these
//! only escape from setup and from the transformer's internal steps.

use std::path::PathBuf;

use thiserror::Error;

/// Everything the pipeline itself can fail with.
#[derive(Error, Debug)]
pub enum GuardError {
    /// A filesystem call failed after any retries.
    #[error("failed to {op} {path}: {source}")]
    Io {
        /// Short verb naming the call, e.g. `rename`.
        op: &'static str,
        /// Path the call was made on.
        path: PathBuf,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// The encoder rejected or failed on the input.
    #[error("encoder error: {0}")]
    Encode(#[from] EncodeError),

    /// The limiter refused or lost a task.
    #[error("limiter error: {0}")]
    Limiter(#[from] LimiterError),

    /// Settings failed validation.
    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    /// The encode step ran past the configured limit.
    #[error("encode of {path} timed out after {secs}s")]
    Timeout {
        /// File being encoded.
        path: PathBuf,
        /// The limit that was exceeded.
        secs: u64,
    },

    /// A background task died without producing a result.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl GuardError {
    /// Shorthand for [`GuardError::Io`].
    pub fn io(
        op: &'static str,
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        Self::Io {
            op,
            path: path.into(),
            source,
        }
    }
}

/// Failure reported by an [`Encoder`](crate::encoder::Encoder).
///
/// The split matters to the transformer: `Decode` means the input bytes are
/// malformed and the file is skipped as corrupt, `Unsupported` means the
/// format is recognised but cannot be round-tripped safely, and `Other` is a
/// genuine failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// The input bytes could not be decoded.
    #[error("malformed input: {0}")]
    Decode(String),

    /// Decodable, but re-encoding would drop content.
    #[error("unsupported input: {0}")]
    Unsupported(String),

    /// Any other encoder failure.
    #[error("{0}")]
    Other(String),
}

/// Errors surfaced by [`Limiter`](crate::limiter::Limiter).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LimiterError {
    /// A limiter was asked for with capacity 0.
    #[error("limiter capacity must be at least 1")]
    ZeroCapacity,

    /// The task was submitted after shutdown, or its worker went away.
    #[error("limiter is shut down")]
    Closed,

    /// The task panicked; the payload message is kept.
    #[error("task panicked: {0}")]
    TaskPanicked(String),
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, GuardError>;
