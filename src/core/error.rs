//! Engine error types

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur in the hook engine
///
/// Every variant maps to one outcome a caller can observe on its handle.
/// Nothing here crashes the process; an `Internal` error additionally
/// triggers an emergency reset of the scheduler.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Malformed request, fails fast and is never retried
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Admission rejected because it would close a wait-for cycle
    #[error("Deadlock avoided: admission would create a circular wait on [{resources}]")]
    DeadlockAvoided {
        /// Resource keys involved in the would-be cycle
        resources: String,
    },

    /// Resource contested; the request stays queued until its budget elapses
    #[error("Lock unavailable: {0}")]
    LockUnavailable(String),

    /// Execution exceeded its timeout budget
    #[error("Timed out after {budget:?}")]
    TimedOut {
        /// The budget that was exceeded
        budget: Duration,
    },

    /// Payload reported failure
    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    /// Submission rejected because the engine is draining or stopped
    #[error("Shutdown in progress")]
    ShutdownInProgress,

    /// Request was cancelled before or during execution
    #[error("Cancelled")]
    Cancelled,

    /// Engine command channel closed unexpectedly
    #[error("Engine channel closed")]
    ChannelClosed,

    /// Internal invariant violation; triggers an emergency reset
    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Create an invalid-request error from a message
    pub fn invalid(msg: impl Into<String>) -> Self {
        EngineError::InvalidRequest(msg.into())
    }

    /// Create a deadlock-avoided error from the contested resource keys
    pub fn deadlock(resources: &[String]) -> Self {
        EngineError::DeadlockAvoided {
            resources: resources.join(", "),
        }
    }

    /// Create an internal invariant-violation error
    pub fn internal(msg: impl Into<String>) -> Self {
        EngineError::Internal(msg.into())
    }
}

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
