//! DAP error types.

use thiserror::Error;

/// Errors from talking to a debug adapter.
#[derive(Debug, Error)]
pub enum DapError {
    /// Adapter process failed to start.
    #[error("adapter failed to start: {0}")]
    AdapterSpawnFailed(#[from] std::io::Error),

    /// Transport-level communication error.
    #[error("transport error: {0}")]
    Transport(String),

    /// Request timed out waiting for a response.
    #[error("request timed out: {command}")]
    Timeout {
        /// The command that timed out.
        command: String,
    },

    /// Adapter answered a request with `success: false`.
    #[error("{command} failed: {message}")]
    Rejected {
        /// The command that failed.
        command: String,
        /// The adapter's diagnostic.
        message: String,
    },

    /// Adapter sent an invalid or unparseable message.
    #[error("adapter sent invalid response: {0}")]
    InvalidResponse(String),

    /// The adapter connection is gone.
    #[error("adapter connection closed")]
    Terminated,
}
