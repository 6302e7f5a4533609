//! RPC error types.
use std::net::SocketAddr;
use std::time::Duration;

/// Errors from RPC calls.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// Another call is already in flight on this connection.
    #[error("connection busy: another call is in flight")]
    ConnectionBusy,

    /// The server is still composing a reply to earlier work.
    #[error("response not ready")]
    ResponseNotReady,

    /// Nothing is listening at the address.
    #[error("connection refused by {0}")]
    ConnectionRefused(SocketAddr),

    /// The server raised a fault.
    #[error("fault {code}: {message}")]
    Fault {
        /// Fault code.
        code: i32,
        /// Diagnostic text from the server.
        message: String,
    },

    /// Transient errors persisted past the configured deadline.
    #[error("call did not complete within {0:?}")]
    DeadlineExceeded(Duration),

    /// Serialization or deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The peer sent something that is not a valid HTTP/JSON-RPC message.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The HTTP exchange failed after the connection was made.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RpcError {
    /// Errors caused by call serialization that clear on their own.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ConnectionBusy | Self::ResponseNotReady)
    }

    /// The backend is gone.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::ConnectionRefused(_))
    }

    /// The backend answered with a fault.
    pub fn is_fault(&self) -> bool {
        matches!(self, Self::Fault { .. })
    }

    /// Fault code, if this is a fault.
    pub fn fault_code(&self) -> Option<i32> {
        match self {
            Self::Fault { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for RpcError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
