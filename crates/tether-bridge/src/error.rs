//! Bridge error types.

use std::path::PathBuf;

use tether_config::ConfigError;
use tether_core::{SessionKey, Status};
use tether_platform::PlatformError;
use tether_rpc::RpcError;
use thiserror::Error;

/// Errors from the editor side of a debug session.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// A backend call failed.
    #[error("backend call failed: {0}")]
    Rpc(#[from] RpcError),

    /// No session is registered under the key.
    #[error("no debug session for {0}")]
    NoSession(SessionKey),

    /// The debuggee ended before reaching its first stop.
    #[error("debuggee never reached its initial stop (status: {0})")]
    NoInitialStop(Status),

    /// The breakpoint file could not be read or written.
    #[error("breakpoint store {path}: {message}")]
    Store {
        /// File the store was using.
        path: PathBuf,
        /// What went wrong.
        message: String,
    },

    /// Launch settings are missing or invalid.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The backend process could not be started.
    #[error("could not start backend: {0}")]
    Platform(#[from] PlatformError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// The backend process is gone.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::Rpc(e) if e.is_unreachable())
    }
}
