use thiserror::Error;

/// Errors that can occur during platform operations.
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("path error: {0}")]
    Path(String),

    #[error("process spawn failed: {0}")]
    ProcessSpawn(#[from] std::io::Error),
}
