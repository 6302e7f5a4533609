use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while loading, parsing or validating
/// configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to create the default config file.
    #[error("failed to create default config at {path}: {reason}")]
    CreateDefault {
        /// Where the file should have been written.
        path: PathBuf,
        /// Underlying failure.
        reason: String,
    },

    /// TOML parsing failed.
    #[error("TOML parse error: {0}")]
    Parse(String),

    /// A config value failed validation.
    #[error("validation error: {field}: {message}")]
    Validation {
        /// The dotted field path (e.g. `poll.interval_ms`).
        field: String,
        /// Human-readable description of the violation.
        message: String,
    },

    /// One or more settings failed validation.
    #[error("invalid configuration: {}", summarize(.0))]
    Invalid(Vec<ConfigError>),

    /// `[debug] executable` is required to launch a session.
    #[error("no executable configured; set `executable` under [debug]")]
    MissingExecutable,

    /// An I/O error occurred while reading or writing config files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn summarize(errors: &[ConfigError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
