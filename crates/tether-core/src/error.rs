//! Errors raised while decoding tether wire values.

use thiserror::Error;

/// Errors from parsing status strings and wire-encoded integers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// A status string did not match any known execution state.
    #[error("unknown status: {0:?}")]
    UnknownStatus(String),

    /// A stop reason inside a `stopped,...` status was not recognised.
    #[error("unknown stop reason: {0:?}")]
    UnknownStopReason(String),

    /// A decimal-string encoded integer could not be decoded.
    #[error("invalid decimal integer {value:?}: {message}")]
    InvalidInteger {
        /// The offending text.
        value: String,
        /// Parser diagnostic.
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_status_display() {
        let err = CoreError::UnknownStatus("warp".into());
        assert_eq!(err.to_string(), "unknown status: \"warp\"");
    }

    #[test]
    fn unknown_stop_reason_display() {
        let err = CoreError::UnknownStopReason("gremlins".into());
        assert_eq!(err.to_string(), "unknown stop reason: \"gremlins\"");
    }

    #[test]
    fn invalid_integer_display() {
        let err = CoreError::InvalidInteger {
            value: "0x10".into(),
            message: "invalid digit found in string".into(),
        };
        assert!(err.to_string().contains("\"0x10\""));
        assert!(err.to_string().contains("invalid digit"));
    }
}
