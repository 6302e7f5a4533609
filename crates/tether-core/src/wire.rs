//! Decimal-string encoding for 64-bit integers.
//!
//! JSON numbers are IEEE doubles for most consumers, so anything above
//! 2^53 loses precision in transit. Addresses, offsets and thread ids are
//! therefore carried as decimal strings and decoded back on receipt.

use crate::error::CoreError;

/// Encode a value as its decimal string.
pub fn encode_u64(value: u64) -> String {
    value.to_string()
}

/// Decode a decimal string produced by [`encode_u64`].
pub fn decode_u64(text: &str) -> Result<u64, CoreError> {
    text.trim()
        .parse::<u64>()
        .map_err(|e| CoreError::InvalidInteger {
            value: text.to_string(),
            message: e.to_string(),
        })
}

/// `#[serde(with = "tether_core::wire::decimal_u64")]` adapter.
///
/// Serializes as a string. Deserialization accepts a string or, for
/// leniency towards hand-written fixtures, a non-negative JSON integer.
pub mod decimal_u64 {
    use std::fmt;

    use serde::de::{self, Visitor};
    use serde::{Deserializer, Serializer};

    /// Serialize `value` as a decimal string.
    pub fn serialize<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::encode_u64(*value))
    }

    /// Deserialize a decimal string (or small integer) into a `u64`.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        deserializer.deserialize_any(DecimalVisitor)
    }

    struct DecimalVisitor;

    impl<'de> Visitor<'de> for DecimalVisitor {
        type Value = u64;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a decimal string holding an unsigned 64-bit integer")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<u64, E> {
            super::decode_u64(v).map_err(E::custom)
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<u64, E> {
            Ok(v)
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<u64, E> {
            u64::try_from(v).map_err(|_| E::custom(format!("negative value {v}")))
        }
    }
}
