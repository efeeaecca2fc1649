//! Serde helpers for loosely typed upstream JSON.

use serde::Deserializer;
use serde::de::{self, Visitor};
use std::fmt;

/// Deserializes an identifier sent either as a string or as a number.
pub mod string_or_number {
    use super::{Deserializer, Visitor, de, fmt};

    /// Deserializes a `String` from a string or integer.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is neither a string nor a number.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct IdVisitor;

        impl Visitor<'_> for IdVisitor {
            type Value = String;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a string or integer identifier")
            }

            fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(value.to_string())
            }

            fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(value.to_string())
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(value.to_string())
            }

            fn visit_unit<E>(self) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(String::new())
            }
        }

        deserializer.deserialize_any(IdVisitor)
    }
}

/// Deserializes a count sent as a number or a numeric string.
///
/// Anything unparseable becomes 0.
pub mod lenient_u32 {
    use super::{Deserializer, Visitor, de, fmt};

    /// Deserializes a `u32` leniently.
    ///
    /// # Errors
    ///
    /// Returns an error only if the deserializer itself fails.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<u32, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct CountVisitor;

        impl Visitor<'_> for CountVisitor {
            type Value = u32;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a count")
            }

            fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(u32::try_from(value).unwrap_or(u32::MAX))
            }

            fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(u32::try_from(value).unwrap_or(0))
            }

            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            fn visit_f64<E>(self, value: f64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(if value.is_finite() && value > 0.0 {
                    value.min(f64::from(u32::MAX)) as u32
                } else {
                    0
                })
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(value.trim().parse().unwrap_or(0))
            }

            fn visit_unit<E>(self) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(0)
            }
        }

        deserializer.deserialize_any(CountVisitor)
    }
}
