/*!
 * Serde utilities for durations.
 *
 * Policies and task snapshots expose their durations as whole milliseconds so that
 * diagnostic dumps stay readable and configuration can be written as plain numbers.
 */

use serde::{Deserialize, Deserializer, Serializer};
use std::time::Duration;

/// Parse a millisecond count that may be represented as a number or a string.
///
/// ```json
/// { "timeout": 30000 }      // integer
/// { "timeout": "30000" }    // string that parses to integer
/// { "timeout": 1500.9 }     // float (truncated to 1500)
/// ```
fn millis_from_value<E: serde::de::Error>(value: serde_json::Value) -> Result<u64, E> {
    match value {
        serde_json::Value::Number(n) => {
            if let Some(ms) = n.as_u64() {
                Ok(ms)
            } else if let Some(f) = n.as_f64().filter(|f| *f >= 0.0) {
                Ok(f as u64)
            } else {
                Err(E::custom(format!("Invalid millisecond value: {n}")))
            }
        }
        serde_json::Value::String(s) => s
            .trim()
            .parse::<u64>()
            .map_err(|_| E::custom(format!("Cannot parse '{s}' as milliseconds"))),
        other => Err(E::custom(format!(
            "Expected millisecond value, found: {other}"
        ))),
    }
}

/// `#[serde(with = "crate::utils::serde::duration_ms")]`
pub mod duration_ms {
    use super::*;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis().min(u64::MAX as u128) as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        millis_from_value(value).map(Duration::from_millis)
    }
}

/// `#[serde(default, with = "crate::utils::serde::option_duration_ms")]`
pub mod option_duration_ms {
    use super::*;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&(d.as_millis().min(u64::MAX as u128) as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<serde_json::Value>::deserialize(deserializer)? {
            None | Some(serde_json::Value::Null) => Ok(None),
            Some(value) => millis_from_value(value).map(|ms| Some(Duration::from_millis(ms))),
        }
    }
}
