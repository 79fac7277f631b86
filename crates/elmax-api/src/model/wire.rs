// Lenient deserializers for the Elmax JSON payloads.
//
// Panel firmware is loose about types: booleans arrive as 0/1, releases as
// numbers or strings, and newer firmware adds values and entries this client
// does not know. These helpers keep one odd field or entry from failing a
// whole snapshot.

use std::fmt;

use serde::de::{DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Raw wire form of an enumerated value: panels report either a numeric
/// code or a (localized) label.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireValue {
    Code(i64),
    Label(String),
}

impl WireValue {
    /// Normalize any JSON value. Numeric strings become codes.
    pub(crate) fn from_json(value: Value) -> Self {
        match value {
            Value::Number(n) => n.as_i64().map_or_else(|| Self::Label(n.to_string()), Self::Code),
            Value::String(s) => match s.trim().parse::<i64>() {
                Ok(code) => Self::Code(code),
                Err(_) => Self::Label(s),
            },
            other => Self::Label(other.to_string()),
        }
    }

    pub(crate) fn empty() -> Self {
        Self::Label(String::new())
    }
}

impl fmt::Display for WireValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Code(c) => write!(f, "{c}"),
            Self::Label(l) => write!(f, "{l:?}"),
        }
    }
}

/// Implement `Serialize`/`Deserialize` for an enum exposing
/// `from_wire(WireValue) -> Self` and `to_wire(&self) -> WireValue`.
macro_rules! wire_serde {
    ($ty:ty) => {
        impl serde::Serialize for $ty {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serde::Serialize::serialize(&self.to_wire(), serializer)
            }
        }

        impl<'de> serde::Deserialize<'de> for $ty {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = <serde_json::Value as serde::Deserialize>::deserialize(deserializer)?;
                Ok(Self::from_wire($crate::model::wire::WireValue::from_json(raw)))
            }
        }
    };
}

pub(crate) use wire_serde;

// ── Field helpers (use with `deserialize_with`) ──────────────────────

/// `true`/`false`, `0`/`1`, `"true"`/`"1"`; anything else is `false`.
pub(crate) fn boolean<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Bool(b) => b,
        Value::Number(n) => n
            .as_i64()
            .map_or_else(|| n.as_f64().is_some_and(|v| v.abs() > f64::EPSILON), |v| v != 0),
        Value::String(s) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "1" | "on"),
        _ => false,
    })
}

/// Optional text; numbers are rendered, `null` is `None`.
pub(crate) fn text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    })
}

/// Text that defaults to the empty string.
pub(crate) fn text_or_empty<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<String, D::Error> {
    text(deserializer).map(Option::unwrap_or_default)
}

/// Non-negative index; unparseable values become `0`.
pub(crate) fn index<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_u64().and_then(|v| u32::try_from(v).ok()).unwrap_or(0),
        Value::String(s) => s.trim().parse().unwrap_or(0),
        _ => 0,
    })
}

/// Percentage clamped to `0..=100`.
#[allow(clippy::cast_possible_truncation, clippy::as_conversions)]
pub(crate) fn percent<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u8, D::Error> {
    let raw = match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|v| v.round().clamp(0.0, 100.0) as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    Ok(raw.map_or(0, |v| u8::try_from(v.clamp(0, 100)).unwrap_or(100)))
}

/// A list where malformed entries are logged and skipped instead of
/// failing the enclosing object. A missing or non-array value is empty.
pub(crate) fn entries<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let items = match Value::deserialize(deserializer)? {
        Value::Array(items) => items,
        Value::Null => return Ok(Vec::new()),
        other => {
            tracing::warn!(
                kind = std::any::type_name::<T>(),
                value = %other,
                "expected a list, ignoring"
            );
            return Ok(Vec::new());
        }
    };

    Ok(items
        .into_iter()
        .enumerate()
        .filter_map(|(position, item)| match serde_json::from_value::<T>(item) {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!(
                    kind = std::any::type_name::<T>(),
                    position,
                    error = %e,
                    "skipping malformed entry"
                );
                None
            }
        })
        .collect())
}
