//! Decoding of the `persistedQuery` request extension.
//!
//! Two shapes are accepted:
//!
//! ```json
//! { "persistedQuery": { "version": 1, "sha256Hash": "<hash>" } }
//! { "persistedQuery": "<hash>" }
//! ```
//!
//! Anything else under `persistedQuery` is rejected rather than ignored.

use serde::Deserialize;
use serde::Deserializer;
use serde_json::Map;
use serde_json::Value;

use crate::error::ApqError;

pub(crate) const PERSISTED_QUERY_KEY: &str = "persistedQuery";

/// The descriptor a client sends to reference a query by hash.
#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct PersistedQueryDescriptor {
    /// Protocol version, `1` for every known client.
    ///
    /// Informational only: a value that is not a small number, or a string
    /// holding one, reads as `None` instead of failing the descriptor.
    #[serde(default, deserialize_with = "deserialize_version")]
    pub version: Option<u8>,
    /// Hex encoded SHA-256 of the query text.
    #[serde(rename = "sha256Hash")]
    pub sha256hash: String,
}

impl PersistedQueryDescriptor {
    pub fn new(sha256hash: impl Into<String>) -> Self {
        Self {
            version: Some(1),
            sha256hash: sha256hash.into(),
        }
    }
}

fn deserialize_version<'de, D>(deserializer: D) -> Result<Option<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(number) => number.as_u64().and_then(|v| u8::try_from(v).ok()),
        Value::String(raw) => raw.trim().parse().ok(),
        _ => None,
    })
}

/// A decoded `persistedQuery` extension.
#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(untagged)]
pub enum PersistedQuery {
    /// `{"sha256Hash": "..."}`
    Descriptor(PersistedQueryDescriptor),
    /// A bare hash string.
    BareHash(String),
}

impl PersistedQuery {
    /// The hash carried by the extension, whatever its shape.
    pub fn hash(&self) -> &str {
        match self {
            PersistedQuery::Descriptor(descriptor) => &descriptor.sha256hash,
            PersistedQuery::BareHash(hash) => hash,
        }
    }

    /// Extract the persisted query from a request's extensions object.
    ///
    /// Returns `Ok(None)` when there is no `persistedQuery` key.
    pub fn from_extensions(extensions: &Map<String, Value>) -> Result<Option<Self>, ApqError> {
        match extensions.get(PERSISTED_QUERY_KEY) {
            None => Ok(None),
            Some(value) => PersistedQuery::deserialize(value).map(Some).map_err(|_| {
                ApqError::MalformedExtensions {
                    reason: format!(
                        "{PERSISTED_QUERY_KEY} must be an object with a sha256Hash string or a hash string, found {}",
                        kind_of(value)
                    ),
                }
            }),
        }
    }
}

/// Parse a serialized extensions payload, as sent in a GET query string.
///
/// Returns `Ok(None)` when there is no payload or it has no
/// `persistedQuery` key.
pub fn parse_extensions(raw: Option<&str>) -> Result<Option<PersistedQuery>, ApqError> {
    match raw {
        None => Ok(None),
        Some(raw) => PersistedQuery::from_extensions(&decode_extensions(raw)?),
    }
}

/// Decode a serialized extensions payload into a JSON object.
pub(crate) fn decode_extensions(raw: &str) -> Result<Map<String, Value>, ApqError> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(extensions)) => Ok(extensions),
        Ok(other) => Err(ApqError::MalformedExtensions {
            reason: format!("extensions must be an object, found {}", kind_of(&other)),
        }),
        Err(err) => Err(ApqError::MalformedExtensions {
            reason: err.to_string(),
        }),
    }
}

pub(crate) fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
