use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Map as JsonMap;
use serde_json::Value;

use crate::error::ApqError;
use crate::services::layers::apq::persisted_query::decode_extensions;
use crate::services::layers::apq::persisted_query::kind_of;

/// A GraphQL `Request`, as sent by clients and forwarded upstream.
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct Request {
    /// The GraphQL operation (e.g., query, mutation) string.
    ///
    /// Persisted query clients leave it out once the server knows the
    /// operation's hash.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub query: Option<String>,

    /// The (optional) GraphQL operation name.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub operation_name: Option<String>,

    /// The (optional) GraphQL variables in the form of a JSON object.
    #[serde(
        skip_serializing_if = "Map::is_empty",
        default,
        deserialize_with = "deserialize_null_default"
    )]
    pub variables: Map<String, Value>,

    /// The (optional) GraphQL `extensions` of a GraphQL request.
    ///
    /// [Automated Persisted Queries][APQ] are specified by populating the
    /// `persistedQuery` key within the `extensions` object:
    ///
    /// ```json
    /// {
    ///   "extensions": {
    ///     "persistedQuery": {
    ///       "version": 1,
    ///       "sha256Hash": "sha256HashOfQuery"
    ///     }
    ///   }
    /// }
    /// ```
    ///
    /// [APQ]: https://www.apollographql.com/docs/apollo-server/performance/apq/
    #[serde(
        skip_serializing_if = "Map::is_empty",
        default,
        deserialize_with = "deserialize_null_default"
    )]
    pub extensions: Map<String, Value>,
}

// NOTE: this deserialize helper is used to transform `null` to Default::default()
fn deserialize_null_default<'de, D, T: Default + Deserialize<'de>>(
    deserializer: D,
) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
{
    <Option<T>>::deserialize(deserializer).map(|x| x.unwrap_or_default())
}

#[buildstructor::buildstructor]
impl Request {
    /// This is the constructor (or builder) to use when constructing a GraphQL
    /// `Request`.
    #[builder(visibility = "pub")]
    fn new(
        query: Option<String>,
        operation_name: Option<String>,
        // Spelled out so the builder treats them as maps
        variables: JsonMap<String, Value>,
        extensions: JsonMap<String, Value>,
    ) -> Self {
        Self {
            query,
            operation_name,
            variables,
            extensions,
        }
    }

    /// Convert encoded URL query string parameters (also known as "search
    /// params") into a GraphQL [`Request`].
    ///
    /// `variables` and `extensions` are JSON documents in their own right.
    /// A broken `extensions` document is reported as
    /// [`ApqError::MalformedExtensions`], anything else as
    /// [`ApqError::MalformedRequest`].
    pub fn from_urlencoded_query(url_encoded_query: &str) -> Result<Request, ApqError> {
        let params: Vec<(String, String)> =
            serde_urlencoded::from_str(url_encoded_query).map_err(|err| {
                ApqError::MalformedRequest {
                    reason: err.to_string(),
                }
            })?;
        let param = |name: &str| {
            params
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.as_str())
        };

        let variables = match param("variables") {
            Some(raw) => serde_json::from_str::<Option<Map<String, Value>>>(raw)
                .map_err(|err| ApqError::MalformedRequest {
                    reason: format!("invalid variables: {err}"),
                })?
                .unwrap_or_default(),
            None => Map::new(),
        };
        let extensions = match param("extensions") {
            Some(raw) => decode_extensions(raw)?,
            None => Map::new(),
        };

        Ok(Self::builder()
            .and_query(param("query"))
            .and_operation_name(param("operationName"))
            .variables(variables)
            .extensions(extensions)
            .build())
    }

    /// Deserialize a JSON request body.
    ///
    /// An `extensions` member that is neither an object nor `null` is
    /// reported as [`ApqError::MalformedExtensions`], like its GET
    /// counterpart.
    pub fn from_bytes(body: &[u8]) -> Result<Request, ApqError> {
        let malformed = |err: serde_json::Error| ApqError::MalformedRequest {
            reason: err.to_string(),
        };
        let body: Value = serde_json::from_slice(body).map_err(malformed)?;
        match body.get("extensions") {
            None | Some(Value::Null) | Some(Value::Object(_)) => {}
            Some(other) => {
                return Err(ApqError::MalformedExtensions {
                    reason: format!("extensions must be an object, found {}", kind_of(other)),
                })
            }
        }
        serde_json::from_value(body).map_err(malformed)
    }
}
