//! Logic for loading configuration in to an object model
use std::net::SocketAddr;
use std::num::NonZeroUsize;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use displaydoc::Display;
use schemars::gen::SchemaSettings;
use schemars::schema::RootSchema;
use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use url::Url;


/// Configuration error.
#[derive(Debug, Error, Display)]
#[non_exhaustive]
pub enum ConfigurationError {
    /// could not read configuration file {path}: {error}
    ReadFile {
        path: String,
        error: std::io::Error,
    },
    /// could not deserialize configuration: {0}
    DeserializeConfigError(serde_yaml::Error),
    /// {message}: {error}
    InvalidConfiguration {
        message: &'static str,
        error: String,
    },
}

/// The configuration for the router.
///
/// Can be created through `serde::Deserialize` from various formats,
/// or inline in Rust code with `serde_json::json!` and `serde_json::from_value`.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Configuration {
    /// Configuration options pertaining to the http server component.
    #[serde(default)]
    pub server: Server,

    /// The GraphQL server resolved queries are forwarded to.
    #[serde(default)]
    pub upstream: Upstream,

    /// Automatic persisted queries.
    #[serde(default)]
    pub apq: Apq,
}

#[buildstructor::buildstructor]
impl Configuration {
    #[builder(visibility = "pub")]
    fn new(server: Option<Server>, upstream: Option<Upstream>, apq: Option<Apq>) -> Self {
        Self {
            server: server.unwrap_or_default(),
            upstream: upstream.unwrap_or_default(),
            apq: apq.unwrap_or_default(),
        }
    }

    /// Load and validate the configuration file at `path`.
    pub fn from_file(path: &Path) -> Result<Self, ConfigurationError> {
        let raw_yaml =
            std::fs::read_to_string(path).map_err(|error| ConfigurationError::ReadFile {
                path: path.display().to_string(),
                error,
            })?;
        raw_yaml.parse()
    }

    fn validate(self) -> Result<Self, ConfigurationError> {
        for (name, path) in [
            ("server.path", &self.server.path),
            ("server.health_check_path", &self.server.health_check_path),
        ] {
            if !path.starts_with('/') {
                return Err(ConfigurationError::InvalidConfiguration {
                    message: "paths must start with a slash",
                    error: format!("{name} is '{path}'"),
                });
            }
            if !is_literal_route(path) {
                return Err(ConfigurationError::InvalidConfiguration {
                    message: "paths must not contain captures or wildcards",
                    error: format!("{name} is '{path}'"),
                });
            }
        }
        if self.server.path == self.server.health_check_path {
            return Err(ConfigurationError::InvalidConfiguration {
                message: "the GraphQL and health check paths must differ",
                error: format!("both are '{}'", self.server.path),
            });
        }
        Ok(self)
    }
}

// The http server treats `{...}`, `:name` and `*name` as route parameters.
fn is_literal_route(path: &str) -> bool {
    !path.contains(['{', '}'])
        && path
            .split('/')
            .all(|segment| !segment.starts_with([':', '*']))
}

impl FromStr for Configuration {
    type Err = ConfigurationError;

    fn from_str(raw_yaml: &str) -> Result<Self, Self::Err> {
        if raw_yaml.trim().is_empty() {
            return Ok(Configuration::default());
        }
        serde_yaml::from_str::<Configuration>(raw_yaml)
            .map_err(ConfigurationError::DeserializeConfigError)?
            .validate()
    }
}

/// Generate a JSON schema for the configuration.
pub(crate) fn generate_config_schema() -> RootSchema {
    let settings = SchemaSettings::draft07().with(|s| {
        s.option_nullable = true;
        s.option_add_null_type = false;
        s.inline_subschemas = true;
    });

    settings
        .into_generator()
        .into_root_schema_for::<Configuration>()
}

/// HTTP server options.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Server {
    /// The socket address and port to listen on
    /// Defaults to 127.0.0.1:4000
    #[serde(default = "default_listen")]
    #[schemars(with = "String")]
    pub listen: SocketAddr,

    /// The HTTP path on which GraphQL requests will be served.
    /// default: "/graphql"
    #[serde(default = "default_graphql_path")]
    pub path: String,

    /// healthCheck path
    /// default: "/health"
    #[serde(default = "default_health_check_path")]
    pub health_check_path: String,
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 4000))
}

fn default_graphql_path() -> String {
    String::from("/graphql")
}

fn default_health_check_path() -> String {
    String::from("/health")
}

impl Default for Server {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            path: default_graphql_path(),
            health_check_path: default_health_check_path(),
        }
    }
}

/// Upstream GraphQL server.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Upstream {
    /// URL requests are POSTed to.
    /// default: "http://127.0.0.1:4001/graphql"
    #[serde(default = "default_upstream_url")]
    pub url: Url,

    /// Time allowed for the upstream server to answer.
    /// default: 30s
    #[serde(with = "humantime_serde", default = "default_upstream_timeout")]
    #[schemars(with = "String")]
    pub timeout: Duration,
}

fn default_upstream_url() -> Url {
    Url::parse("http://127.0.0.1:4001/graphql").expect("default upstream url is valid; qed")
}

fn default_upstream_timeout() -> Duration {
    Duration::from_secs(30)
}

impl Default for Upstream {
    fn default() -> Self {
        Self {
            url: default_upstream_url(),
            timeout: default_upstream_timeout(),
        }
    }
}

/// Automatic persisted queries options.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Apq {
    /// Activates the persisted query protocol.
    /// default: true
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Register queries sent without a hash, so that later requests can
    /// refer to them by hash.
    /// default: true
    #[serde(default = "default_true")]
    pub auto_register: bool,

    /// Where registered queries are kept.
    #[serde(default)]
    pub cache: Cache,
}

fn default_true() -> bool {
    true
}

impl Default for Apq {
    fn default() -> Self {
        Self {
            enabled: true,
            auto_register: true,
            cache: Cache::default(),
        }
    }
}

/// Persisted query cache.
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Cache {
    /// Per instance in memory cache.
    #[serde(default)]
    pub in_memory: InMemoryCache,

    /// Redis cache shared between instances, consulted on in memory misses.
    #[serde(default)]
    pub redis: Option<RedisCache>,
}

/// In memory cache options.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct InMemoryCache {
    /// Number of entries kept, least recently used ones are evicted first.
    /// default: 512
    #[serde(default = "default_cache_limit")]
    #[schemars(with = "usize")]
    pub limit: NonZeroUsize,
}

fn default_cache_limit() -> NonZeroUsize {
    NonZeroUsize::new(512).expect("512 is not zero; qed")
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self {
            limit: default_cache_limit(),
        }
    }
}

/// Redis cache options.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RedisCache {
    /// Redis URL, for example `redis://127.0.0.1:6379`.
    pub url: Url,

    /// Expiration of entries. Entries never expire when unset.
    #[serde(with = "humantime_serde", default)]
    #[schemars(with = "Option<String>")]
    pub ttl: Option<Duration>,
}
