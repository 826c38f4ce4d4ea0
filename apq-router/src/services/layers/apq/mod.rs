//!  (A)utomatic (P)ersisted (Q)ueries.
//!
//!  For more information on APQ see:
//!  <https://www.apollographql.com/docs/apollo-server/performance/apq/>

use sha2::Digest;
use sha2::Sha256;

use crate::cache::CacheError;
use crate::error::ApqError;

pub(crate) mod persisted_query;
pub(crate) mod registry;

pub use self::persisted_query::parse_extensions;
pub use self::persisted_query::PersistedQuery;
pub use self::persisted_query::PersistedQueryDescriptor;
pub use self::registry::PersistedQueryRegistry;
pub use self::registry::TYPE_IDENTIFIER;

/// Hex encoded SHA-256 of a query.
pub fn hash_query(query: &str) -> String {
    hex::encode(Sha256::digest(query.as_bytes()))
}

/// Whether `hash` is the SHA-256 of `query`, ignoring hex case.
pub fn query_matches_hash(query: &str, hash: &str) -> bool {
    hash_query(query).eq_ignore_ascii_case(hash)
}

/// What the resolver knows about a request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResolutionInput {
    /// The query text sent by the client.
    pub query: Option<String>,
    /// The `persistedQuery` descriptor sent along with the request.
    pub descriptor: Option<PersistedQueryDescriptor>,
    /// A hash sent through the bare hash protocol.
    pub hash_field: Option<String>,
}

#[buildstructor::buildstructor]
impl ResolutionInput {
    #[builder(visibility = "pub")]
    fn new(
        query: Option<String>,
        descriptor: Option<PersistedQueryDescriptor>,
        hash_field: Option<String>,
    ) -> Self {
        Self {
            // blank queries are treated as missing
            query: query.filter(|query| !query.trim().is_empty()),
            descriptor,
            hash_field,
        }
    }
}

/// The outcome of resolving a request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResolvedQuery {
    /// The query text to execute.
    Query(String),
    /// The request must be answered with this error, without execution.
    Rejected(ApqError),
}

/// Resolves the query a request wants executed, keeping the registry up to
/// date.
#[derive(Clone)]
pub struct ApqResolver {
    registry: PersistedQueryRegistry,
    auto_register: bool,
}

impl ApqResolver {
    /// A resolver registering every full query it sees.
    pub fn new(registry: PersistedQueryRegistry) -> Self {
        Self {
            registry,
            auto_register: true,
        }
    }

    /// Whether queries sent without a hash get registered under their hash.
    pub fn with_auto_register(mut self, auto_register: bool) -> Self {
        self.auto_register = auto_register;
        self
    }

    pub fn registry(&self) -> &PersistedQueryRegistry {
        &self.registry
    }

    /// Decide which query to run.
    ///
    /// The rules are evaluated in order, the first one matching wins:
    /// 1. a bare hash without query text is looked up, a miss is a server error,
    /// 2. a descriptor with query text must match the query, which is then
    ///    registered,
    /// 3. a descriptor without query text is looked up, a miss is a client
    ///    error,
    /// 4. query text alone is executed (and registered when auto registration
    ///    is on),
    /// 5. anything else is rejected.
    ///
    /// Only cache backend failures are returned as errors.
    pub async fn resolve(&self, input: ResolutionInput) -> Result<ResolvedQuery, CacheError> {
        let ResolutionInput {
            query,
            descriptor,
            hash_field,
        } = input;

        match (hash_field, descriptor, query) {
            (Some(hash), _, None) => Ok(self
                .lookup(&hash)
                .await?
                .map(ResolvedQuery::Query)
                .unwrap_or(ResolvedQuery::Rejected(
                    ApqError::PersistedQueryNotFoundBareHash,
                ))),
            (_, Some(descriptor), Some(query)) => {
                if query_matches_hash(&query, &descriptor.sha256hash) {
                    tracing::trace!("apq: cache insert");
                    self.registry
                        .register(&descriptor.sha256hash, &query)
                        .await?;
                    Ok(ResolvedQuery::Query(query))
                } else {
                    tracing::warn!("apq: graphql request doesn't match provided sha256Hash");
                    Ok(ResolvedQuery::Rejected(ApqError::HashMismatch))
                }
            }
            (_, Some(descriptor), None) => Ok(self
                .lookup(&descriptor.sha256hash)
                .await?
                .map(ResolvedQuery::Query)
                .unwrap_or(ResolvedQuery::Rejected(ApqError::PersistedQueryNotFound))),
            (_, None, Some(query)) => {
                if self.auto_register {
                    tracing::trace!("apq: cache insert");
                    self.registry.register(&hash_query(&query), &query).await?;
                }
                Ok(ResolvedQuery::Query(query))
            }
            (None, None, None) => Ok(ResolvedQuery::Rejected(ApqError::NoQueryProvided)),
        }
    }

    async fn lookup(&self, hash: &str) -> Result<Option<String>, CacheError> {
        let cached = self.registry.lookup(hash).await?;
        if cached.is_some() {
            tracing::trace!("apq: cache hit");
        } else {
            tracing::trace!("apq: cache miss");
        }
        Ok(cached)
    }
}
