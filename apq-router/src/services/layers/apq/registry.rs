use std::sync::Arc;

use crate::cache::CacheBackend;
use crate::cache::CacheError;

/// Cache region of the persisted query registry.
///
/// Every key written by the registry starts with this prefix, keeping it
/// apart from unrelated data living in a shared backend.
pub const TYPE_IDENTIFIER: &str = "apq";

/// Hash to query text registry.
///
/// Cheap to clone, clones share the same backend.
#[derive(Clone)]
pub struct PersistedQueryRegistry {
    storage: Arc<dyn CacheBackend>,
}

impl PersistedQueryRegistry {
    pub fn new(storage: Arc<dyn CacheBackend>) -> Self {
        Self { storage }
    }

    /// The backend key for `hash`.
    ///
    /// Hex digits are case insensitive, both spellings of a hash share an entry.
    pub fn cache_key(hash: &str) -> String {
        format!("{TYPE_IDENTIFIER}_{}", hash.to_ascii_lowercase())
    }

    /// The query previously registered under `hash`, if it is still cached.
    pub async fn lookup(&self, hash: &str) -> Result<Option<String>, CacheError> {
        self.storage.get(&Self::cache_key(hash)).await
    }

    /// Register `query` under `hash`, replacing what was there.
    pub async fn register(&self, hash: &str, query: &str) -> Result<(), CacheError> {
        self.storage
            .insert(Self::cache_key(hash), query.to_string())
            .await
    }

    /// Forget the query registered under `hash`.
    pub async fn invalidate(&self, hash: &str) -> Result<(), CacheError> {
        self.storage.remove(&Self::cache_key(hash)).await
    }

    /// Forget every registered query.
    ///
    /// Only keys of the registry's region are dropped, other data sharing the
    /// backend is left alone.
    pub async fn clear(&self) -> Result<(), CacheError> {
        self.storage.clear(&format!("{TYPE_IDENTIFIER}_")).await
    }
}
