use async_trait::async_trait;
use displaydoc::Display;
use thiserror::Error;

pub(crate) mod redis;
pub(crate) mod storage;

pub use self::storage::CacheStorage;

/// Cache backend failures.
#[derive(Error, Display, Debug)]
#[non_exhaustive]
pub enum CacheError {
    /// redis error: {0}
    Redis(#[from] ::redis::RedisError),

    /// cache backend unavailable: {0}
    Unavailable(String),
}

/// A string key-value store used to keep persisted queries.
///
/// Implementations must offer read-after-write consistency within a process:
/// a value inserted by a task is visible to a `get` issued by the same task
/// right after. Keys are independent, no operation spans several keys.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CacheBackend: Send + Sync + 'static {
    /// Fetch the value stored under `key`.
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Store `value` under `key`, replacing any previous value.
    async fn insert(&self, key: String, value: String) -> Result<(), CacheError>;

    /// Drop the value stored under `key`, if any.
    async fn remove(&self, key: &str) -> Result<(), CacheError>;

    /// Drop every value whose key starts with `prefix`.
    async fn clear(&self, prefix: &str) -> Result<(), CacheError>;
}
