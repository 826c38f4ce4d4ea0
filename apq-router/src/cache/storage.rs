use std::num::NonZeroUsize;
use std::sync::Arc;

use async_trait::async_trait;
use lru::LruCache;
use tokio::sync::Mutex;

use super::redis::RedisCacheStorage;
use super::CacheBackend;
use super::CacheError;

/// Multi level cache storage: a bounded in memory LRU, optionally backed by
/// redis.
///
/// Reads go to memory first and fall back to redis, promoting hits into
/// memory. Writes and removals go through both levels, so a value written by
/// a request is visible to the next read of that request even without redis.
#[derive(Clone)]
pub struct CacheStorage {
    inner: Arc<Mutex<LruCache<String, String>>>,
    redis: Option<RedisCacheStorage>,
}

impl CacheStorage {
    /// In memory only storage holding at most `max_capacity` entries.
    pub fn new(max_capacity: NonZeroUsize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(LruCache::new(max_capacity))),
            redis: None,
        }
    }

    pub(crate) fn with_redis(max_capacity: NonZeroUsize, redis: RedisCacheStorage) -> Self {
        Self {
            redis: Some(redis),
            ..Self::new(max_capacity)
        }
    }

    #[cfg(test)]
    pub(crate) async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }
}

#[async_trait]
impl CacheBackend for CacheStorage {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        if let Some(value) = self.inner.lock().await.get(key) {
            return Ok(Some(value.clone()));
        }

        match &self.redis {
            Some(redis) => {
                let value = redis.get(key).await?;
                if let Some(value) = &value {
                    tracing::trace!("promoting redis entry {key} to memory");
                    self.inner.lock().await.put(key.to_string(), value.clone());
                }
                Ok(value)
            }
            None => Ok(None),
        }
    }

    async fn insert(&self, key: String, value: String) -> Result<(), CacheError> {
        if let Some(redis) = &self.redis {
            redis.insert(&key, &value).await?;
        }
        self.inner.lock().await.put(key, value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), CacheError> {
        if let Some(redis) = &self.redis {
            redis.remove(key).await?;
        }
        self.inner.lock().await.pop(key);
        Ok(())
    }

    async fn clear(&self, prefix: &str) -> Result<(), CacheError> {
        if let Some(redis) = &self.redis {
            redis.clear(prefix).await?;
        }
        let mut inner = self.inner.lock().await;
        let keys: Vec<String> = inner
            .iter()
            .map(|(key, _)| key)
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect();
        for key in keys {
            inner.pop(&key);
        }
        Ok(())
    }
}
