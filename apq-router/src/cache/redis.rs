use std::time::Duration;

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use url::Url;

use super::CacheError;

/// Second level storage shared between router instances.
#[derive(Clone)]
pub(crate) struct RedisCacheStorage {
    inner: ConnectionManager,
    ttl: Option<Duration>,
}

impl RedisCacheStorage {
    pub(crate) async fn new(url: &Url, ttl: Option<Duration>) -> Result<Self, CacheError> {
        let client = redis::Client::open(url.as_str())?;
        let inner = client.get_connection_manager().await?;

        tracing::trace!("redis connection established");
        Ok(Self { inner, ttl })
    }

    pub(crate) async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        tracing::trace!("getting from redis: {key}");
        let mut conn = self.inner.clone();
        Ok(conn.get::<_, Option<String>>(key).await?)
    }

    pub(crate) async fn insert(&self, key: &str, value: &str) -> Result<(), CacheError> {
        tracing::trace!("inserting into redis: {key}");
        let mut conn = self.inner.clone();
        match ttl_seconds(self.ttl) {
            Some(seconds) => conn.set_ex::<_, _, ()>(key, value, seconds).await?,
            None => conn.set::<_, _, ()>(key, value).await?,
        }
        Ok(())
    }

    pub(crate) async fn remove(&self, key: &str) -> Result<(), CacheError> {
        tracing::trace!("removing from redis: {key}");
        let mut conn = self.inner.clone();
        conn.del::<_, ()>(key).await?;
        Ok(())
    }

    pub(crate) async fn clear(&self, prefix: &str) -> Result<(), CacheError> {
        let pattern = format!("{}*", escape_pattern(prefix));
        tracing::trace!("clearing redis keys matching {pattern}");
        let mut conn = self.inner.clone();
        let mut cursor: u64 = 0;
        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_COUNT)
                .query_async(&mut conn)
                .await?;
            if !keys.is_empty() {
                conn.del::<_, ()>(keys).await?;
            }
            if next == 0 {
                return Ok(());
            }
            cursor = next;
        }
    }
}

const SCAN_COUNT: usize = 100;

// SCAN patterns are globs, the prefix must match literally
fn escape_pattern(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len());
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

// redis rejects an expiry of zero seconds, round sub second ttls up
fn ttl_seconds(ttl: Option<Duration>) -> Option<u64> {
    ttl.map(|ttl| {
        let seconds = ttl.as_secs();
        if ttl.subsec_nanos() > 0 || seconds == 0 {
            seconds + 1
        } else {
            seconds
        }
    })
}
