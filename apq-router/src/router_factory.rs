use std::sync::Arc;

use tower::BoxError;

use crate::cache::redis::RedisCacheStorage;
use crate::cache::CacheStorage;
use crate::configuration::Configuration;
use crate::services::executor::HttpQueryExecutor;
use crate::services::executor::QueryExecutor;
use crate::services::layers::apq::ApqResolver;
use crate::services::layers::apq::PersistedQueryRegistry;
use crate::services::router::RouterService;

/// Create the [`RouterService`] described by `configuration`.
///
/// Connects to redis when a redis cache is configured, so this fails if
/// redis cannot be reached.
pub async fn create_router_service(
    configuration: &Configuration,
) -> Result<RouterService, BoxError> {
    let cache = &configuration.apq.cache;
    let storage = match &cache.redis {
        Some(redis) => {
            tracing::debug!(url = %redis.url, "using redis for persisted queries");
            CacheStorage::with_redis(
                cache.in_memory.limit,
                RedisCacheStorage::new(&redis.url, redis.ttl).await?,
            )
        }
        None => CacheStorage::new(cache.in_memory.limit),
    };

    let registry = PersistedQueryRegistry::new(Arc::new(storage));
    let resolver = ApqResolver::new(registry).with_auto_register(configuration.apq.auto_register);
    let executor = HttpQueryExecutor::new(
        configuration.upstream.url.clone(),
        configuration.upstream.timeout,
    )?;

    if !configuration.apq.enabled {
        tracing::info!("automatic persisted queries are disabled");
    }

    Ok(RouterService::builder()
        .resolver(resolver)
        .executor(Arc::new(executor) as Arc<dyn QueryExecutor>)
        .apq_enabled(configuration.apq.enabled)
        .build())
}
