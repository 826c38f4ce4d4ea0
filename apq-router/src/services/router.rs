//! Entry point of a GraphQL HTTP request.
//!
//! The [`RouterService`] turns a transport request into resolution input,
//! asks the [`ApqResolver`] which query to run and either hands it to the
//! [`QueryExecutor`] or answers with the rejection.

use std::sync::Arc;
use std::task::Poll;

use bytes::Bytes;
use futures::future::BoxFuture;
use http::header::CONTENT_TYPE;
use http::HeaderValue;
use http::Method;
use http::StatusCode;
use tower::BoxError;
use tower::Service;

use crate::error::ApqError;
use crate::error::DispatchError;
use crate::graphql;
use crate::services::executor::QueryExecutor;
use crate::services::layers::apq::persisted_query::PERSISTED_QUERY_KEY;
use crate::services::layers::apq::ApqResolver;
use crate::services::layers::apq::PersistedQuery;
use crate::services::layers::apq::PersistedQueryDescriptor;
use crate::services::layers::apq::ResolutionInput;
use crate::services::layers::apq::ResolvedQuery;

/// Dispatches GraphQL HTTP requests.
///
/// Cheap to clone, clones share the resolver and the executor.
#[derive(Clone)]
pub struct RouterService {
    inner: Arc<Inner>,
}

struct Inner {
    resolver: ApqResolver,
    executor: Arc<dyn QueryExecutor>,
    apq_enabled: bool,
}

#[buildstructor::buildstructor]
impl RouterService {
    #[builder(visibility = "pub")]
    fn new(
        resolver: ApqResolver,
        executor: Arc<dyn QueryExecutor>,
        apq_enabled: Option<bool>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                resolver,
                executor,
                apq_enabled: apq_enabled.unwrap_or(true),
            }),
        }
    }

    pub fn resolver(&self) -> &ApqResolver {
        &self.inner.resolver
    }

    /// Handle one request.
    ///
    /// Protocol errors are answered with their status code and message,
    /// only storage and execution failures are returned as errors.
    pub async fn dispatch(
        &self,
        request: http::Request<Bytes>,
    ) -> Result<http::Response<String>, DispatchError> {
        let transport = match *request.method() {
            Method::GET => Transport::Get,
            Method::POST => Transport::Post,
            ref method => {
                return Ok(text_response(
                    StatusCode::METHOD_NOT_ALLOWED,
                    format!("unsupported method {method}, use GET or POST"),
                ))
            }
        };
        let mut graphql_request = match parse_request(&request, transport) {
            Ok(parsed) => parsed,
            Err(err) => return Ok(rejection(err)),
        };

        let input = match self.resolution_input(&mut graphql_request, transport) {
            Ok(input) => input,
            Err(err) => return Ok(rejection(err)),
        };

        match self.inner.resolver.resolve(input).await? {
            ResolvedQuery::Query(query) => {
                graphql_request.query = Some(query);
                self.inner
                    .executor
                    .execute(graphql_request)
                    .await
                    .map_err(DispatchError::Execution)
            }
            ResolvedQuery::Rejected(err) => Ok(rejection(err)),
        }
    }

    // Strips the persisted query extension from the request, it is
    // meaningless to the executor. Its shape is only checked when APQ is on;
    // an `extensions` document that is not an object has already been
    // rejected for both transports.
    fn resolution_input(
        &self,
        request: &mut graphql::Request,
        transport: Transport,
    ) -> Result<ResolutionInput, ApqError> {
        let persisted_query = PersistedQuery::from_extensions(&request.extensions);
        request.extensions.remove(PERSISTED_QUERY_KEY);

        if !self.inner.apq_enabled {
            return Ok(ResolutionInput::builder()
                .and_query(request.query.clone())
                .build());
        }

        let (descriptor, hash_field) = match persisted_query? {
            None => (None, None),
            Some(PersistedQuery::Descriptor(descriptor)) => {
                let hash_field = match transport {
                    Transport::Post => Some(descriptor.sha256hash.clone()),
                    Transport::Get => None,
                };
                (Some(descriptor), hash_field)
            }
            Some(PersistedQuery::BareHash(hash)) => {
                (Some(PersistedQueryDescriptor::new(hash.clone())), Some(hash))
            }
        };

        Ok(ResolutionInput::builder()
            .and_query(request.query.clone())
            .and_descriptor(descriptor)
            .and_hash_field(hash_field)
            .build())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Transport {
    Get,
    Post,
}

fn parse_request(
    request: &http::Request<Bytes>,
    transport: Transport,
) -> Result<graphql::Request, ApqError> {
    match transport {
        Transport::Get => {
            graphql::Request::from_urlencoded_query(request.uri().query().unwrap_or_default())
        }
        Transport::Post => graphql::Request::from_bytes(request.body()),
    }
}

fn rejection(err: ApqError) -> http::Response<String> {
    tracing::debug!(code = err.extension_code(), "rejecting request: {err}");
    text_response(err.status_code(), err.to_string())
}

fn text_response(status: StatusCode, body: String) -> http::Response<String> {
    let mut response = http::Response::new(body);
    *response.status_mut() = status;
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static(mime::TEXT_PLAIN_UTF_8.as_ref()),
    );
    response
}

impl Service<http::Request<Bytes>> for RouterService {
    type Response = http::Response<String>;
    type Error = BoxError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut std::task::Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: http::Request<Bytes>) -> Self::Future {
        let service = self.clone();
        Box::pin(async move { service.dispatch(request).await.map_err(Into::into) })
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;

    use serde_json::json;
    use tower::ServiceExt;

    use super::*;
    use crate::cache::CacheError;
    use crate::cache::CacheStorage;
    use crate::cache::MockCacheBackend;
    use crate::services::executor::MockQueryExecutor;
    use crate::services::layers::apq::hash_query;
    use crate::services::layers::apq::PersistedQueryRegistry;

    const QUERY: &str = "{__typename}";

    fn registry() -> PersistedQueryRegistry {
        PersistedQueryRegistry::new(Arc::new(CacheStorage::new(NonZeroUsize::new(16).unwrap())))
    }

    fn service(registry: PersistedQueryRegistry, executor: MockQueryExecutor) -> RouterService {
        RouterService::builder()
            .resolver(ApqResolver::new(registry))
            .executor(Arc::new(executor) as Arc<dyn QueryExecutor>)
            .build()
    }

    fn ok_executor(times: usize) -> MockQueryExecutor {
        let mut executor = MockQueryExecutor::new();
        executor.expect_execute().times(times).returning(|request| {
            assert_eq!(request.query.as_deref(), Some(QUERY));
            assert!(!request.extensions.contains_key(PERSISTED_QUERY_KEY));
            Ok(http::Response::new(
                json!({"data": {"__typename": "Query"}}).to_string(),
            ))
        });
        executor
    }

    fn get(query_string: &str) -> http::Request<Bytes> {
        http::Request::get(format!("/graphql?{query_string}"))
            .body(Bytes::new())
            .unwrap()
    }

    fn post(body: serde_json::Value) -> http::Request<Bytes> {
        http::Request::post("/graphql")
            .header(CONTENT_TYPE, "application/json")
            .body(Bytes::from(body.to_string()))
            .unwrap()
    }

    fn extensions_param(extensions: serde_json::Value) -> String {
        serde_urlencoded::to_string([("extensions", extensions.to_string())]).unwrap()
    }

    #[tokio::test]
    async fn get_persisted_query_miss_is_a_bad_request() {
        let service = service(registry(), MockQueryExecutor::new());
        let request = get(&extensions_param(
            json!({"persistedQuery": {"version": 1, "sha256Hash": "def"}}),
        ));

        let response = service.dispatch(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.body(), "persisted query not found");
    }

    #[tokio::test]
    async fn post_persisted_query_miss_is_a_server_error() {
        let service = service(registry(), MockQueryExecutor::new());
        for persisted in [json!({"sha256Hash": "abc"}), json!("abc")] {
            let request = post(json!({"extensions": {"persistedQuery": persisted}}));
            let response = service.dispatch(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        }
    }

    #[tokio::test]
    async fn get_bare_hash_miss_is_a_server_error() {
        let service = service(registry(), MockQueryExecutor::new());
        let request = get(&extensions_param(json!({"persistedQuery": "abc"})));
        let response = service.dispatch(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn mismatch_never_reaches_the_executor() {
        let service = service(registry(), MockQueryExecutor::new());
        let query_string = format!(
            "query=%7B__typename%7D&{}",
            extensions_param(json!({"persistedQuery": {"sha256Hash": "foobar"}}))
        );

        let response = service.dispatch(get(&query_string)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.body(), "provided sha does not match query");
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "text/plain; charset=utf-8"
        );
    }

    #[tokio::test]
    async fn persisted_query_is_resolved_before_execution() {
        let registry = registry();
        registry.register(&hash_query(QUERY), QUERY).await.unwrap();
        let service = service(registry, ok_executor(2));

        let extensions = json!({"persistedQuery": {"version": 1, "sha256Hash": hash_query(QUERY)}});
        let response = service
            .dispatch(get(&extensions_param(extensions.clone())))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = service
            .dispatch(post(json!({ "extensions": extensions })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn plain_post_query_is_registered() {
        let registry = registry();
        let service = service(registry.clone(), ok_executor(1));

        let response = service
            .dispatch(post(json!({ "query": QUERY })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            registry.lookup(&hash_query(QUERY)).await.unwrap().as_deref(),
            Some(QUERY)
        );
    }

    #[tokio::test]
    async fn other_extensions_are_forwarded() {
        let mut executor = MockQueryExecutor::new();
        executor.expect_execute().times(1).returning(|request| {
            assert_eq!(request.extensions.get("tracing"), Some(&json!(true)));
            assert!(!request.extensions.contains_key(PERSISTED_QUERY_KEY));
            assert_eq!(request.operation_name.as_deref(), Some("Typename"));
            Ok(http::Response::new(String::new()))
        });
        let service = service(registry(), executor);

        let response = service
            .dispatch(post(json!({
                "query": QUERY,
                "operationName": "Typename",
                "extensions": {
                    "tracing": true,
                    "persistedQuery": {"version": 1, "sha256Hash": hash_query(QUERY)}
                }
            })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn malformed_extensions_are_client_errors() {
        let service = service(registry(), MockQueryExecutor::new());

        let response = service
            .dispatch(get("query=%7B__typename%7D&extensions=%7Bnope"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(response.body().starts_with("malformed extensions"));

        let response = service
            .dispatch(post(json!({"query": QUERY, "extensions": {"persistedQuery": 1}})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(response.body().starts_with("malformed extensions"));

        let by_post = service
            .dispatch(post(json!({"query": QUERY, "extensions": "abc"})))
            .await
            .unwrap();
        let by_get = service
            .dispatch(get(&format!(
                "query=%7B__typename%7D&{}",
                extensions_param(json!("abc"))
            )))
            .await
            .unwrap();
        assert_eq!(by_post.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            by_post.body(),
            "malformed extensions: extensions must be an object, found a string"
        );
        assert_eq!(by_get.status(), by_post.status());
        assert_eq!(by_get.body(), by_post.body());
    }

    #[tokio::test]
    async fn missing_query_is_a_bad_request() {
        let service = service(registry(), MockQueryExecutor::new());
        let response = service.dispatch(get("")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.body(), "no query provided");
    }

    #[tokio::test]
    async fn unsupported_methods_are_refused() {
        let service = service(registry(), MockQueryExecutor::new());
        let request = http::Request::delete("/graphql").body(Bytes::new()).unwrap();
        let response = service.dispatch(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn disabled_apq_ignores_the_extension() {
        let registry = registry();
        let service = RouterService::builder()
            .resolver(ApqResolver::new(registry.clone()).with_auto_register(false))
            .executor(Arc::new(ok_executor(1)) as Arc<dyn QueryExecutor>)
            .apq_enabled(false)
            .build();

        // a mismatching hash is not looked at
        let response = service
            .dispatch(post(json!({
                "query": QUERY,
                "extensions": {"persistedQuery": {"sha256Hash": "foobar"}}
            })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = service
            .dispatch(post(json!({
                "extensions": {"persistedQuery": {"sha256Hash": hash_query(QUERY)}}
            })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.body(), "no query provided");
    }

    #[tokio::test]
    async fn disabled_apq_treats_get_and_post_alike() {
        let service = RouterService::builder()
            .resolver(ApqResolver::new(registry()))
            .executor(Arc::new(ok_executor(2)) as Arc<dyn QueryExecutor>)
            .apq_enabled(false)
            .build();

        // a broken persistedQuery member is ignored
        let by_get = service
            .dispatch(get(&format!(
                "query=%7B__typename%7D&{}",
                extensions_param(json!({"persistedQuery": 1}))
            )))
            .await
            .unwrap();
        let by_post = service
            .dispatch(post(json!({"query": QUERY, "extensions": {"persistedQuery": 1}})))
            .await
            .unwrap();
        assert_eq!(by_get.status(), StatusCode::OK);
        assert_eq!(by_post.status(), StatusCode::OK);

        // a broken extensions document is not
        let by_get = service
            .dispatch(get("query=%7B__typename%7D&extensions=%7Bnope"))
            .await
            .unwrap();
        let by_post = service
            .dispatch(post(json!({"query": QUERY, "extensions": "nope"})))
            .await
            .unwrap();
        assert_eq!(by_get.status(), StatusCode::BAD_REQUEST);
        assert_eq!(by_post.status(), StatusCode::BAD_REQUEST);
        assert!(by_get.body().starts_with("malformed extensions"));
        assert!(by_post.body().starts_with("malformed extensions"));
    }

    #[tokio::test]
    async fn storage_failures_are_dispatch_errors() {
        let mut backend = MockCacheBackend::new();
        backend
            .expect_get()
            .returning(|_| Err(CacheError::Unavailable("timeout".to_string())));
        let registry = PersistedQueryRegistry::new(Arc::new(backend));
        let service = service(registry, MockQueryExecutor::new());

        let result = service
            .dispatch(get(&extensions_param(
                json!({"persistedQuery": {"sha256Hash": hash_query(QUERY)}}),
            )))
            .await;
        assert!(matches!(result, Err(DispatchError::Storage(_))));
    }

    #[tokio::test]
    async fn execution_failures_are_dispatch_errors() {
        let mut executor = MockQueryExecutor::new();
        executor
            .expect_execute()
            .returning(|_| Err("upstream unreachable".into()));
        let service = service(registry(), executor);

        let result = service.dispatch(post(json!({ "query": QUERY }))).await;
        assert!(matches!(result, Err(DispatchError::Execution(_))));
    }

    #[tokio::test]
    async fn it_is_a_tower_service() {
        let service = service(registry(), ok_executor(1));
        let response = service
            .oneshot(post(json!({ "query": QUERY })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
