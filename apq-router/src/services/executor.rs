//! Execution of resolved queries.
//!
//! The router does not execute GraphQL itself: once a persisted query is
//! resolved, the request is handed to a [`QueryExecutor`].

use std::time::Duration;

use async_trait::async_trait;
use http::header::CONTENT_TYPE;
use http::HeaderValue;
use tower::BoxError;
use url::Url;

use crate::graphql;

/// Executes GraphQL requests on behalf of the router.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QueryExecutor: Send + Sync + 'static {
    /// Run `request` and produce the HTTP response sent back to the client.
    async fn execute(&self, request: graphql::Request) -> Result<http::Response<String>, BoxError>;
}

/// Forwards requests to an upstream GraphQL server over HTTP.
#[derive(Clone, Debug)]
pub struct HttpQueryExecutor {
    client: reqwest::Client,
    url: Url,
}

impl HttpQueryExecutor {
    pub fn new(url: Url, timeout: Duration) -> Result<Self, BoxError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl QueryExecutor for HttpQueryExecutor {
    async fn execute(&self, request: graphql::Request) -> Result<http::Response<String>, BoxError> {
        tracing::debug!(url = %self.url, "forwarding query upstream");
        let response = self
            .client
            .post(self.url.clone())
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let content_type = response.headers().get(CONTENT_TYPE).cloned();
        let body = response.text().await?;
        tracing::trace!(%status, "upstream responded");

        let mut builder = http::Response::builder().status(status);
        builder = builder.header(
            CONTENT_TYPE,
            content_type.unwrap_or_else(|| HeaderValue::from_static("application/json")),
        );
        Ok(builder.body(body)?)
    }
}
