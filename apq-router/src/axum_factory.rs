//! Axum http server wiring.
use axum::body::Body;
use axum::extract::DefaultBodyLimit;
use axum::extract::Request;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::any;
use axum::routing::get;
use axum::Json;
use axum::Router;
use http::StatusCode;
use serde_json::json;

use crate::configuration::Server;
use crate::services::router::RouterService;

/// Largest request body accepted, in bytes.
pub(crate) const MAX_BODY_SIZE: usize = 2 * 1024 * 1024;

pub(crate) fn make_axum_router(service: RouterService, server: &Server) -> Router {
    Router::new()
        .route(&server.path, any(handle_graphql))
        .route(&server.health_check_path, get(health_check))
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .with_state(service)
}

async fn handle_graphql(State(service): State<RouterService>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let body = match axum::body::to_bytes(body, MAX_BODY_SIZE).await {
        Ok(body) => body,
        Err(err) => {
            tracing::debug!("could not read request body: {err}");
            return (
                StatusCode::BAD_REQUEST,
                format!("could not read request body: {err}"),
            )
                .into_response();
        }
    };

    match service.dispatch(http::Request::from_parts(parts, body)).await {
        Ok(response) => response.map(Body::from).into_response(),
        Err(err) => {
            tracing::error!("request failed: {err}");
            (err.status_code(), err.to_string()).into_response()
        }
    }
}

async fn health_check() -> impl IntoResponse {
    Json(json!({ "status": "pass" }))
}
