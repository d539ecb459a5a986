use axum::{Router, http::StatusCode, routing::get};

use crate::app::errors;

pub mod admin;
pub mod credentials;
pub mod jobs;
pub mod queue;
pub mod stream;
pub mod system;

/// Router for all job-layer endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/health", get(system::health))
        .route("/stream", get(stream::stream_events))
        .nest("/jobs", jobs::router())
        .nest("/queue", queue::router())
        .nest("/credentials", credentials::router())
        .nest("/admin", admin::router())
}

/// Parse a typed identifier from a path segment, answering 400 on failure.
pub(crate) fn parse_id<T: core::str::FromStr>(raw: &str) -> Result<T, axum::response::Response> {
    raw.parse::<T>().map_err(|_| {
        errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "malformed identifier")
    })
}
