//! Queue inspection and concurrency control.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, put},
};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", get(queue_status))
        .route("/ceiling", put(set_ceiling))
}

/// GET /queue
pub async fn queue_status(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    Json(services.scheduler.status()).into_response()
}

/// PUT /queue/ceiling
///
/// Raising the ceiling admits waiting jobs at once; lowering it only
/// throttles future admissions, in-flight jobs are never interrupted.
pub async fn set_ceiling(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::SetCeilingRequest>,
) -> axum::response::Response {
    if body.ceiling < 1 {
        return errors::json_error(
            StatusCode::BAD_REQUEST,
            "invalid_ceiling",
            "ceiling must be at least 1",
        );
    }
    match services.scheduler.set_ceiling(body.ceiling) {
        Ok(ceiling) => Json(serde_json::json!({"ceiling": ceiling})).into_response(),
        Err(e) => errors::scheduler_error_to_response(e),
    }
}
