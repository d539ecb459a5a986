//! Operator maintenance endpoints.

use std::sync::Arc;

use axum::{Json, Router, extract::Extension, http::StatusCode, response::IntoResponse, routing::post};
use chrono::Duration;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new().route("/retention", post(apply_retention))
}

/// POST /admin/retention
///
/// Prunes old records on demand. Both knobs are optional; an empty body is
/// a no-op that reports zero removals.
pub async fn apply_retention(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::RetentionRequest>,
) -> axum::response::Response {
    let mut jobs_removed = 0;
    if let Some(keep) = body.keep_jobs {
        match services.store.prune_jobs(keep) {
            Ok(n) => jobs_removed = n,
            Err(e) => return errors::store_error_to_response(e),
        }
    }
    let mut logs_removed = 0;
    if let Some(hours) = body.max_log_age_hours {
        if hours < 0 {
            return errors::json_error(
                StatusCode::BAD_REQUEST,
                "invalid_age",
                "max_log_age_hours must not be negative",
            );
        }
        match services.store.prune_logs(Duration::hours(hours)) {
            Ok(n) => logs_removed = n,
            Err(e) => return errors::store_error_to_response(e),
        }
    }
    Json(serde_json::json!({
        "jobs_removed": jobs_removed,
        "logs_removed": logs_removed,
    }))
    .into_response()
}
