//! Job submission, querying, cancellation, and deletion.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};

use storyforge_core::{JobId, JobKind, JobStatus, LogLevel};
use storyforge_store::JobFilter;

use crate::app::routes::parse_id;
use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", post(submit_job).get(list_jobs))
        .route("/stats", get(job_stats))
        .route("/:id", get(get_job).delete(delete_job))
        .route("/:id/logs", get(get_job_logs))
        .route("/:id/cancel", post(cancel_job))
}

/// POST /jobs
///
/// Create a pending job and trigger queue processing. Returns immediately;
/// execution is observed via polling or `/stream`.
pub async fn submit_job(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::SubmitJobRequest>,
) -> axum::response::Response {
    let kind: JobKind = match body.kind.parse() {
        Ok(k) => k,
        Err(_) => {
            return errors::json_error(
                StatusCode::BAD_REQUEST,
                "invalid_kind",
                format!("unknown job kind: {}", body.kind),
            );
        }
    };

    match services.scheduler.submit(kind, body.payload, body.priority) {
        Ok(job) => (
            StatusCode::CREATED,
            Json(dto::SubmitJobResponse::from(&job)),
        )
            .into_response(),
        Err(e) => errors::scheduler_error_to_response(e),
    }
}

/// GET /jobs?status=&kind=&limit=&offset=
pub async fn list_jobs(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::ListJobsQuery>,
) -> axum::response::Response {
    let mut filter = JobFilter::default();
    if let Some(status) = &query.status {
        match status.parse::<JobStatus>() {
            Ok(s) => filter.status = Some(s),
            Err(e) => {
                return errors::json_error(StatusCode::BAD_REQUEST, "invalid_status", e.to_string());
            }
        }
    }
    if let Some(kind) = &query.kind {
        match kind.parse::<JobKind>() {
            Ok(k) => filter.kind = Some(k),
            Err(e) => {
                return errors::json_error(StatusCode::BAD_REQUEST, "invalid_kind", e.to_string());
            }
        }
    }
    if let Some(limit) = query.limit {
        filter.limit = limit;
    }
    filter.offset = query.offset.unwrap_or(0);

    match services.store.jobs(&filter) {
        Ok(jobs) => Json(jobs).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

/// GET /jobs/stats
pub async fn job_stats(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    match services.store.status_counts() {
        Ok(counts) => Json(counts).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

/// GET /jobs/:id
pub async fn get_job(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: JobId = match parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.store.job(id) {
        Ok(Some(job)) => Json(job).into_response(),
        Ok(None) => errors::json_error(StatusCode::NOT_FOUND, "not_found", "job not found"),
        Err(e) => errors::store_error_to_response(e),
    }
}

/// GET /jobs/:id/logs?level=&limit=&offset=
pub async fn get_job_logs(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Query(query): Query<dto::ListLogsQuery>,
) -> axum::response::Response {
    let id: JobId = match parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let level = match &query.level {
        Some(raw) => match raw.parse::<LogLevel>() {
            Ok(l) => Some(l),
            Err(e) => {
                return errors::json_error(StatusCode::BAD_REQUEST, "invalid_level", e.to_string());
            }
        },
        None => None,
    };

    match services.store.logs(
        id,
        level,
        query.limit.unwrap_or(100),
        query.offset.unwrap_or(0),
    ) {
        Ok(entries) => Json(entries).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

/// POST /jobs/:id/cancel
///
/// Cancels a job still waiting in the queue. A running job is not
/// interruptible and answers 409.
pub async fn cancel_job(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: JobId = match parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.scheduler.cancel(id) {
        Ok(true) => Json(serde_json::json!({"cancelled": true})).into_response(),
        Ok(false) => {
            if services.scheduler.is_running(id) {
                errors::json_error(
                    StatusCode::CONFLICT,
                    "job_running",
                    "running jobs cannot be cancelled",
                )
            } else {
                errors::json_error(
                    StatusCode::NOT_FOUND,
                    "not_cancellable",
                    "job is not in the pending queue",
                )
            }
        }
        Err(e) => errors::scheduler_error_to_response(e),
    }
}

/// DELETE /jobs/:id
///
/// Hard-deletes the job record and its log trail. Refused while running.
pub async fn delete_job(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: JobId = match parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    if services.scheduler.is_running(id) {
        return errors::json_error(
            StatusCode::CONFLICT,
            "job_running",
            "running jobs cannot be deleted",
        );
    }
    // A queued job is cancelled first so it cannot be dispatched between the
    // check and the delete.
    if let Err(e) = services.scheduler.cancel(id) {
        return errors::scheduler_error_to_response(e);
    }
    match services.store.delete_job(id) {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => errors::json_error(StatusCode::NOT_FOUND, "not_found", "job not found"),
        Err(e) => errors::store_error_to_response(e),
    }
}
