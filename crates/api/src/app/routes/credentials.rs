//! Administrative credential management. Listings are always masked.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch, post},
};

use storyforge_core::CredentialId;
use storyforge_credentials::CredentialUpdate;

use crate::app::routes::parse_id;
use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_credentials).post(add_credential))
        .route("/next", get(next_credential))
        .route("/:id", patch(update_credential).delete(remove_credential))
        .route("/:id/reactivate", post(reactivate_credential))
}

/// GET /credentials
pub async fn list_credentials(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    Json(services.pool.stats()).into_response()
}

/// POST /credentials
///
/// A duplicate secret is a no-op, reported as such rather than erroring.
pub async fn add_credential(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::AddCredentialRequest>,
) -> axum::response::Response {
    if body.secret.trim().is_empty() {
        return errors::json_error(
            StatusCode::BAD_REQUEST,
            "invalid_secret",
            "secret must not be empty",
        );
    }
    match services.pool.add(body.secret) {
        Some(id) => (
            StatusCode::CREATED,
            Json(serde_json::json!({"id": id, "added": true})),
        )
            .into_response(),
        None => Json(serde_json::json!({"added": false})).into_response(),
    }
}

/// GET /credentials/next
///
/// Dry run of the rotation policy: which credential the next attempt would
/// use. Does not advance the rotation.
pub async fn next_credential(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    match services.pool.peek() {
        Some(stats) => Json(stats).into_response(),
        None => errors::json_error(
            StatusCode::NOT_FOUND,
            "pool_exhausted",
            "no active credentials",
        ),
    }
}

/// PATCH /credentials/:id
pub async fn update_credential(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(update): Json<CredentialUpdate>,
) -> axum::response::Response {
    let id: CredentialId = match parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    if services.pool.update_metadata(id, update) {
        Json(serde_json::json!({"updated": true})).into_response()
    } else {
        errors::json_error(StatusCode::NOT_FOUND, "not_found", "credential not found")
    }
}

/// DELETE /credentials/:id
pub async fn remove_credential(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: CredentialId = match parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    if services.pool.remove(id) {
        StatusCode::NO_CONTENT.into_response()
    } else {
        errors::json_error(StatusCode::NOT_FOUND, "not_found", "credential not found")
    }
}

/// POST /credentials/:id/reactivate
pub async fn reactivate_credential(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: CredentialId = match parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    if services.pool.reactivate(id) {
        Json(serde_json::json!({"reactivated": true})).into_response()
    } else {
        errors::json_error(StatusCode::NOT_FOUND, "not_found", "credential not found")
    }
}
