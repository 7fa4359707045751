//! User directory, supervisor-only. Registration creates users; this
//! surface only reads them (password hashes never serialize).

use axum::{Extension, Json, Router, extract::Path, response::IntoResponse, routing::get};

use athanor_core::DomainError;

use crate::app::{AppState, dto, errors};
use crate::middleware;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_users))
        .route("/:id", get(get_user))
        .route_layer(axum::middleware::from_fn(middleware::require_supervisor))
}

pub async fn list_users(Extension(state): Extension<AppState>) -> axum::response::Response {
    match state.users.list().await {
        Ok(rows) => Json(dto::data(&rows)).into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}

pub async fn get_user(
    Extension(state): Extension<AppState>,
    Path(id): Path<i64>,
) -> axum::response::Response {
    match state.users.find(id).await {
        Ok(Some(user)) => Json(dto::data(&user)).into_response(),
        Ok(None) => errors::domain_error_to_response(DomainError::UserNotFound),
        Err(e) => errors::domain_error_to_response(e),
    }
}
