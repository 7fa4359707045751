//! Audit trail, supervisor-only and read-only over HTTP. Writes go
//! through the task queue so the trail observes the same ordering the
//! worker does.

use axum::{
    Extension, Json, Router,
    extract::Query,
    response::IntoResponse,
    routing::get,
};

use crate::app::{AppState, dto, errors};
use crate::middleware;

const DEFAULT_LIMIT: i64 = 50;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_audits))
        .route_layer(axum::middleware::from_fn(middleware::require_supervisor))
}

pub async fn list_audits(
    Extension(state): Extension<AppState>,
    Query(query): Query<dto::AuditListQuery>,
) -> axum::response::Response {
    let limit = match query.limit {
        Some(limit) if limit > 0 => limit,
        _ => DEFAULT_LIMIT,
    };

    match state.audits.list(limit).await {
        Ok(rows) => Json(dto::data(&rows)).into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}
