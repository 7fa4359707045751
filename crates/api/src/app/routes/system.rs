//! Process health over its two external dependencies.

use std::time::Duration;

use axum::{Extension, Json, http::StatusCode};
use serde_json::json;

use crate::app::AppState;

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// GET /api/health
///
/// Pings Postgres and the queue store. 200 when both answer, 503
/// otherwise, with per-dependency detail either way.
pub async fn health(
    Extension(state): Extension<AppState>,
) -> (StatusCode, Json<serde_json::Value>) {
    let database = match tokio::time::timeout(
        PROBE_TIMEOUT,
        sqlx::query("SELECT 1").execute(&state.db),
    )
    .await
    {
        Ok(Ok(_)) => "ok".to_string(),
        Ok(Err(e)) => format!("error: {e}"),
        Err(_) => "error: probe timed out".to_string(),
    };

    let queue = match tokio::time::timeout(PROBE_TIMEOUT, state.queue_store.ping()).await {
        Ok(Ok(())) => "ok".to_string(),
        Ok(Err(e)) => format!("error: {e}"),
        Err(_) => "error: probe timed out".to_string(),
    };

    let healthy = database == "ok" && queue == "ok";
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(json!({
            "status": if healthy { "healthy" } else { "unhealthy" },
            "database": database,
            "queue": queue,
        })),
    )
}
