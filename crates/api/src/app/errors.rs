use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use athanor_core::DomainError;
use athanor_infra::QueueError;

/// Map a domain failure onto the wire shape every handler shares.
pub fn domain_error_to_response(err: DomainError) -> axum::response::Response {
    match err {
        DomainError::TransmutationNotFound
        | DomainError::MaterialNotFound
        | DomainError::MissionNotFound
        | DomainError::UserNotFound => json_error(StatusCode::NOT_FOUND, "not_found", err.to_string()),
        DomainError::InsufficientMaterial { .. } => json_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "insufficient_material",
            err.to_string(),
        ),
        DomainError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        DomainError::EmailTaken => json_error(
            StatusCode::CONFLICT,
            "email_taken",
            "email already registered",
        ),
        DomainError::InvalidCredentials => json_error(
            StatusCode::UNAUTHORIZED,
            "invalid_credentials",
            "invalid credentials",
        ),
        DomainError::Storage(msg) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", msg)
        }
    }
}

/// Queue failures surface as 503 so callers know to retry; anything
/// else from the queue is an internal fault.
pub fn queue_error_to_response(err: QueueError) -> axum::response::Response {
    match err {
        QueueError::NotStarted => {
            json_error(StatusCode::SERVICE_UNAVAILABLE, "queue_unavailable", err.to_string())
        }
        QueueError::Transient(msg) => {
            json_error(StatusCode::SERVICE_UNAVAILABLE, "queue_unavailable", msg)
        }
        other => json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "queue_error",
            other.to_string(),
        ),
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
