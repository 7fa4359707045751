use axum::{Extension, Json, http::StatusCode, response::IntoResponse};
use tracing::warn;

use athanor_core::{NewAudit, NewUser, Role, actions, entities};

use crate::app::{AppState, dto, errors};
use crate::auth;

pub async fn register(
    Extension(state): Extension<AppState>,
    Json(body): Json<dto::RegisterRequest>,
) -> axum::response::Response {
    let role_raw = body.role.trim().to_lowercase();
    if body.name.trim().is_empty()
        || body.specialty.trim().is_empty()
        || body.email.trim().is_empty()
        || body.password.is_empty()
        || role_raw.is_empty()
    {
        return errors::json_error(
            StatusCode::BAD_REQUEST,
            "validation_error",
            "name, specialty, email, password and role are required",
        );
    }
    let Ok(role) = Role::parse(&role_raw) else {
        return errors::json_error(StatusCode::BAD_REQUEST, "validation_error", "invalid role");
    };

    match state.users.find_by_email(&body.email).await {
        Ok(Some(_)) => {
            return errors::json_error(
                StatusCode::CONFLICT,
                "email_taken",
                "email already registered",
            );
        }
        Ok(None) => {}
        Err(e) => return errors::domain_error_to_response(e),
    }

    let password_hash = match auth::hash_password(&body.password) {
        Ok(hash) => hash,
        Err(e) => {
            return errors::json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal", e.to_string());
        }
    };

    let user = match state
        .users
        .create(NewUser {
            name: body.name,
            specialty: body.specialty,
            email: body.email,
            password_hash,
            role,
        })
        .await
    {
        Ok(user) => user,
        Err(e) => return errors::domain_error_to_response(e),
    };

    if let Err(e) = state
        .queue
        .enqueue_audit(NewAudit {
            action: actions::USER_REGISTERED.to_string(),
            entity: entities::USER.to_string(),
            entity_id: user.id,
            user_email: user.email.clone(),
            details: "New account created".to_string(),
        })
        .await
    {
        warn!(error = %e, "could not enqueue registration audit");
    }

    (StatusCode::CREATED, Json(dto::auth_response(&user, None))).into_response()
}

pub async fn login(
    Extension(state): Extension<AppState>,
    Json(body): Json<dto::LoginRequest>,
) -> axum::response::Response {
    let user = match state.users.find_by_email(&body.email).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            return errors::json_error(
                StatusCode::UNAUTHORIZED,
                "invalid_credentials",
                "invalid credentials",
            );
        }
        Err(e) => return errors::domain_error_to_response(e),
    };

    if !auth::verify_password(&body.password, &user.password_hash) {
        return errors::json_error(
            StatusCode::UNAUTHORIZED,
            "invalid_credentials",
            "invalid credentials",
        );
    }

    let token = match state.jwt.issue(&user) {
        Ok(token) => token,
        Err(e) => {
            return errors::json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal", e.to_string());
        }
    };

    if let Err(e) = state
        .queue
        .enqueue_audit(NewAudit {
            action: actions::USER_LOGIN.to_string(),
            entity: entities::USER.to_string(),
            entity_id: user.id,
            user_email: user.email.clone(),
            details: "User signed in".to_string(),
        })
        .await
    {
        warn!(error = %e, "could not enqueue login audit");
    }

    Json(dto::auth_response(&user, Some(token))).into_response()
}
