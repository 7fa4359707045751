//! Transmutation endpoints.
//!
//! Creation runs the guarded material decrement, hands the heavy work
//! to the task queue and answers `202 Accepted` with the `PENDING`
//! row; the worker drives it to completion and clients follow along on
//! the event stream. Alchemists only see their own rows; supervisors
//! see and may edit everything.

use axum::{
    Extension, Json, Router,
    extract::Path,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use chrono::Utc;

use athanor_core::{
    DomainError, NewAudit, NewTransmutation, TransmutationStatus, actions, entities,
};
use athanor_events::event_types;

use crate::app::routes::common;
use crate::app::{AppState, dto, errors};
use crate::middleware::{self, AuthenticatedUser};

pub fn router() -> Router {
    let supervisor = Router::new()
        .route(
            "/:id",
            axum::routing::put(update_transmutation).delete(delete_transmutation),
        )
        .route_layer(axum::middleware::from_fn(middleware::require_supervisor));

    Router::new()
        .route("/", get(list_transmutations).post(create_transmutation))
        .route("/:id", get(get_transmutation))
        .merge(supervisor)
}

pub async fn list_transmutations(
    Extension(state): Extension<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> axum::response::Response {
    let result = if user.is_supervisor() {
        state.transmutations.list().await
    } else {
        state.transmutations.list_by_user(user.id).await
    };

    match result {
        Ok(rows) => Json(dto::data(&rows)).into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}

pub async fn get_transmutation(
    Extension(state): Extension<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<i64>,
) -> axum::response::Response {
    match state.transmutations.find(id).await {
        Ok(Some(t)) => {
            if !user.is_supervisor() && t.user_id != user.id {
                return errors::json_error(StatusCode::FORBIDDEN, "forbidden", "forbidden");
            }
            Json(dto::data(&t)).into_response()
        }
        Ok(None) => errors::domain_error_to_response(DomainError::TransmutationNotFound),
        Err(e) => errors::domain_error_to_response(e),
    }
}

pub async fn create_transmutation(
    Extension(state): Extension<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(body): Json<dto::CreateTransmutationRequest>,
) -> axum::response::Response {
    let mut owner_id = user.id;
    if user.is_supervisor() {
        if let Some(requested_owner) = body.user_id {
            owner_id = requested_owner;
        }
    }

    let new = NewTransmutation {
        user_id: owner_id,
        material_id: body.material_id,
        formula: body.formula,
        quantity: body.quantity,
    };
    if let Err(e) = new.validate() {
        return errors::domain_error_to_response(e);
    }

    let transmutation = match state.transmutations.create_guarded(new).await {
        Ok(t) => t,
        Err(e) => return errors::domain_error_to_response(e),
    };

    // Processing and the audit both ride the queue; a dispatch failure
    // never takes the already-committed row down with it.
    if let Err(e) = state
        .queue
        .enqueue_transmutation_processing(transmutation.id, user.email.clone())
        .await
    {
        common::report_async_error(&state, "/api/transmutations", e).await;
    }

    let details = if transmutation.formula.trim().is_empty() {
        "transmutation queued for processing".to_string()
    } else {
        format!("formula: {}", transmutation.formula)
    };
    if let Err(e) = state
        .queue
        .enqueue_audit(NewAudit {
            action: actions::TRANSMUTATION_CREATED.to_string(),
            entity: entities::TRANSMUTATION.to_string(),
            entity_id: transmutation.id,
            user_email: user.email.clone(),
            details,
        })
        .await
    {
        common::report_async_error(&state, "/api/transmutations", e).await;
    }

    state
        .hub
        .broadcast(event_types::TRANSMUTATION_UPDATED, &transmutation);

    (StatusCode::ACCEPTED, Json(dto::data(&transmutation))).into_response()
}

pub async fn update_transmutation(
    Extension(state): Extension<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<i64>,
    Json(body): Json<dto::UpdateTransmutationRequest>,
) -> axum::response::Response {
    let mut transmutation = match state.transmutations.find(id).await {
        Ok(Some(t)) => t,
        Ok(None) => return errors::domain_error_to_response(DomainError::TransmutationNotFound),
        Err(e) => return errors::domain_error_to_response(e),
    };

    if let Some(formula) = body.formula {
        transmutation.formula = formula;
    }
    if let Some(status) = body.status {
        match TransmutationStatus::parse(status.trim().to_uppercase().as_str()) {
            Ok(parsed) => transmutation.status = parsed,
            Err(e) => return errors::domain_error_to_response(e),
        }
    }
    if let Some(result) = body.result {
        transmutation.result = result;
    }
    transmutation.updated_at = Utc::now();

    if let Err(e) = state.transmutations.save(&transmutation).await {
        return errors::domain_error_to_response(e);
    }

    if let Err(e) = state
        .queue
        .enqueue_audit(NewAudit {
            action: actions::TRANSMUTATION_UPDATED.to_string(),
            entity: entities::TRANSMUTATION.to_string(),
            entity_id: transmutation.id,
            user_email: user.email.clone(),
            details: "manual update".to_string(),
        })
        .await
    {
        common::report_async_error(&state, &format!("/api/transmutations/{id}"), e).await;
    }

    state
        .hub
        .broadcast(event_types::TRANSMUTATION_UPDATED, &transmutation);

    (StatusCode::ACCEPTED, Json(dto::data(&transmutation))).into_response()
}

pub async fn delete_transmutation(
    Extension(state): Extension<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<i64>,
) -> axum::response::Response {
    let transmutation = match state.transmutations.find(id).await {
        Ok(Some(t)) => t,
        Ok(None) => return errors::domain_error_to_response(DomainError::TransmutationNotFound),
        Err(e) => return errors::domain_error_to_response(e),
    };

    if let Err(e) = state.transmutations.delete(transmutation.id).await {
        return errors::domain_error_to_response(e);
    }

    if let Err(e) = state
        .queue
        .enqueue_audit(NewAudit {
            action: actions::TRANSMUTATION_DELETED.to_string(),
            entity: entities::TRANSMUTATION.to_string(),
            entity_id: transmutation.id,
            user_email: user.email.clone(),
            details: "transmutation removed".to_string(),
        })
        .await
    {
        common::report_async_error(&state, &format!("/api/transmutations/{id}"), e).await;
    }

    state.hub.broadcast(
        event_types::TRANSMUTATION_DELETED,
        &serde_json::json!({ "id": transmutation.id }),
    );

    StatusCode::NO_CONTENT.into_response()
}
