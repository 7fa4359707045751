//! Mission endpoints. Any authenticated user may read missions and
//! move their status; creating, editing and deleting them is
//! supervisor work. Closing a mission gets its own audit action.

use axum::{
    Extension, Json, Router,
    extract::Path,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch},
};
use chrono::Utc;

use athanor_core::{DomainError, MissionStatus, NewAudit, NewMission, actions, entities};

use crate::app::routes::common;
use crate::app::{AppState, dto, errors};
use crate::middleware::{self, AuthenticatedUser};

pub fn router() -> Router {
    let supervisor = Router::new()
        .route("/", axum::routing::post(create_mission))
        .route(
            "/:id",
            axum::routing::put(update_mission).delete(delete_mission),
        )
        .route_layer(axum::middleware::from_fn(middleware::require_supervisor));

    Router::new()
        .route("/", get(list_missions))
        .route("/:id", get(get_mission))
        .route("/:id/status", patch(update_mission_status))
        .merge(supervisor)
}

pub async fn list_missions(Extension(state): Extension<AppState>) -> axum::response::Response {
    match state.missions.list().await {
        Ok(rows) => Json(dto::data(&rows)).into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}

pub async fn get_mission(
    Extension(state): Extension<AppState>,
    Path(id): Path<i64>,
) -> axum::response::Response {
    match state.missions.find(id).await {
        Ok(Some(mission)) => Json(dto::data(&mission)).into_response(),
        Ok(None) => errors::domain_error_to_response(DomainError::MissionNotFound),
        Err(e) => errors::domain_error_to_response(e),
    }
}

pub async fn create_mission(
    Extension(state): Extension<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(body): Json<NewMission>,
) -> axum::response::Response {
    if let Err(e) = body.validate() {
        return errors::domain_error_to_response(e);
    }

    let mission = match state.missions.create(body).await {
        Ok(mission) => mission,
        Err(e) => return errors::domain_error_to_response(e),
    };

    if let Err(e) = state
        .queue
        .enqueue_audit(NewAudit {
            action: actions::MISSION_CREATED.to_string(),
            entity: entities::MISSION.to_string(),
            entity_id: mission.id,
            user_email: user.email.clone(),
            details: "Mission created".to_string(),
        })
        .await
    {
        common::report_async_error(&state, "/api/missions", e).await;
    }

    (StatusCode::CREATED, Json(dto::data(&mission))).into_response()
}

pub async fn update_mission(
    Extension(state): Extension<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<i64>,
    Json(body): Json<dto::UpdateMissionRequest>,
) -> axum::response::Response {
    let mut mission = match state.missions.find(id).await {
        Ok(Some(mission)) => mission,
        Ok(None) => return errors::domain_error_to_response(DomainError::MissionNotFound),
        Err(e) => return errors::domain_error_to_response(e),
    };

    if let Some(title) = body.title {
        mission.title = title;
    }
    if let Some(description) = body.description {
        mission.description = description;
    }
    if let Some(difficulty) = body.difficulty {
        mission.difficulty = difficulty;
    }
    let previous_status = mission.status;
    if let Some(status) = body.status {
        match MissionStatus::parse(status.trim().to_uppercase().as_str()) {
            Ok(parsed) => mission.status = parsed,
            Err(e) => return errors::domain_error_to_response(e),
        }
    }
    if let Some(assigned_to) = body.assigned_to {
        mission.assigned_to = Some(assigned_to);
    }
    mission.updated_at = Utc::now();

    if let Err(e) = state.missions.save(&mission).await {
        return errors::domain_error_to_response(e);
    }

    let (action, details) =
        if previous_status != mission.status && mission.status == MissionStatus::Completed {
            (actions::MISSION_CLOSED, "Mission marked as completed")
        } else {
            (actions::MISSION_UPDATED, "Mission updated")
        };
    if let Err(e) = state
        .queue
        .enqueue_audit(NewAudit {
            action: action.to_string(),
            entity: entities::MISSION.to_string(),
            entity_id: mission.id,
            user_email: user.email.clone(),
            details: details.to_string(),
        })
        .await
    {
        common::report_async_error(&state, &format!("/api/missions/{id}"), e).await;
    }

    (StatusCode::ACCEPTED, Json(dto::data(&mission))).into_response()
}

pub async fn update_mission_status(
    Extension(state): Extension<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<i64>,
    Json(body): Json<dto::UpdateMissionStatusRequest>,
) -> axum::response::Response {
    let mission = match state.missions.find(id).await {
        Ok(Some(mission)) => mission,
        Ok(None) => return errors::domain_error_to_response(DomainError::MissionNotFound),
        Err(e) => return errors::domain_error_to_response(e),
    };

    let Ok(new_status) = MissionStatus::parse(body.status.trim().to_uppercase().as_str()) else {
        return errors::json_error(
            StatusCode::BAD_REQUEST,
            "validation_error",
            "invalid status value",
        );
    };

    // Nothing to change, nothing to audit.
    if mission.status == new_status {
        return Json(dto::data(&mission)).into_response();
    }

    let previous_status = mission.status;
    let mission = match state.missions.set_status(mission.id, new_status).await {
        Ok(mission) => mission,
        Err(e) => return errors::domain_error_to_response(e),
    };

    let (action, details) = if new_status == MissionStatus::Completed
        && previous_status != MissionStatus::Completed
    {
        (actions::MISSION_CLOSED, "Mission marked as completed")
    } else {
        (actions::MISSION_STATUS_CHANGED, "Mission status updated")
    };
    if let Err(e) = state
        .queue
        .enqueue_audit(NewAudit {
            action: action.to_string(),
            entity: entities::MISSION.to_string(),
            entity_id: mission.id,
            user_email: user.email.clone(),
            details: details.to_string(),
        })
        .await
    {
        common::report_async_error(&state, &format!("/api/missions/{id}/status"), e).await;
    }

    (StatusCode::ACCEPTED, Json(dto::data(&mission))).into_response()
}

pub async fn delete_mission(
    Extension(state): Extension<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<i64>,
) -> axum::response::Response {
    let mission = match state.missions.find(id).await {
        Ok(Some(mission)) => mission,
        Ok(None) => return errors::domain_error_to_response(DomainError::MissionNotFound),
        Err(e) => return errors::domain_error_to_response(e),
    };

    if let Err(e) = state.missions.delete(mission.id).await {
        return errors::domain_error_to_response(e);
    }

    if let Err(e) = state
        .queue
        .enqueue_audit(NewAudit {
            action: actions::MISSION_DELETED.to_string(),
            entity: entities::MISSION.to_string(),
            entity_id: mission.id,
            user_email: user.email.clone(),
            details: "Mission deleted".to_string(),
        })
        .await
    {
        common::report_async_error(&state, &format!("/api/missions/{id}"), e).await;
    }

    StatusCode::NO_CONTENT.into_response()
}
