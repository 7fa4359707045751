//! Material endpoints. Reads are open to both roles; stock mutations
//! are supervisor work and land in the audit trail.

use axum::{
    Extension, Json, Router,
    extract::Path,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use chrono::Utc;

use athanor_core::{DomainError, NewAudit, NewMaterial, actions, entities};

use crate::app::routes::common;
use crate::app::{AppState, dto, errors};
use crate::middleware::{self, AuthenticatedUser};

pub fn router() -> Router {
    let supervisor = Router::new()
        .route("/", axum::routing::post(create_material))
        .route(
            "/:id",
            axum::routing::put(update_material).delete(delete_material),
        )
        .route_layer(axum::middleware::from_fn(middleware::require_supervisor));

    Router::new()
        .route("/", get(list_materials))
        .route("/:id", get(get_material))
        .merge(supervisor)
}

pub async fn list_materials(Extension(state): Extension<AppState>) -> axum::response::Response {
    match state.materials.list().await {
        Ok(rows) => Json(dto::data(&rows)).into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}

pub async fn get_material(
    Extension(state): Extension<AppState>,
    Path(id): Path<i64>,
) -> axum::response::Response {
    match state.materials.find(id).await {
        Ok(Some(material)) => Json(dto::data(&material)).into_response(),
        Ok(None) => errors::domain_error_to_response(DomainError::MaterialNotFound),
        Err(e) => errors::domain_error_to_response(e),
    }
}

pub async fn create_material(
    Extension(state): Extension<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(body): Json<NewMaterial>,
) -> axum::response::Response {
    if let Err(e) = body.validate() {
        return errors::domain_error_to_response(e);
    }

    let material = match state.materials.create(body).await {
        Ok(material) => material,
        Err(e) => return errors::domain_error_to_response(e),
    };

    if let Err(e) = state
        .queue
        .enqueue_audit(NewAudit {
            action: actions::MATERIAL_CREATED.to_string(),
            entity: entities::MATERIAL.to_string(),
            entity_id: material.id,
            user_email: user.email.clone(),
            details: "Material created".to_string(),
        })
        .await
    {
        common::report_async_error(&state, "/api/materials", e).await;
    }

    (StatusCode::CREATED, Json(dto::data(&material))).into_response()
}

pub async fn update_material(
    Extension(state): Extension<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<i64>,
    Json(body): Json<dto::UpdateMaterialRequest>,
) -> axum::response::Response {
    let mut material = match state.materials.find(id).await {
        Ok(Some(material)) => material,
        Ok(None) => return errors::domain_error_to_response(DomainError::MaterialNotFound),
        Err(e) => return errors::domain_error_to_response(e),
    };

    if let Some(name) = body.name {
        material.name = name;
    }
    if let Some(rarity) = body.rarity {
        material.rarity = rarity;
    }
    if let Some(quantity) = body.quantity {
        if !quantity.is_finite() || quantity < 0.0 {
            return errors::domain_error_to_response(DomainError::validation(
                "quantity must be non-negative",
            ));
        }
        material.quantity = quantity;
    }
    material.updated_at = Utc::now();

    if let Err(e) = state.materials.save(&material).await {
        return errors::domain_error_to_response(e);
    }

    if let Err(e) = state
        .queue
        .enqueue_audit(NewAudit {
            action: actions::MATERIAL_UPDATED.to_string(),
            entity: entities::MATERIAL.to_string(),
            entity_id: material.id,
            user_email: user.email.clone(),
            details: "Material updated".to_string(),
        })
        .await
    {
        common::report_async_error(&state, &format!("/api/materials/{id}"), e).await;
    }

    (StatusCode::ACCEPTED, Json(dto::data(&material))).into_response()
}

pub async fn delete_material(
    Extension(state): Extension<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<i64>,
) -> axum::response::Response {
    let material = match state.materials.find(id).await {
        Ok(Some(material)) => material,
        Ok(None) => return errors::domain_error_to_response(DomainError::MaterialNotFound),
        Err(e) => return errors::domain_error_to_response(e),
    };

    if let Err(e) = state.materials.delete(material.id).await {
        return errors::domain_error_to_response(e);
    }

    if let Err(e) = state
        .queue
        .enqueue_audit(NewAudit {
            action: actions::MATERIAL_DELETED.to_string(),
            entity: entities::MATERIAL.to_string(),
            entity_id: material.id,
            user_email: user.email.clone(),
            details: "Material deleted".to_string(),
        })
        .await
    {
        common::report_async_error(&state, &format!("/api/materials/{id}"), e).await;
    }

    StatusCode::NO_CONTENT.into_response()
}
