//! Request DTOs and JSON response helpers.
//!
//! Resource responses are wrapped in `{"data": ...}`; the auth
//! endpoints answer flat objects. Domain types serialize themselves
//! (timestamps RFC 3339, password hashes skipped), so the helpers here
//! stay thin.

use serde::Deserialize;

use athanor_core::User;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub specialty: String,
    pub email: String,
    pub password: String,
    pub role: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateTransmutationRequest {
    pub material_id: i64,
    /// May be blank; the audit trail records it as queued without one.
    #[serde(default)]
    pub formula: String,
    pub quantity: f64,
    /// Supervisors may create on behalf of another user.
    pub user_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTransmutationRequest {
    pub formula: Option<String>,
    pub status: Option<String>,
    pub result: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateMaterialRequest {
    pub name: Option<String>,
    pub rarity: Option<String>,
    pub quantity: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateMissionRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub difficulty: Option<String>,
    pub status: Option<String>,
    pub assigned_to: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateMissionStatusRequest {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct AuditListQuery {
    pub limit: Option<i64>,
}

// -------------------------
// JSON mapping helpers
// -------------------------

/// Standard `{"data": ...}` envelope for resource responses.
pub fn data<T: serde::Serialize>(value: &T) -> serde_json::Value {
    serde_json::json!({ "data": value })
}

/// Flat auth response; `token` is present only on login.
pub fn auth_response(user: &User, token: Option<String>) -> serde_json::Value {
    let mut body = serde_json::json!({
        "id": user.id,
        "name": user.name,
        "specialty": user.specialty,
        "email": user.email,
        "role": user.role,
    });
    if let Some(token) = token {
        body["token"] = serde_json::Value::String(token);
    }
    body
}
