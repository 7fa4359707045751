//! Bearer-token authentication and role guards.

use std::sync::Arc;

use axum::{
    extract::{Extension, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

use athanor_core::Role;

use crate::app::errors;
use crate::auth::JwtService;

#[derive(Clone)]
pub struct AuthState {
    pub jwt: Arc<JwtService>,
}

/// Identity attached to every authenticated request.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub id: i64,
    pub email: String,
    pub role: Role,
    pub name: String,
}

impl AuthenticatedUser {
    pub fn is_supervisor(&self) -> bool {
        self.role == Role::Supervisor
    }
}

pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let token = extract_bearer(req.headers())?;

    let claims = state
        .jwt
        .verify(token)
        .map_err(|_e| StatusCode::UNAUTHORIZED)?;

    let role = Role::parse(&claims.role).map_err(|_e| StatusCode::UNAUTHORIZED)?;

    req.extensions_mut().insert(AuthenticatedUser {
        id: claims.sub,
        email: claims.email,
        role,
        name: claims.name,
    });

    Ok(next.run(req).await)
}

/// Route layer for endpoints only supervisors may call. Expects
/// [`auth_middleware`] to have run already.
pub async fn require_supervisor(
    Extension(user): Extension<AuthenticatedUser>,
    req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    if !user.is_supervisor() {
        return errors::json_error(
            StatusCode::FORBIDDEN,
            "forbidden",
            "supervisor role required",
        );
    }
    next.run(req).await
}

fn extract_bearer(headers: &HeaderMap) -> Result<&str, StatusCode> {
    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let header = header.to_str().map_err(|_| StatusCode::UNAUTHORIZED)?;

    let header = header
        .strip_prefix("Bearer ")
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let token = header.trim();
    if token.is_empty() {
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::http::header::AUTHORIZATION;

    #[test]
    fn extract_bearer_accepts_well_formed_header() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, "Bearer abc.def.ghi".parse().unwrap());
        assert_eq!(extract_bearer(&headers).unwrap(), "abc.def.ghi");
    }

    #[test]
    fn extract_bearer_rejects_missing_and_malformed_headers() {
        let headers = HeaderMap::new();
        assert_eq!(extract_bearer(&headers), Err(StatusCode::UNAUTHORIZED));

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, "Basic abc".parse().unwrap());
        assert_eq!(extract_bearer(&headers), Err(StatusCode::UNAUTHORIZED));

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, "Bearer   ".parse().unwrap());
        assert_eq!(extract_bearer(&headers), Err(StatusCode::UNAUTHORIZED));
    }
}
