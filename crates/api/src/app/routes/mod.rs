use axum::Router;

pub mod audits;
pub mod auth;
pub mod common;
pub mod events;
pub mod materials;
pub mod missions;
pub mod system;
pub mod transmutations;
pub mod users;

/// Router for all authenticated endpoints. Role restrictions are
/// layered per resource inside each sub-router.
pub fn router() -> Router {
    Router::new()
        .nest("/transmutations", transmutations::router())
        .nest("/materials", materials::router())
        .nest("/missions", missions::router())
        .nest("/users", users::router())
        .nest("/audits", audits::router())
}
