//! HTTP application wiring (Axum router + shared state).
//!
//! Layout:
//! - `routes/`: HTTP routes + handlers (one file per resource)
//! - `dto.rs`: request DTOs and JSON mapping helpers
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{
    Extension, Router,
    routing::{get, post},
};
use sqlx::PgPool;

use athanor_core::{AuditStore, MaterialStore, MissionStore, TransmutationStore, UserStore};
use athanor_events::EventHub;
use athanor_infra::{QueueStore, TaskQueue};

use crate::auth::JwtService;
use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;

/// Everything the handlers share, cloned into each request as an
/// extension. The pool and queue store appear separately from the
/// stores so the health probe can ping both dependencies directly.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub users: Arc<dyn UserStore>,
    pub transmutations: Arc<dyn TransmutationStore>,
    pub materials: Arc<dyn MaterialStore>,
    pub missions: Arc<dyn MissionStore>,
    pub audits: Arc<dyn AuditStore>,
    pub queue: Arc<TaskQueue>,
    pub queue_store: Arc<dyn QueueStore>,
    pub hub: Arc<EventHub>,
    pub jwt: Arc<JwtService>,
}

/// Build the full HTTP router (public entrypoint used by `main.rs`).
///
/// `/api/auth/*`, `/api/health` and `/api/events` stay outside the
/// bearer middleware: the first two are public, and the event stream
/// authenticates itself from a query parameter because `EventSource`
/// cannot set headers.
pub fn build_app(state: AppState) -> Router {
    let auth_state = middleware::AuthState {
        jwt: Arc::clone(&state.jwt),
    };

    let protected = routes::router().layer(axum::middleware::from_fn_with_state(
        auth_state,
        middleware::auth_middleware,
    ));

    Router::new()
        .route("/api/auth/register", post(routes::auth::register))
        .route("/api/auth/login", post(routes::auth::login))
        .route("/api/events", get(routes::events::stream_events))
        .route("/api/health", get(routes::system::health))
        .nest("/api", protected)
        .layer(Extension(state))
}
