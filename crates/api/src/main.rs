use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use athanor_api::app::{self, AppState};
use athanor_api::auth::JwtService;
use athanor_core::{AuditStore, MaterialStore, MissionStore, TransmutationStore, UserStore};
use athanor_events::EventHub;
use athanor_infra::{
    Config, PgAuditStore, PgMaterialStore, PgMissionStore, PgTransmutationStore, PgUserStore,
    PipelineSettings, QueueStore, RedisQueueStore, TaskContext, TaskQueue, connect_pool,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    athanor_observability::init();

    let config = Config::from_env()?;

    let pool = connect_pool(&config.database_url).await?;
    sqlx::migrate!("../../migrations")
        .run(&pool)
        .await
        .context("failed to run migrations")?;
    info!("database ready");

    let queue_store: Arc<dyn QueueStore> = Arc::new(RedisQueueStore::new(&config.redis_url)?);
    let hub = Arc::new(EventHub::new());

    let transmutations: Arc<dyn TransmutationStore> =
        Arc::new(PgTransmutationStore::new(pool.clone()));
    let materials: Arc<dyn MaterialStore> = Arc::new(PgMaterialStore::new(pool.clone()));
    let missions: Arc<dyn MissionStore> = Arc::new(PgMissionStore::new(pool.clone()));
    let users: Arc<dyn UserStore> = Arc::new(PgUserStore::new(pool.clone()));
    let audits: Arc<dyn AuditStore> = Arc::new(PgAuditStore::new(pool.clone()));

    let context = Arc::new(TaskContext {
        transmutations: Arc::clone(&transmutations),
        materials: Arc::clone(&materials),
        missions: Arc::clone(&missions),
        audits: Arc::clone(&audits),
        hub: Arc::clone(&hub),
        settings: PipelineSettings::from_config(&config),
    });

    let queue = Arc::new(TaskQueue::new(Arc::clone(&queue_store), context));
    queue.start().await.context("failed to start task queue")?;
    queue.schedule_daily_verification(config.verification_interval);

    let state = AppState {
        db: pool,
        users,
        transmutations,
        materials,
        missions,
        audits,
        queue: Arc::clone(&queue),
        queue_store,
        hub,
        jwt: Arc::new(JwtService::new(&config.jwt_secret)),
    };
    let router = app::build_app(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    queue.stop();
    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(%error, "failed to listen for shutdown signal");
        return;
    }
    info!("shutdown signal received");
}
