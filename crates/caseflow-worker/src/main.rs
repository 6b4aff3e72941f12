use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use caseflow_engine::dispatch::{noop, Collaborators, Dispatcher, HttpWebhookCaller};
use caseflow_engine::engine::{Advancer, OutcomeController};
use caseflow_engine::journal::ExecutionJournal;
use caseflow_engine::persistence::{EngineStore, PostgresEngineStore};
use caseflow_engine::reliability::{CircuitBreaker, CircuitBreakerConfig, RetryPolicy};
use caseflow_engine::worker::ClaimLoop;
use caseflow_engine::EngineConfig;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "caseflow_worker=info,caseflow_engine=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("caseflow-worker starting...");

    let config = EngineConfig::from_env();
    tracing::info!(
        worker_id = %config.worker_id,
        queues = ?config.queues,
        max_concurrent = config.max_concurrent_tasks,
        "worker configured"
    );

    let database_url =
        std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let pool = PgPoolOptions::new()
        .max_connections(config.max_concurrent_tasks as u32 + 4)
        .connect(&database_url)
        .await
        .context("failed to connect to PostgreSQL")?;

    let store = PostgresEngineStore::new(pool);
    store.migrate().await.context("failed to run migrations")?;
    let store: Arc<dyn EngineStore> = Arc::new(store);

    let journal = ExecutionJournal::new(Arc::clone(&store), config.worker_id.clone());

    let collaborators = Collaborators {
        webhooks: Some(Arc::new(HttpWebhookCaller::new())),
        notifications: Some(Arc::new(noop::NoopNotificationSender)),
        entities: Some(Arc::new(noop::NoopEntityClient)),
        integrations: Some(Arc::new(noop::NoopIntegrationClient)),
        bulk_imports: Some(Arc::new(noop::NoopBulkImporter)),
        breaker: Some(Arc::new(CircuitBreaker::new(CircuitBreakerConfig::default()))),
        ..Default::default()
    };

    let dispatcher = Arc::new(Dispatcher::new(collaborators, config.llm_enabled));
    let advancer = Advancer::new(
        Arc::clone(&store),
        journal.clone(),
        config.default_max_retries,
    );
    let controller = Arc::new(OutcomeController::new(
        Arc::clone(&store),
        advancer,
        RetryPolicy::new(config.base_retry_delay),
        journal.clone(),
    ));

    let claim_loop = ClaimLoop::new(store, dispatcher, controller, journal, config);
    claim_loop.start()?;

    tracing::info!("worker ready, waiting for shutdown signal...");
    tokio::signal::ctrl_c().await?;

    claim_loop.shutdown().await?;
    tracing::info!("worker shutdown complete");
    Ok(())
}
