//! Billy
//!
//! Main application entry point

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info};

use Billy::{
    config::Settings,
    database::{create_pool, run_migrations, DomainStore, PgDomainStore},
    handlers::MessageOrchestrator,
    middleware::TokenRateLimiter,
    services::{
        BackgroundTaskManager, GeminiClient, KeyValueStore, MessageHandler, MessageTransport,
        RedisQueueTransport, RedisStore,
    },
    state::{StateStorage, StepRegistry, StepServices},
    utils::logging,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    // Load configuration
    let settings = Settings::new()?;
    settings.validate()?;

    // Initialize logging
    let _log_guard = logging::init_logging(&settings.logging)?;

    info!("Starting {}...", Billy::info());

    info!("Connecting to database...");
    let pool = create_pool(&settings.database).await?;

    info!("Running database migrations...");
    run_migrations(&pool).await?;
    let domain: Arc<dyn DomainStore> = Arc::new(PgDomainStore::new(pool));

    info!("Connecting to Redis...");
    let redis = RedisStore::connect(&settings.redis).await?;
    let transport =
        RedisQueueTransport::connect(redis.client().clone(), &settings.redis.prefix, &settings.transport).await?;
    let transport: Arc<dyn MessageTransport> = Arc::new(transport);
    let store: Arc<dyn KeyValueStore> = Arc::new(redis);

    let interpreter = Arc::new(GeminiClient::new(&settings.ai)?);
    let registry = Arc::new(StepRegistry::catalog()?);

    let background = BackgroundTaskManager::new(&settings.background);
    let background_loop = {
        let background = background.clone();
        tokio::spawn(async move { background.run().await })
    };

    let services = StepServices {
        interpreter,
        rate_limiter: TokenRateLimiter::from_settings(store.clone(), &settings.rate_limit),
        states: StateStorage::new(store, settings.redis.state_ttl(), settings.bot.lock_ttl()),
        transport: transport.clone(),
        background: background.clone(),
        send_queue: settings.transport.send_queue.clone(),
    };
    let orchestrator: Arc<dyn MessageHandler> =
        Arc::new(MessageOrchestrator::new(&settings, domain, registry, services));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("Shutdown signal received");
        shutdown_tx.send_replace(true);
    });

    info!(queue = %settings.transport.receive_queue, "Billy is ready!");
    if let Err(e) = transport
        .consume(&settings.transport.receive_queue, orchestrator, shutdown_rx)
        .await
    {
        error!(error = %e, "Message consumer stopped with an error");
    }

    background.close().await;
    if let Err(e) = background_loop.await {
        error!(error = %e, "Background manager task failed");
    }

    info!("Billy has been shut down.");
    Ok(())
}

async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
