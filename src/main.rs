//! balance_ledger - asynchronous balance ledger service
//!
//! Accepts balance commands over HTTP, publishes them on the bus, and applies
//! them to the balance store and then the ledger store.

use std::net::SocketAddr;
use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use balance_ledger::api::{self, AppState};
use balance_ledger::bus::{BusClient, PgBus};
use balance_ledger::dispatcher::CommandDispatcher;
use balance_ledger::handlers::{CommandConsumer, CommandHandlers};
use balance_ledger::jobs::ReconciliationJob;
use balance_ledger::router::FanOutRouter;
use balance_ledger::store::{BalanceStore, LedgerStore, PgBalanceStore, PgLedgerStore};
use balance_ledger::{db, shutdown, Config, Topic};

/// Initialize tracing/logging
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "balance_ledger=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn connect(url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(url)
        .await
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    init_tracing();

    let config = Config::from_env()?;
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    tracing::info!(environment = %config.environment, "Starting balance_ledger server");
    tracing::info!("Connecting to database...");

    let pool = connect(&config.database_url, config.database_max_connections).await?;
    let ledger_pool = if config.has_separate_ledger_database() {
        tracing::info!("Connecting to ledger database...");
        connect(&config.ledger_database_url, config.database_max_connections).await?
    } else {
        pool.clone()
    };

    if !db::check_schema(&pool, db::BALANCE_TABLES).await?
        || !db::check_schema(&ledger_pool, db::LEDGER_TABLES).await?
    {
        tracing::error!("Database schema is not complete. Please run migrations.");
        return Err(anyhow::anyhow!("Database schema incomplete"));
    }

    tracing::info!("Database connected successfully");

    let bus: Arc<dyn BusClient> = Arc::new(PgBus::with_config(pool.clone(), config.bus_config()));
    let balances: Arc<dyn BalanceStore> = Arc::new(PgBalanceStore::new(pool.clone()));
    let ledger: Arc<dyn LedgerStore> = Arc::new(PgLedgerStore::new(ledger_pool.clone()));

    let (trigger, shutdown) = shutdown::channel();

    // Pipeline: bus -> router -> subscriber queue -> handler workers
    let router = Arc::new(
        FanOutRouter::new(config.subscriber_queue_capacity)
            .with_read_error_backoff(config.bus_read_backoff),
    );
    let queue = router.register(Topic::ALL);
    let consumer = Arc::new(
        CommandConsumer::new(CommandHandlers::new(balances.clone(), ledger.clone()), queue)
            .with_workers(config.handler_workers),
    );
    let mut tasks = consumer.clone().start(shutdown.clone());

    tasks.push({
        let router = router.clone();
        let bus = bus.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move { router.run(bus.as_ref(), shutdown).await })
    });

    if let Some(interval) = config.reconcile_interval {
        tasks.push(
            ReconciliationJob::new(balances.clone(), ledger.clone(), interval)
                .start(shutdown.clone()),
        );
    }

    let app = api::build_app(AppState {
        dispatcher: CommandDispatcher::new(bus.clone()),
        balances,
        ledger,
    });

    tracing::info!("Listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Cleanup
    tracing::info!("Server shutting down...");
    trigger.cancel();
    for task in tasks {
        if let Err(e) = task.await {
            tracing::warn!(error = %e, "Background task ended abnormally");
        }
    }
    tracing::info!(
        router = ?router.stats(),
        consumer = ?consumer.stats(),
        "Pipeline stopped"
    );

    pool.close().await;
    ledger_pool.close().await;
    tracing::info!("Database connections closed. Goodbye!");

    Ok(())
}

/// Shutdown signal handler for graceful shutdown
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}
