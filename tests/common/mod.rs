//! Common test utilities
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::{Executor, PgPool};
use tokio::task::JoinHandle;

use balance_ledger::api::AppState;
use balance_ledger::bus::InMemoryBus;
use balance_ledger::dispatcher::CommandDispatcher;
use balance_ledger::handlers::{CommandConsumer, CommandHandlers};
use balance_ledger::router::FanOutRouter;
use balance_ledger::shutdown::{self, Shutdown, ShutdownTrigger};
use balance_ledger::store::{InMemoryBalanceStore, InMemoryLedgerStore};
use balance_ledger::Topic;

/// The full in-process pipeline over the in-memory bus and stores
pub struct Pipeline {
    pub bus: InMemoryBus,
    pub balances: InMemoryBalanceStore,
    pub ledger: InMemoryLedgerStore,
    pub router: Arc<FanOutRouter>,
    pub consumer: Arc<CommandConsumer>,
    trigger: ShutdownTrigger,
    tasks: Vec<JoinHandle<()>>,
}

impl Pipeline {
    /// Start the router and a single-worker consumer
    pub fn start() -> Self {
        Self::start_with(|_, _| {})
    }

    /// Start the pipeline; `register` may add extra subscribers before the
    /// router loop begins reading
    pub fn start_with(register: impl FnOnce(&FanOutRouter, &Shutdown)) -> Self {
        let bus = InMemoryBus::new();
        let balances = InMemoryBalanceStore::new();
        let ledger = InMemoryLedgerStore::new();
        let (trigger, shutdown) = shutdown::channel();

        let router = Arc::new(
            FanOutRouter::new(64).with_read_error_backoff(Duration::from_millis(5)),
        );
        let handlers = CommandHandlers::new(Arc::new(balances.clone()), Arc::new(ledger.clone()));
        let consumer = Arc::new(CommandConsumer::new(handlers, router.register(Topic::ALL)));
        register(&router, &shutdown);

        let mut tasks = consumer.clone().start(shutdown.clone());
        tasks.push({
            let router = router.clone();
            let bus = bus.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                router.run(&bus, shutdown).await;
            })
        });

        Self {
            bus,
            balances,
            ledger,
            router,
            consumer,
            trigger,
            tasks,
        }
    }

    pub fn dispatcher(&self) -> CommandDispatcher {
        CommandDispatcher::new(Arc::new(self.bus.clone()))
    }

    pub fn app_state(&self) -> AppState {
        AppState {
            dispatcher: self.dispatcher(),
            balances: Arc::new(self.balances.clone()),
            ledger: Arc::new(self.ledger.clone()),
        }
    }

    /// Wait until the consumer has carried `expected` messages to a terminal state
    pub async fn wait_for_processed(&self, expected: u64) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.consumer.stats().processed < expected {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("pipeline did not process messages in time");
    }

    /// Cancel and join every pipeline task
    pub async fn stop(self) {
        self.trigger.cancel();
        for task in self.tasks {
            tokio::time::timeout(Duration::from_secs(5), task)
                .await
                .expect("pipeline task did not stop")
                .expect("pipeline task panicked");
        }
    }
}

/// Setup test database - apply the schema and truncate every table
pub async fn setup_test_db() -> PgPool {
    dotenvy::dotenv().ok();
    let database_url = std::env::var("DATABASE_URL")
        .expect("DATABASE_URL must be set for tests");

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("Failed to connect to DB");

    pool.execute(include_str!("../../migrations/001_initial_schema.sql"))
        .await
        .expect("Failed to apply schema");

    sqlx::query(
        "TRUNCATE TABLE user_balances, bus_messages, bus_consumer_offsets, ledger_records RESTART IDENTITY",
    )
    .execute(&pool)
    .await
    .expect("Failed to clean up DB");

    pool
}
