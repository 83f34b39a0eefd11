//! API server entry point.

use std::sync::Arc;

use api::config::Config;
use api::routes::orders::AppState;
use inventory::{InventoryLedger, PostgresLedger};
use orders::{IdempotencyStore, OrderStore, PostgresIdempotencyStore, PostgresOrderStore};
use outbox::{
    AmqpConfig, AmqpEventBus, DisabledEventBus, EventBus, OutboxRelay, OutboxStore, PostgresOutbox,
};
use settlement::{HttpInventoryClient, InventoryClient, LocalInventoryClient};
use sqlx::PgPool;
use tokio::signal;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

async fn make_bus(config: &Config) -> Arc<dyn EventBus> {
    match &config.amqp_url {
        Some(url) => {
            let bus = AmqpEventBus::connect(AmqpConfig {
                url: url.clone(),
                exchange: config.amqp_exchange.clone(),
            })
            .await
            .expect("failed to connect to AMQP");
            Arc::new(bus)
        }
        None => {
            tracing::warn!("AMQP_URL not set, outbox events will stay unpublished");
            Arc::new(DisabledEventBus::new())
        }
    }
}

fn make_base_client(
    config: &Config,
    ledger: Arc<dyn InventoryLedger>,
) -> Arc<dyn InventoryClient> {
    match &config.inventory_service_url {
        Some(url) => {
            tracing::info!(%url, "using remote inventory service");
            Arc::new(
                HttpInventoryClient::new(url.clone(), config.inventory_timeout)
                    .expect("failed to build inventory HTTP client"),
            )
        }
        None => Arc::new(LocalInventoryClient::new(ledger)),
    }
}

/// Serves the app and drives the outbox relay until shutdown.
async fn serve<O, I, L, S>(
    config: Config,
    state: Arc<AppState<O, I, L>>,
    relay: OutboxRelay<S>,
    metrics_handle: metrics_exporter_prometheus::PrometheusHandle,
) where
    O: OrderStore + 'static,
    I: IdempotencyStore + 'static,
    L: InventoryLedger + 'static,
    S: OutboxStore + 'static,
{
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let relay_handle = tokio::spawn(relay.run(shutdown_rx));

    let app = api::create_app(state, metrics_handle);
    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    shutdown_tx.send(true).expect("relay already stopped");
    relay_handle.await.expect("relay task panicked");
    tracing::info!("server shut down gracefully");
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone())),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    let bus = make_bus(&config).await;

    match config.database_url.clone() {
        Some(url) => {
            let pool = PgPool::connect(&url)
                .await
                .expect("failed to connect to Postgres");
            sqlx::raw_sql(include_str!("../../../migrations/0001_initial_schema.sql"))
                .execute(&pool)
                .await
                .expect("failed to apply schema");
            tracing::info!("connected to Postgres");

            let orders = Arc::new(PostgresOrderStore::new(pool.clone()));
            let idempotency = Arc::new(PostgresIdempotencyStore::new(pool.clone()));
            let ledger = Arc::new(PostgresLedger::new(pool.clone()));
            let outbox_store = Arc::new(PostgresOutbox::new(pool));

            let client = make_base_client(&config, ledger.clone());
            let state = api::build_state(&config, orders, idempotency, ledger, client);
            let relay = OutboxRelay::new(
                outbox_store,
                bus,
                config.outbox_interval,
                config.outbox_batch_size,
            );
            serve(config, state, relay, metrics_handle).await;
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory stores");
            let (state, outbox) = api::create_memory_state(&config);
            let relay = OutboxRelay::new(
                Arc::new(outbox),
                bus,
                config.outbox_interval,
                config.outbox_batch_size,
            );
            serve(config, state, relay, metrics_handle).await;
        }
    }
}
