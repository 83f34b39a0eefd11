//! HTTP API server for the order fulfillment pipeline.
//!
//! Wires order intake, the inventory ledger, and the settlement
//! coordinator behind REST endpoints, with structured logging (tracing)
//! and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use inventory::{InMemoryLedger, InventoryLedger};
use metrics_exporter_prometheus::PrometheusHandle;
use orders::{
    IdempotencyStore, InMemoryIdempotencyStore, InMemoryOrderStore, OrderStore, OrderWriter,
};
use outbox::InMemoryOutbox;
use settlement::{
    CircuitBreaker, InventoryClient, LocalInventoryClient, ResilientInventoryClient,
    SettlementCoordinator,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use routes::orders::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<O, I, L>(
    state: Arc<AppState<O, I, L>>,
    metrics_handle: PrometheusHandle,
) -> Router
where
    O: OrderStore + 'static,
    I: IdempotencyStore + 'static,
    L: InventoryLedger + 'static,
{
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/orders", post(routes::orders::create::<O, I, L>))
        .route("/orders", get(routes::orders::list::<O, I, L>))
        .route("/orders/{id}", get(routes::orders::get::<O, I, L>))
        .route("/inventory", post(routes::inventory::create::<O, I, L>))
        .route("/inventory", get(routes::inventory::list::<O, I, L>))
        .route("/inventory/update", post(routes::inventory::update::<O, I, L>))
        .route("/inventory/reserve", post(routes::inventory::reserve::<O, I, L>))
        .route("/inventory/restock", post(routes::inventory::restock::<O, I, L>))
        .route("/inventory/{id}", get(routes::inventory::get::<O, I, L>))
        .route(
            "/inventory/{id}/transactions",
            get(routes::inventory::transactions::<O, I, L>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Assembles the application state around the given stores and the base
/// inventory client, layering the circuit breaker and retry policy on top.
pub fn build_state<O, I, L>(
    config: &Config,
    orders: Arc<O>,
    idempotency: Arc<I>,
    ledger: Arc<L>,
    client: Arc<dyn InventoryClient>,
) -> Arc<AppState<O, I, L>>
where
    O: OrderStore + 'static,
    I: IdempotencyStore + 'static,
    L: InventoryLedger + 'static,
{
    let breaker = Arc::new(CircuitBreaker::new(config.breaker_config()));
    let resilient: Arc<dyn InventoryClient> = Arc::new(ResilientInventoryClient::new(
        client,
        breaker,
        config.retry_policy(),
    ));
    let coordinator = Arc::new(SettlementCoordinator::new(
        orders.clone(),
        resilient,
        config.settlement_concurrency,
    ));
    let writer = OrderWriter::new(orders.clone(), idempotency, config.idempotency_ttl());

    Arc::new(AppState {
        writer,
        orders,
        ledger,
        coordinator,
    })
}

/// In-memory application state for tests and broker-less deployments.
/// Returns the shared outbox handle so the caller can wire a relay to it.
pub fn create_memory_state(
    config: &Config,
) -> (
    Arc<AppState<InMemoryOrderStore, InMemoryIdempotencyStore, InMemoryLedger>>,
    InMemoryOutbox,
) {
    let outbox = InMemoryOutbox::new();
    let orders = Arc::new(InMemoryOrderStore::new(outbox.clone()));
    let idempotency = Arc::new(InMemoryIdempotencyStore::new());
    let ledger = Arc::new(InMemoryLedger::new());
    let client: Arc<dyn InventoryClient> = Arc::new(LocalInventoryClient::new(ledger.clone()));

    let state = build_state(config, orders, idempotency, ledger, client);
    (state, outbox)
}
