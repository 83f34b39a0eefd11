//! Order intake and read endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use common::{CustomerId, OrderId};
use inventory::InventoryLedger;
use orders::{IdempotencyStore, NewOrder, Order, OrderStore, OrderWriter};
use serde::Deserialize;
use settlement::SettlementCoordinator;
use uuid::Uuid;

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<O, I, L> {
    pub writer: OrderWriter<O, I>,
    pub orders: Arc<O>,
    pub ledger: Arc<L>,
    pub coordinator: Arc<SettlementCoordinator<O>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListOrdersParams {
    pub customer_id: Uuid,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// POST /orders — accept an order, idempotent by client-supplied key.
///
/// Returns 201 with the order snapshot. A retry with the same key gets
/// the stored response back unchanged and triggers no new settlement.
#[tracing::instrument(skip(state, req))]
pub async fn create<O, I, L>(
    State(state): State<Arc<AppState<O, I, L>>>,
    Json(req): Json<NewOrder>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError>
where
    O: OrderStore + 'static,
    I: IdempotencyStore + 'static,
    L: InventoryLedger + 'static,
{
    let outcome = state
        .writer
        .create(req)
        .await
        .map_err(ApiError::from)?;

    let status = StatusCode::from_u16(outcome.response.status)
        .map_err(|_| ApiError::Internal("stored an invalid status code".to_string()))?;

    if !outcome.replayed {
        if let Some(order) = state.orders.get(outcome.order_id).await.map_err(ApiError::from)? {
            state.coordinator.submit(order);
        }
    }

    Ok((status, Json(outcome.response.payload)))
}

/// GET /orders/{id} — order snapshot including items.
#[tracing::instrument(skip(state))]
pub async fn get<O, I, L>(
    State(state): State<Arc<AppState<O, I, L>>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>, ApiError>
where
    O: OrderStore + 'static,
    I: IdempotencyStore + 'static,
    L: InventoryLedger + 'static,
{
    let order_id = OrderId::from_uuid(id);
    state
        .orders
        .get(order_id)
        .await
        .map_err(ApiError::from)?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Order not found: {order_id}")))
}

/// GET /orders?customerId= — a customer's orders, newest first.
#[tracing::instrument(skip(state))]
pub async fn list<O, I, L>(
    State(state): State<Arc<AppState<O, I, L>>>,
    Query(params): Query<ListOrdersParams>,
) -> Result<Json<Vec<Order>>, ApiError>
where
    O: OrderStore + 'static,
    I: IdempotencyStore + 'static,
    L: InventoryLedger + 'static,
{
    let page = state
        .orders
        .list_for_customer(
            CustomerId::from_uuid(params.customer_id),
            params.limit.unwrap_or(50).clamp(1, 200),
            params.offset.unwrap_or(0).max(0),
        )
        .await
        .map_err(ApiError::from)?;
    Ok(Json(page))
}
