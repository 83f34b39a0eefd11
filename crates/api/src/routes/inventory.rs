//! Inventory read and mutation endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use common::{OrderId, ProductId};
use inventory::{InventoryItem, InventoryLedger, InventoryTransaction, StockDeduction};
use orders::{IdempotencyStore, OrderStore};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;
use crate::routes::orders::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListInventoryParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProductRequest {
    pub product_id: ProductId,
    pub product_name: String,
    pub initial_stock: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStockRequest {
    pub order_id: Uuid,
    pub items: Vec<StockDeduction>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStockResponse {
    pub order_id: Uuid,
    pub items_deducted: usize,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReserveRequest {
    pub product_id: ProductId,
    pub quantity: u32,
    pub order_id: Uuid,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestockRequest {
    pub product_id: ProductId,
    pub quantity: u32,
}

/// POST /inventory — create a product with an initial stock level.
#[tracing::instrument(skip(state, req))]
pub async fn create<O, I, L>(
    State(state): State<Arc<AppState<O, I, L>>>,
    Json(req): Json<CreateProductRequest>,
) -> Result<(StatusCode, Json<InventoryItem>), ApiError>
where
    O: OrderStore + 'static,
    I: IdempotencyStore + 'static,
    L: InventoryLedger + 'static,
{
    let item = state
        .ledger
        .create_product(&req.product_id, &req.product_name, req.initial_stock)
        .await
        .map_err(ApiError::from)?;
    Ok((StatusCode::CREATED, Json(item)))
}

/// GET /inventory/{productId} — stock snapshot.
#[tracing::instrument(skip(state))]
pub async fn get<O, I, L>(
    State(state): State<Arc<AppState<O, I, L>>>,
    Path(product_id): Path<String>,
) -> Result<Json<InventoryItem>, ApiError>
where
    O: OrderStore + 'static,
    I: IdempotencyStore + 'static,
    L: InventoryLedger + 'static,
{
    let product_id = ProductId::new(product_id);
    state
        .ledger
        .get(&product_id)
        .await
        .map_err(ApiError::from)?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Product not found: {product_id}")))
}

/// GET /inventory — products ordered by name.
#[tracing::instrument(skip(state))]
pub async fn list<O, I, L>(
    State(state): State<Arc<AppState<O, I, L>>>,
    Query(params): Query<ListInventoryParams>,
) -> Result<Json<Vec<InventoryItem>>, ApiError>
where
    O: OrderStore + 'static,
    I: IdempotencyStore + 'static,
    L: InventoryLedger + 'static,
{
    let page = state
        .ledger
        .list(
            params.limit.unwrap_or(50).clamp(1, 200),
            params.offset.unwrap_or(0).max(0),
        )
        .await
        .map_err(ApiError::from)?;
    Ok(Json(page))
}

/// POST /inventory/update — all-or-nothing stock deduction for an order.
#[tracing::instrument(skip(state, req))]
pub async fn update<O, I, L>(
    State(state): State<Arc<AppState<O, I, L>>>,
    Json(req): Json<UpdateStockRequest>,
) -> Result<Json<UpdateStockResponse>, ApiError>
where
    O: OrderStore + 'static,
    I: IdempotencyStore + 'static,
    L: InventoryLedger + 'static,
{
    if req.items.is_empty() {
        return Err(ApiError::BadRequest("items must not be empty".to_string()));
    }

    state
        .ledger
        .deduct(OrderId::from_uuid(req.order_id), &req.items)
        .await
        .map_err(ApiError::from)?;

    Ok(Json(UpdateStockResponse {
        order_id: req.order_id,
        items_deducted: req.items.len(),
    }))
}

/// POST /inventory/reserve — move available stock to reserved.
#[tracing::instrument(skip(state, req))]
pub async fn reserve<O, I, L>(
    State(state): State<Arc<AppState<O, I, L>>>,
    Json(req): Json<ReserveRequest>,
) -> Result<Json<InventoryItem>, ApiError>
where
    O: OrderStore + 'static,
    I: IdempotencyStore + 'static,
    L: InventoryLedger + 'static,
{
    let item = state
        .ledger
        .reserve(&req.product_id, req.quantity, OrderId::from_uuid(req.order_id))
        .await
        .map_err(ApiError::from)?;
    Ok(Json(item))
}

/// POST /inventory/restock — add stock.
#[tracing::instrument(skip(state, req))]
pub async fn restock<O, I, L>(
    State(state): State<Arc<AppState<O, I, L>>>,
    Json(req): Json<RestockRequest>,
) -> Result<Json<InventoryItem>, ApiError>
where
    O: OrderStore + 'static,
    I: IdempotencyStore + 'static,
    L: InventoryLedger + 'static,
{
    let item = state
        .ledger
        .restock(&req.product_id, req.quantity)
        .await
        .map_err(ApiError::from)?;
    Ok(Json(item))
}

/// GET /inventory/{productId}/transactions — audit trail, newest first.
#[tracing::instrument(skip(state))]
pub async fn transactions<O, I, L>(
    State(state): State<Arc<AppState<O, I, L>>>,
    Path(product_id): Path<String>,
) -> Result<Json<Vec<InventoryTransaction>>, ApiError>
where
    O: OrderStore + 'static,
    I: IdempotencyStore + 'static,
    L: InventoryLedger + 'static,
{
    let product_id = ProductId::new(product_id);
    if state.ledger.get(&product_id).await.map_err(ApiError::from)?.is_none() {
        return Err(ApiError::NotFound(format!("Product not found: {product_id}")));
    }
    let trail = state
        .ledger
        .transactions_for(&product_id)
        .await
        .map_err(ApiError::from)?;
    Ok(Json(trail))
}
