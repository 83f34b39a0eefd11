use common::ProductId;
use thiserror::Error;

/// Errors produced by inventory ledger operations.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// The product does not exist in the ledger.
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// Not enough available stock to satisfy the request.
    #[error(
        "Insufficient stock for product {product_id}: available {available}, requested {requested}"
    )]
    InsufficientStock {
        product_id: ProductId,
        available: u32,
        requested: u32,
    },

    /// A version-guarded update matched zero rows: a concurrent writer
    /// got there first. The caller should re-read and retry.
    #[error("Stock update conflict for product {product_id}: version changed, re-read and retry")]
    VersionConflict { product_id: ProductId },

    /// The requested quantity is zero or otherwise unusable.
    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Result type for inventory ledger operations.
pub type Result<T> = std::result::Result<T, InventoryError>;
