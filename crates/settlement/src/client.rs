//! Inventory clients: HTTP, in-process, and the resilient wrapper.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::OrderId;
use inventory::{InventoryError, InventoryLedger, StockDeduction};
use serde::Serialize;

use crate::breaker::CircuitBreaker;
use crate::error::ClientError;
use crate::retry::RetryPolicy;

/// Deducts stock for an order. The whole order succeeds or fails as one
/// unit; callers never see partial deductions.
#[async_trait]
pub trait InventoryClient: Send + Sync {
    async fn deduct(&self, order_id: OrderId, items: &[StockDeduction]) -> Result<(), ClientError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DeductRequest<'a> {
    order_id: OrderId,
    items: &'a [StockDeduction],
}

/// Client for a remote inventory service.
pub struct HttpInventoryClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpInventoryClient {
    /// Builds a client with a per-request deadline.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Connection(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl InventoryClient for HttpInventoryClient {
    async fn deduct(&self, order_id: OrderId, items: &[StockDeduction]) -> Result<(), ClientError> {
        let url = format!("{}/inventory/update", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&DeductRequest { order_id, items })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ClientError::Timeout
                } else {
                    ClientError::Connection(e.to_string())
                }
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "no response body".to_string());
        if status.is_client_error() {
            Err(ClientError::Rejected {
                status: status.as_u16(),
                message,
            })
        } else {
            Err(ClientError::Upstream {
                status: status.as_u16(),
                message,
            })
        }
    }
}

/// In-process client over the local ledger, for deployments without a
/// separate inventory service.
pub struct LocalInventoryClient {
    ledger: Arc<dyn InventoryLedger>,
}

impl LocalInventoryClient {
    pub fn new(ledger: Arc<dyn InventoryLedger>) -> Self {
        Self { ledger }
    }
}

#[async_trait]
impl InventoryClient for LocalInventoryClient {
    async fn deduct(&self, order_id: OrderId, items: &[StockDeduction]) -> Result<(), ClientError> {
        self.ledger.deduct(order_id, items).await.map_err(|e| match e {
            InventoryError::InsufficientStock { .. } | InventoryError::InvalidQuantity(_) => {
                ClientError::Rejected {
                    status: 400,
                    message: e.to_string(),
                }
            }
            InventoryError::ProductNotFound(_) => ClientError::Rejected {
                status: 404,
                message: e.to_string(),
            },
            InventoryError::VersionConflict { .. } => ClientError::Rejected {
                status: 409,
                message: e.to_string(),
            },
            InventoryError::Database(_) => ClientError::Upstream {
                status: 500,
                message: e.to_string(),
            },
        })
    }
}

/// Wraps a client with the circuit breaker and retry policy.
///
/// The breaker gates every attempt, including retries, so an open breaker
/// fails the call immediately instead of burning the retry budget.
/// Rejections count as breaker successes: the backend answered.
pub struct ResilientInventoryClient {
    inner: Arc<dyn InventoryClient>,
    breaker: Arc<CircuitBreaker>,
    retry: RetryPolicy,
}

impl ResilientInventoryClient {
    pub fn new(
        inner: Arc<dyn InventoryClient>,
        breaker: Arc<CircuitBreaker>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            inner,
            breaker,
            retry,
        }
    }
}

#[async_trait]
impl InventoryClient for ResilientInventoryClient {
    async fn deduct(&self, order_id: OrderId, items: &[StockDeduction]) -> Result<(), ClientError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            self.breaker.try_acquire()?;

            match self.inner.deduct(order_id, items).await {
                Ok(()) => {
                    self.breaker.record_success();
                    return Ok(());
                }
                Err(e) if e.is_backend_failure() => {
                    self.breaker.record_failure();
                    metrics::counter!("inventory_call_failures_total").increment(1);
                    if !self.retry.allows_retry(attempt) {
                        tracing::warn!(%order_id, attempt, error = %e, "inventory deduction exhausted retries");
                        return Err(e);
                    }
                    let delay = self.retry.delay_for(attempt);
                    tracing::warn!(
                        %order_id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "inventory deduction failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    self.breaker.record_success();
                    return Err(e);
                }
            }
        }
    }
}
