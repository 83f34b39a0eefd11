//! Idempotency log entries and request fingerprinting.

use chrono::{DateTime, Duration, Utc};
use common::IdempotencyKey;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// The response captured for replay: status code plus the exact body the
/// first request returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredResponse {
    pub status: u16,
    pub payload: serde_json::Value,
}

/// One entry in the idempotency log.
#[derive(Debug, Clone, PartialEq)]
pub struct IdempotencyRecord {
    pub key: IdempotencyKey,
    /// Fingerprint of the request body, so a reused key with a different
    /// body can be detected.
    pub request_hash: String,
    pub response: StoredResponse,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl IdempotencyRecord {
    /// Builds a record expiring `ttl` from now.
    pub fn new(
        key: IdempotencyKey,
        request_hash: String,
        response: StoredResponse,
        ttl: Duration,
    ) -> Self {
        let now = Utc::now();
        Self {
            key,
            request_hash,
            response,
            created_at: now,
            expires_at: now + ttl,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }
}

/// SHA-256 fingerprint of a canonicalized request body.
pub fn request_hash(body: &serde_json::Value) -> String {
    let canonical = serde_json::to_string(body).unwrap_or_default();
    hex::encode(Sha256::digest(canonical.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_stable_for_equal_bodies() {
        let a = serde_json::json!({"customerId": "c-1", "items": [{"productId": "p"}]});
        let b = serde_json::json!({"customerId": "c-1", "items": [{"productId": "p"}]});
        assert_eq!(request_hash(&a), request_hash(&b));
    }

    #[test]
    fn hash_differs_for_different_bodies() {
        let a = serde_json::json!({"quantity": 1});
        let b = serde_json::json!({"quantity": 2});
        assert_ne!(request_hash(&a), request_hash(&b));
    }

    #[test]
    fn record_expiry() {
        let fresh = IdempotencyRecord::new(
            IdempotencyKey::new("k"),
            "h".to_string(),
            StoredResponse {
                status: 201,
                payload: serde_json::json!({}),
            },
            Duration::hours(24),
        );
        assert!(!fresh.is_expired());

        let mut stale = fresh.clone();
        stale.expires_at = Utc::now() - Duration::seconds(1);
        assert!(stale.is_expired());
    }
}
