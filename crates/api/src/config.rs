//! Application configuration loaded from environment variables.

use std::time::Duration;

use settlement::{BreakerConfig, RetryPolicy};

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` / `PORT` — bind address (default `0.0.0.0:3000`)
/// - `RUST_LOG` — tracing filter directive (default `"info"`)
/// - `DATABASE_URL` — Postgres; in-memory stores when unset
/// - `AMQP_URL` / `AMQP_EXCHANGE` — event bus; disabled bus when unset
/// - `INVENTORY_SERVICE_URL` — remote inventory; local ledger when unset
/// - `INVENTORY_TIMEOUT_MS` — per-call deadline (default 5000)
/// - `BREAKER_VOLUME_THRESHOLD` / `BREAKER_ERROR_RATE` /
///   `BREAKER_WINDOW_MS` / `BREAKER_RESET_TIMEOUT_MS` — circuit breaker
/// - `RETRY_MAX_ATTEMPTS` / `RETRY_INITIAL_DELAY_MS` /
///   `RETRY_MAX_DELAY_MS` / `RETRY_MULTIPLIER` — backoff schedule
/// - `OUTBOX_INTERVAL_MS` / `OUTBOX_BATCH_SIZE` — relay cadence
/// - `SETTLEMENT_CONCURRENCY` — settlement pool size (default 4)
/// - `IDEMPOTENCY_TTL_HOURS` — idempotency record lifetime (default 24)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,

    pub database_url: Option<String>,
    pub amqp_url: Option<String>,
    pub amqp_exchange: String,
    pub inventory_service_url: Option<String>,

    pub inventory_timeout: Duration,
    pub breaker_volume_threshold: usize,
    pub breaker_error_rate: f64,
    pub breaker_window: Duration,
    pub breaker_reset_timeout: Duration,

    pub retry_max_attempts: u32,
    pub retry_initial_delay: Duration,
    pub retry_max_delay: Duration,
    pub retry_multiplier: u32,

    pub outbox_interval: Duration,
    pub outbox_batch_size: i64,
    pub settlement_concurrency: usize,
    pub idempotency_ttl_hours: i64,
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_ms(name: &str, default_ms: u64) -> Duration {
    Duration::from_millis(env_parse(name, default_ms))
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env_parse("PORT", 3000),
            log_level: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),

            database_url: std::env::var("DATABASE_URL").ok(),
            amqp_url: std::env::var("AMQP_URL").ok(),
            amqp_exchange: std::env::var("AMQP_EXCHANGE")
                .unwrap_or_else(|_| "orders".to_string()),
            inventory_service_url: std::env::var("INVENTORY_SERVICE_URL").ok(),

            inventory_timeout: env_ms("INVENTORY_TIMEOUT_MS", 5000),
            breaker_volume_threshold: env_parse("BREAKER_VOLUME_THRESHOLD", 10),
            breaker_error_rate: env_parse("BREAKER_ERROR_RATE", 0.5),
            breaker_window: env_ms("BREAKER_WINDOW_MS", 60_000),
            breaker_reset_timeout: env_ms("BREAKER_RESET_TIMEOUT_MS", 30_000),

            retry_max_attempts: env_parse("RETRY_MAX_ATTEMPTS", 3),
            retry_initial_delay: env_ms("RETRY_INITIAL_DELAY_MS", 1000),
            retry_max_delay: env_ms("RETRY_MAX_DELAY_MS", 10_000),
            retry_multiplier: env_parse("RETRY_MULTIPLIER", 2),

            outbox_interval: env_ms("OUTBOX_INTERVAL_MS", 5000),
            outbox_batch_size: env_parse("OUTBOX_BATCH_SIZE", 10),
            settlement_concurrency: env_parse("SETTLEMENT_CONCURRENCY", 4),
            idempotency_ttl_hours: env_parse("IDEMPOTENCY_TTL_HOURS", 24),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn breaker_config(&self) -> BreakerConfig {
        BreakerConfig {
            volume_threshold: self.breaker_volume_threshold,
            error_rate_threshold: self.breaker_error_rate,
            window: self.breaker_window,
            reset_timeout: self.breaker_reset_timeout,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_max_attempts,
            initial_delay: self.retry_initial_delay,
            max_delay: self.retry_max_delay,
            multiplier: self.retry_multiplier,
        }
    }

    pub fn idempotency_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.idempotency_ttl_hours)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            database_url: None,
            amqp_url: None,
            amqp_exchange: "orders".to_string(),
            inventory_service_url: None,
            inventory_timeout: Duration::from_millis(5000),
            breaker_volume_threshold: 10,
            breaker_error_rate: 0.5,
            breaker_window: Duration::from_secs(60),
            breaker_reset_timeout: Duration::from_secs(30),
            retry_max_attempts: 3,
            retry_initial_delay: Duration::from_millis(1000),
            retry_max_delay: Duration::from_millis(10_000),
            retry_multiplier: 2,
            outbox_interval: Duration::from_millis(5000),
            outbox_batch_size: 10,
            settlement_concurrency: 4,
            idempotency_ttl_hours: 24,
        }
    }
}
