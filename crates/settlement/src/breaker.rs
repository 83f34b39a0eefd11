//! Circuit breaker guarding the inventory backend.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::ClientError;

/// Breaker tuning.
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Minimum calls in the window before the error rate is evaluated.
    pub volume_threshold: usize,
    /// Failure fraction at or above which the breaker opens.
    pub error_rate_threshold: f64,
    /// Rolling window over which outcomes are counted.
    pub window: Duration,
    /// How long the breaker stays open before allowing a trial call.
    pub reset_timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            volume_threshold: 10,
            error_rate_threshold: 0.5,
            window: Duration::from_secs(60),
            reset_timeout: Duration::from_secs(30),
        }
    }
}

/// Observable breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for BreakerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            BreakerState::Closed => "CLOSED",
            BreakerState::Open => "OPEN",
            BreakerState::HalfOpen => "HALF_OPEN",
        })
    }
}

#[derive(Debug)]
enum Inner {
    Closed,
    Open { since: Instant },
    HalfOpen { trial_in_flight: bool },
}

#[derive(Debug)]
struct State {
    inner: Inner,
    /// Recent call outcomes: (when, failed).
    window: VecDeque<(Instant, bool)>,
}

/// CLOSED / OPEN / HALF_OPEN circuit breaker with a rolling error window.
///
/// Opens when, with at least `volume_threshold` calls in the window, the
/// failure fraction reaches `error_rate_threshold`. After `reset_timeout`
/// a single trial call is let through; its outcome closes or reopens the
/// breaker. Rejections by a healthy backend are recorded as successes by
/// the caller, only backend failures count against the breaker.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: BreakerConfig,
    state: Mutex<State>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            state: Mutex::new(State {
                inner: Inner::Closed,
                window: VecDeque::new(),
            }),
        }
    }

    /// Gate before a call. `Err(CircuitOpen)` means the call must not be
    /// attempted. `Ok` while half-open claims the single trial slot.
    pub fn try_acquire(&self) -> Result<(), ClientError> {
        let mut state = self.state.lock().expect("breaker lock poisoned");
        match state.inner {
            Inner::Closed => Ok(()),
            Inner::Open { since } => {
                if since.elapsed() >= self.config.reset_timeout {
                    state.inner = Inner::HalfOpen {
                        trial_in_flight: true,
                    };
                    tracing::info!("circuit breaker half-open, allowing trial call");
                    Ok(())
                } else {
                    Err(ClientError::CircuitOpen)
                }
            }
            Inner::HalfOpen {
                ref mut trial_in_flight,
            } => {
                if *trial_in_flight {
                    Err(ClientError::CircuitOpen)
                } else {
                    *trial_in_flight = true;
                    Ok(())
                }
            }
        }
    }

    /// Records a successful (or cleanly rejected) call.
    pub fn record_success(&self) {
        let mut state = self.state.lock().expect("breaker lock poisoned");
        match state.inner {
            Inner::HalfOpen { .. } => {
                state.inner = Inner::Closed;
                state.window.clear();
                metrics::counter!("circuit_breaker_closed_total").increment(1);
                tracing::info!("circuit breaker closed after successful trial");
            }
            Inner::Closed => {
                state.window.push_back((Instant::now(), false));
                self.evict_old(&mut state);
            }
            Inner::Open { .. } => {}
        }
    }

    /// Records a backend failure.
    pub fn record_failure(&self) {
        let mut state = self.state.lock().expect("breaker lock poisoned");
        match state.inner {
            Inner::HalfOpen { .. } => {
                state.inner = Inner::Open {
                    since: Instant::now(),
                };
                metrics::counter!("circuit_breaker_opened_total").increment(1);
                tracing::warn!("circuit breaker reopened after failed trial");
            }
            Inner::Closed => {
                state.window.push_back((Instant::now(), true));
                self.evict_old(&mut state);

                let total = state.window.len();
                let failures = state.window.iter().filter(|(_, failed)| *failed).count();
                if total >= self.config.volume_threshold
                    && failures as f64 / total as f64 >= self.config.error_rate_threshold
                {
                    state.inner = Inner::Open {
                        since: Instant::now(),
                    };
                    metrics::counter!("circuit_breaker_opened_total").increment(1);
                    tracing::warn!(
                        failures,
                        total,
                        "circuit breaker opened, failing fast"
                    );
                }
            }
            Inner::Open { .. } => {}
        }
    }

    /// Current state for health reporting.
    pub fn current_state(&self) -> BreakerState {
        let state = self.state.lock().expect("breaker lock poisoned");
        match state.inner {
            Inner::Closed => BreakerState::Closed,
            // Reported as open until a trial call claims the half-open slot.
            Inner::Open { .. } => BreakerState::Open,
            Inner::HalfOpen { .. } => BreakerState::HalfOpen,
        }
    }

    fn evict_old(&self, state: &mut State) {
        let Some(cutoff) = Instant::now().checked_sub(self.config.window) else {
            return;
        };
        while let Some(&(at, _)) = state.window.front() {
            if at < cutoff {
                state.window.pop_front();
            } else {
                break;
            }
        }
    }
}
