use thiserror::Error;

/// Errors from inventory client calls.
///
/// The split between variants drives both retry and breaker behavior:
/// only `Timeout`, `Connection`, and `Upstream` count as backend failures.
/// `Rejected` is the backend working correctly and saying no.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The call exceeded its deadline.
    #[error("Inventory request timed out")]
    Timeout,

    /// The backend could not be reached.
    #[error("Inventory connection error: {0}")]
    Connection(String),

    /// The breaker is open; the call was not attempted.
    #[error("Inventory circuit breaker is open")]
    CircuitOpen,

    /// The backend failed (5xx).
    #[error("Inventory service error ({status}): {message}")]
    Upstream { status: u16, message: String },

    /// The backend rejected the request (4xx). Never retried.
    #[error("Inventory request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },
}

impl ClientError {
    /// Whether a retry could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClientError::Timeout | ClientError::Connection(_) | ClientError::Upstream { .. }
        )
    }

    /// Whether the breaker should count this as a backend failure.
    pub fn is_backend_failure(&self) -> bool {
        self.is_retryable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejections_and_open_breaker_are_not_retryable() {
        assert!(ClientError::Timeout.is_retryable());
        assert!(ClientError::Connection("refused".into()).is_retryable());
        assert!(
            ClientError::Upstream {
                status: 500,
                message: "boom".into()
            }
            .is_retryable()
        );

        assert!(
            !ClientError::Rejected {
                status: 400,
                message: "insufficient stock".into()
            }
            .is_retryable()
        );
        assert!(!ClientError::CircuitOpen.is_retryable());
    }
}
