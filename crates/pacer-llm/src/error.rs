//! Error types for pacer-llm

use thiserror::Error;

/// Model provider error type
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Provider not configured
    #[error("provider not configured: {0}")]
    NotConfigured(String),

    /// A single attempt exceeded the provider timeout
    #[error("provider '{provider}' timed out after {timeout_ms}ms")]
    ProviderTimeout {
        /// Provider name
        provider: String,
        /// Timeout that elapsed
        timeout_ms: u64,
    },

    /// Backend unreachable or answered with a server-side failure
    #[error("provider '{provider}' unavailable: {message}")]
    ProviderUnavailable {
        /// Provider name
        provider: String,
        /// Detail from the transport or backend
        message: String,
    },

    /// Backend signalled a rate limit
    #[error("provider '{provider}' rate limited")]
    RateLimited {
        /// Provider name
        provider: String,
        /// Seconds until retry is allowed, when the backend said so
        retry_after: Option<u64>,
    },

    /// Circuit breaker is open for this provider
    #[error("provider '{provider}' circuit open, failing fast")]
    ProviderCircuitOpen {
        /// Provider name
        provider: String,
    },

    /// Backend rejected the request (4xx other than rate limiting)
    #[error("provider '{provider}' rejected request: {message}")]
    Rejected {
        /// Provider name
        provider: String,
        /// Backend message
        message: String,
    },

    /// Response could not be interpreted
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Call was cancelled by the caller
    #[error("provider call cancelled")]
    Cancelled,
}

impl Error {
    /// Whether the failure is transient and worth retrying
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::ProviderTimeout { .. } | Error::ProviderUnavailable { .. } | Error::RateLimited { .. }
        )
    }

    /// Whether the failure should count against the provider's circuit breaker
    #[must_use]
    pub fn trips_breaker(&self) -> bool {
        self.is_transient()
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
