//! Per-provider call policy

use crate::circuit_breaker::CircuitBreakerConfig;
use crate::retry::{duration_ms, RetryConfig};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timeout, retry and circuit breaker settings applied to every call of one provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderPolicy {
    /// Timeout of a single attempt
    #[serde(default = "default_timeout", rename = "timeout_ms", with = "duration_ms")]
    pub timeout: Duration,
    /// Retry budget for transient failures
    #[serde(default)]
    pub retry: RetryConfig,
    /// Circuit breaker thresholds
    #[serde(default)]
    pub circuit: CircuitBreakerConfig,
}

fn default_timeout() -> Duration {
    Duration::from_secs(60)
}

impl Default for ProviderPolicy {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            retry: RetryConfig::default(),
            circuit: CircuitBreakerConfig::default(),
        }
    }
}

impl ProviderPolicy {
    /// Create the default policy
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-attempt timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the retry configuration
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Set the circuit breaker configuration
    #[must_use]
    pub fn with_circuit(mut self, circuit: CircuitBreakerConfig) -> Self {
        self.circuit = circuit;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_from_partial_document() {
        let policy: ProviderPolicy = serde_json::from_str(
            r#"{"timeout_ms": 1500, "retry": {"max_attempts": 2}, "circuit": {"failure_threshold": 4}}"#,
        )
        .unwrap();

        assert_eq!(policy.timeout, Duration::from_millis(1500));
        assert_eq!(policy.retry.max_attempts, 2);
        assert_eq!(policy.circuit.failure_threshold, 4);
        assert_eq!(policy.circuit.cooldown, Duration::from_secs(30));
    }

    #[test]
    fn test_policy_defaults() {
        let policy: ProviderPolicy = serde_json::from_str("{}").unwrap();
        assert_eq!(policy, ProviderPolicy::default());
        assert_eq!(policy.timeout, Duration::from_secs(60));
    }
}
