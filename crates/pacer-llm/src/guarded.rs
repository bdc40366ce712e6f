//! Provider wrapper enforcing the call policy
//!
//! Every call through a [`GuardedProvider`] is subject to the circuit
//! breaker, a per-attempt timeout, and bounded retry of transient failures.

use crate::circuit_breaker::CircuitBreaker;
use crate::completion::{CompletionRequest, CompletionResponse};
use crate::error::{Error, Result};
use crate::policy::ProviderPolicy;
use crate::provider::{ModelProvider, ModelTier};
use crate::retry::retry_with_backoff;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

/// A provider wrapped with timeout, retry and circuit breaker
pub struct GuardedProvider {
    inner: Arc<dyn ModelProvider>,
    policy: ProviderPolicy,
    breaker: CircuitBreaker,
}

impl GuardedProvider {
    /// Wrap a provider with the given policy
    #[must_use]
    pub fn new(inner: Arc<dyn ModelProvider>, policy: ProviderPolicy) -> Self {
        let breaker = CircuitBreaker::new(inner.name().to_string(), policy.circuit.clone());
        Self {
            inner,
            policy,
            breaker,
        }
    }

    /// The applied policy
    #[must_use]
    pub fn policy(&self) -> &ProviderPolicy {
        &self.policy
    }

    /// The provider's circuit breaker
    #[must_use]
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Invoke the provider, aborting when `cancel` fires
    #[instrument(skip(self, request, cancel), fields(provider = %self.inner.name()))]
    pub async fn invoke_cancellable(
        &self,
        request: CompletionRequest,
        cancel: &CancellationToken,
    ) -> Result<CompletionResponse> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let provider = self.inner.name().to_string();
        let timeout = self.policy.timeout;

        let attempts = retry_with_backoff(
            &self.policy.retry,
            |attempt| {
                let request = request.clone();
                let provider = provider.clone();
                async move {
                    if !self.breaker.can_execute() {
                        warn!(provider = %provider, "Circuit open, failing fast");
                        return Err(Error::ProviderCircuitOpen { provider });
                    }

                    debug!(provider = %provider, attempt = attempt, "Invoking provider");
                    let outcome = match tokio::time::timeout(timeout, self.inner.invoke(request))
                        .await
                    {
                        Ok(result) => result,
                        Err(_) => Err(Error::ProviderTimeout {
                            provider: provider.clone(),
                            timeout_ms: timeout.as_millis() as u64,
                        }),
                    };

                    match &outcome {
                        Ok(_) => self.breaker.record_success(),
                        Err(e) if e.trips_breaker() => self.breaker.record_failure(),
                        Err(_) => {}
                    }
                    outcome
                }
            },
            Error::is_transient,
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(provider = %provider, "Provider call cancelled");
                Err(Error::Cancelled)
            }
            result = attempts => result.map_err(|e| e.last_error),
        }
    }
}

#[async_trait::async_trait]
impl ModelProvider for GuardedProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn default_model(&self) -> &str {
        self.inner.default_model()
    }

    fn tier(&self) -> ModelTier {
        self.inner.tier()
    }

    async fn invoke(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        self.invoke_cancellable(request, &CancellationToken::new())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit_breaker::{CircuitBreakerConfig, CircuitState};
    use crate::completion::Message;
    use crate::mock::MockProvider;
    use crate::retry::RetryConfig;
    use std::time::Duration;

    fn fast_retry(attempts: u32) -> RetryConfig {
        RetryConfig::new()
            .with_max_attempts(attempts)
            .with_initial_delay(Duration::from_millis(1))
            .with_jitter(false)
    }

    fn request() -> CompletionRequest {
        CompletionRequest::new().with_message(Message::user("hi"))
    }

    fn unavailable() -> Error {
        Error::ProviderUnavailable {
            provider: "mock".to_string(),
            message: "502".to_string(),
        }
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let mock = Arc::new(MockProvider::new("mock"));
        mock.push(Err(unavailable()));
        mock.push_text("ok");

        let guarded = GuardedProvider::new(
            mock.clone(),
            ProviderPolicy::new().with_retry(fast_retry(3)),
        );

        let response = guarded.invoke(request()).await.unwrap();
        assert_eq!(response.content.as_text(), "ok");
        assert_eq!(mock.invocations(), 2);
    }

    #[tokio::test]
    async fn test_rejection_is_not_retried() {
        let mock = Arc::new(MockProvider::new("mock"));
        mock.push(Err(Error::Rejected {
            provider: "mock".to_string(),
            message: "bad request".to_string(),
        }));

        let guarded = GuardedProvider::new(
            mock.clone(),
            ProviderPolicy::new().with_retry(fast_retry(3)),
        );

        let err = guarded.invoke(request()).await.unwrap_err();
        assert!(matches!(err, Error::Rejected { .. }));
        assert_eq!(mock.invocations(), 1);
        assert_eq!(guarded.breaker().failure_count(), 0);
    }

    #[tokio::test]
    async fn test_attempt_timeout() {
        let mock = Arc::new(MockProvider::new("slow").with_delay(Duration::from_millis(200)));
        let guarded = GuardedProvider::new(
            mock.clone(),
            ProviderPolicy::new()
                .with_timeout(Duration::from_millis(10))
                .with_retry(fast_retry(2)),
        );

        let err = guarded.invoke(request()).await.unwrap_err();
        assert!(matches!(err, Error::ProviderTimeout { timeout_ms: 10, .. }));
        assert_eq!(mock.invocations(), 2);
    }

    #[tokio::test]
    async fn test_open_circuit_fails_fast() {
        let mock = Arc::new(MockProvider::new("mock"));
        mock.push(Err(unavailable()));
        mock.push(Err(unavailable()));

        let guarded = GuardedProvider::new(
            mock.clone(),
            ProviderPolicy::new()
                .with_retry(RetryConfig::none())
                .with_circuit(
                    CircuitBreakerConfig::new()
                        .with_failure_threshold(2)
                        .with_cooldown(Duration::from_secs(60)),
                ),
        );

        assert!(guarded.invoke(request()).await.is_err());
        assert!(guarded.invoke(request()).await.is_err());
        assert_eq!(guarded.breaker().state(), CircuitState::Open);

        let err = guarded.invoke(request()).await.unwrap_err();
        assert!(matches!(err, Error::ProviderCircuitOpen { .. }));
        assert_eq!(mock.invocations(), 2);
    }

    #[tokio::test]
    async fn test_cancellation_aborts_call() {
        let mock = Arc::new(MockProvider::new("slow").with_delay(Duration::from_secs(5)));
        let guarded = GuardedProvider::new(mock, ProviderPolicy::new());

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });

        let err = guarded
            .invoke_cancellable(request(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }
}
