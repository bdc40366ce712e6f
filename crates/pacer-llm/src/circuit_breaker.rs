//! Circuit breaker for model providers
//!
//! Stops issuing calls to a backend after a burst of consecutive failures.
//! The circuit has three states:
//! - Closed: Normal operation, calls pass through
//! - Open: Failure threshold reached, calls fail fast until the cooldown elapses
//! - HalfOpen: Cooldown elapsed, trial calls decide whether to close or reopen

use crate::retry::duration_ms;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation - calls pass through
    Closed,
    /// Failures exceeded threshold - calls are rejected
    Open,
    /// Testing recovery - trial calls pass through
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "Closed"),
            Self::Open => write!(f, "Open"),
            Self::HalfOpen => write!(f, "HalfOpen"),
        }
    }
}

/// Configuration for circuit breaker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening the circuit
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// Successes in half-open state needed to close the circuit
    #[serde(default = "default_success_threshold")]
    pub success_threshold: u32,
    /// Cooldown before an open circuit lets a trial call through
    #[serde(default = "default_cooldown", with = "duration_ms")]
    pub cooldown: Duration,
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_success_threshold() -> u32 {
    1
}

fn default_cooldown() -> Duration {
    Duration::from_secs(30)
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            success_threshold: default_success_threshold(),
            cooldown: default_cooldown(),
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a new configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set failure threshold
    #[must_use]
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold.max(1);
        self
    }

    /// Set success threshold for half-open state
    #[must_use]
    pub fn with_success_threshold(mut self, threshold: u32) -> Self {
        self.success_threshold = threshold.max(1);
        self
    }

    /// Set cooldown window
    #[must_use]
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }
}

/// Circuit breaker guarding a single provider
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    state: RwLock<CircuitState>,
    consecutive_failures: AtomicU32,
    half_open_successes: AtomicU32,
    /// Milliseconds since `epoch` when the circuit last opened
    opened_at_ms: AtomicU64,
    epoch: Instant,
}

impl CircuitBreaker {
    /// Create a new circuit breaker
    #[must_use]
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            state: RwLock::new(CircuitState::Closed),
            consecutive_failures: AtomicU32::new(0),
            half_open_successes: AtomicU32::new(0),
            opened_at_ms: AtomicU64::new(0),
            epoch: Instant::now(),
        }
    }

    /// Create with default configuration
    #[must_use]
    pub fn with_defaults(name: impl Into<String>) -> Self {
        Self::new(name, CircuitBreakerConfig::default())
    }

    /// Get the circuit breaker name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the current state
    #[must_use]
    pub fn state(&self) -> CircuitState {
        *self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Get current consecutive failure count
    #[must_use]
    pub fn failure_count(&self) -> u32 {
        self.consecutive_failures.load(Ordering::SeqCst)
    }

    /// Check if the circuit allows a call
    #[must_use]
    pub fn can_execute(&self) -> bool {
        self.check_cooldown();
        !matches!(self.state(), CircuitState::Open)
    }

    /// Record a successful call
    pub fn record_success(&self) {
        match self.state() {
            CircuitState::Closed => {
                self.consecutive_failures.store(0, Ordering::SeqCst);
            }
            CircuitState::HalfOpen => {
                let successes = self.half_open_successes.fetch_add(1, Ordering::SeqCst) + 1;
                debug!(
                    name = %self.name,
                    successes = successes,
                    threshold = self.config.success_threshold,
                    "Circuit breaker success in half-open state"
                );
                if successes >= self.config.success_threshold {
                    self.transition(CircuitState::Closed);
                }
            }
            CircuitState::Open => {}
        }
    }

    /// Record a failed call
    pub fn record_failure(&self) {
        match self.state() {
            CircuitState::Closed => {
                let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
                debug!(
                    name = %self.name,
                    failures = failures,
                    threshold = self.config.failure_threshold,
                    "Circuit breaker failure recorded"
                );
                if failures >= self.config.failure_threshold {
                    self.transition(CircuitState::Open);
                }
            }
            CircuitState::HalfOpen => {
                warn!(name = %self.name, "Trial call failed in half-open state, reopening");
                self.transition(CircuitState::Open);
            }
            CircuitState::Open => {}
        }
    }

    /// Time left before an open circuit admits a trial call
    #[must_use]
    pub fn remaining_cooldown(&self) -> Option<Duration> {
        if self.state() != CircuitState::Open {
            return None;
        }
        let elapsed = self.elapsed_since_open();
        Some(self.config.cooldown.saturating_sub(elapsed))
    }

    /// Reset the circuit breaker to closed state
    pub fn reset(&self) {
        self.transition(CircuitState::Closed);
    }

    fn check_cooldown(&self) {
        if self.state() == CircuitState::Open && self.elapsed_since_open() >= self.config.cooldown {
            self.transition(CircuitState::HalfOpen);
        }
    }

    fn elapsed_since_open(&self) -> Duration {
        let now_ms = self.epoch.elapsed().as_millis() as u64;
        Duration::from_millis(now_ms.saturating_sub(self.opened_at_ms.load(Ordering::SeqCst)))
    }

    fn transition(&self, next: CircuitState) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        if *state == next {
            return;
        }
        match next {
            CircuitState::Open => {
                info!(
                    name = %self.name,
                    failures = self.consecutive_failures.load(Ordering::SeqCst),
                    cooldown_ms = self.config.cooldown.as_millis() as u64,
                    "Circuit breaker opened"
                );
                self.opened_at_ms
                    .store(self.epoch.elapsed().as_millis() as u64, Ordering::SeqCst);
            }
            CircuitState::HalfOpen => {
                info!(name = %self.name, "Circuit breaker entering half-open state");
                self.half_open_successes.store(0, Ordering::SeqCst);
            }
            CircuitState::Closed => {
                info!(name = %self.name, "Circuit breaker closed");
                self.consecutive_failures.store(0, Ordering::SeqCst);
                self.half_open_successes.store(0, Ordering::SeqCst);
            }
        }
        *state = next;
    }
}
