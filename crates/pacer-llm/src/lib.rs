//! Pacer LLM - Model Provider Abstraction
//!
//! This crate provides the reasoning-backend layer used by every agent:
//! - Provider: the `ModelProvider` trait and cost/latency tiers
//! - Completion: request/response types (free text or structured JSON)
//! - Guarded: per-provider timeout, retry with backoff and circuit breaker
//! - OpenAI: OpenAI-compatible HTTP backend
//! - Mock: scripted in-process backend for offline runs and tests
//! - Router: named providers built from static settings

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod circuit_breaker;
pub mod completion;
pub mod error;
pub mod guarded;
pub mod mock;
pub mod openai;
pub mod policy;
pub mod provider;
pub mod retry;
pub mod router;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use completion::{
    CompletionContent, CompletionRequest, CompletionResponse, Constraints, Message, MessageRole,
    ResponseFormat, TokenUsage,
};
pub use error::{Error, Result};
pub use guarded::GuardedProvider;
pub use mock::MockProvider;
pub use openai::{OpenAiConfig, OpenAiProvider};
pub use policy::ProviderPolicy;
pub use provider::{ModelProvider, ModelTier};
pub use retry::{retry_with_backoff, RetryConfig, RetryError};
pub use router::{ProviderKind, ProviderRouter, ProviderSettings};
