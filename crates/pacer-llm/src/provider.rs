//! Model provider trait definition
//!
//! This module defines the core trait that all reasoning backends implement,
//! and the cost/latency tier used to pick between them.

use crate::completion::{CompletionRequest, CompletionResponse};
use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Cost/latency tier of a backend
///
/// Tiers are ordered by cost (ascending) and quality (ascending).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelTier {
    /// Cheap, low-latency models for lightweight, high-frequency calls
    Fast,
    /// Balanced models for general work
    #[default]
    Standard,
    /// Expensive models for complex reasoning
    Premium,
}

impl std::fmt::Display for ModelTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fast => write!(f, "fast"),
            Self::Standard => write!(f, "standard"),
            Self::Premium => write!(f, "premium"),
        }
    }
}

/// Trait for reasoning backends
#[async_trait::async_trait]
pub trait ModelProvider: Send + Sync {
    /// Get the provider name
    fn name(&self) -> &str;

    /// Get the default model
    fn default_model(&self) -> &str;

    /// Cost/latency tier of this backend
    fn tier(&self) -> ModelTier {
        ModelTier::Standard
    }

    /// Run one completion against the backend
    async fn invoke(&self, request: CompletionRequest) -> Result<CompletionResponse>;
}
