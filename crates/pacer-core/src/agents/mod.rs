//! Agents
//!
//! An agent is a named unit with one operation: given a request and an
//! invocation context, produce an [`AgentResult`] or a typed failure.
//!
//! - [`Agent`]: the contract every agent implements
//! - [`InvocationContext`]: cancellation and delegation for one call
//! - [`LlmAgent`]: persona agent backed by a model provider
//! - [`invoke`]: timed, cancellable invocation shared by teams, the
//!   coordinator and the workflow engine

mod context;
mod invoke;
mod llm_agent;

pub use context::{Delegation, InvocationContext, DEFAULT_MAX_DELEGATION_DEPTH};
pub use invoke::{invoke, invoke_or_failure};
pub use llm_agent::{LlmAgent, OutputFormat};

use crate::error::Result;
use crate::types::{AgentResult, Request};

/// A unit of domain reasoning behind a fixed interface
#[async_trait::async_trait]
pub trait Agent: Send + Sync {
    /// Handle one request
    async fn handle(&self, request: &Request, cx: &InvocationContext) -> Result<AgentResult>;
}
