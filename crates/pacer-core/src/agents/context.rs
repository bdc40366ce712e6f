//! Per-call invocation context

use super::invoke::invoke;
use crate::error::{Error, Result};
use crate::registry::AgentRegistry;
use crate::types::{AgentDescriptor, AgentResult, Request};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Default bound on nested delegation
pub const DEFAULT_MAX_DELEGATION_DEPTH: u32 = 2;

/// Delegation rights handed to a lead agent
pub struct Delegation {
    registry: Arc<AgentRegistry>,
    candidates: Vec<AgentDescriptor>,
    max_depth: u32,
    per_agent_timeout: Duration,
    recorded: Mutex<Vec<AgentResult>>,
}

impl Delegation {
    /// Allow delegation to `candidates`
    #[must_use]
    pub fn new(
        registry: Arc<AgentRegistry>,
        candidates: Vec<AgentDescriptor>,
        max_depth: u32,
        per_agent_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            candidates,
            max_depth,
            per_agent_timeout,
            recorded: Mutex::new(Vec::new()),
        }
    }

    /// Agents that may be delegated to
    #[must_use]
    pub fn candidates(&self) -> &[AgentDescriptor] {
        &self.candidates
    }

    /// Maximum delegation depth
    #[must_use]
    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    /// Results of every delegated call so far, in call order
    #[must_use]
    pub fn recorded(&self) -> Vec<AgentResult> {
        self.recorded
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn record(&self, result: AgentResult) {
        self.recorded
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(result);
    }
}

/// Explicit, immutable context of one agent invocation
#[derive(Clone)]
pub struct InvocationContext {
    cancel: CancellationToken,
    depth: u32,
    delegation: Option<Arc<Delegation>>,
}

impl InvocationContext {
    /// Context without delegation rights
    #[must_use]
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            depth: 0,
            delegation: None,
        }
    }

    /// Context allowing delegation
    #[must_use]
    pub fn with_delegation(cancel: CancellationToken, delegation: Arc<Delegation>) -> Self {
        Self {
            cancel,
            depth: 0,
            delegation: Some(delegation),
        }
    }

    /// Cancellation token for this call
    #[must_use]
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Whether the caller gave up on this call
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Current delegation depth (0 for the directly invoked agent)
    #[must_use]
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Agents this call may delegate to (empty without delegation rights)
    #[must_use]
    pub fn delegates(&self) -> &[AgentDescriptor] {
        self.delegation
            .as_deref()
            .map(Delegation::candidates)
            .unwrap_or_default()
    }

    /// Delegate a sub-request to one of the candidate agents
    ///
    /// The delegated call goes through the same agent contract and its
    /// result is recorded for the team response.
    pub async fn delegate(&self, agent_id: &str, request: &Request) -> Result<AgentResult> {
        let delegation = self.delegation.as_ref().ok_or_else(|| {
            Error::InvalidInput("delegation is not available in this context".to_string())
        })?;

        let depth = self.depth + 1;
        if depth > delegation.max_depth {
            return Err(Error::DelegationDepthExceeded {
                max_depth: delegation.max_depth,
            });
        }

        if !delegation.candidates.iter().any(|d| d.id == agent_id) {
            return Err(Error::UnknownAgent(agent_id.to_string()));
        }
        let agent = delegation
            .registry
            .agent(agent_id)
            .ok_or_else(|| Error::UnknownAgent(agent_id.to_string()))?;

        debug!(agent_id = %agent_id, depth = depth, "Delegating request");

        let child = Self {
            cancel: self.cancel.child_token(),
            depth,
            delegation: Some(delegation.clone()),
        };
        let result = invoke(
            agent.as_ref(),
            agent_id,
            request,
            &child,
            delegation.per_agent_timeout,
        )
        .await
        .unwrap_or_else(|e| AgentResult::failure(agent_id, e.to_string()));

        delegation.record(result.clone());
        Ok(result)
    }
}
