//! Coordinator
//!
//! Entry point for ad hoc requests. Routing order:
//! 1. An explicit agent hint selects that agent
//! 2. An explicit capability hint is resolved directly
//! 3. Otherwise the [`IntentClassifier`] picks the capabilities
//!
//! One resolved agent is invoked directly and its result returned unmerged.
//! Several agents run as the static team with exactly that member set, or
//! as an ad hoc parallel team.

use crate::agents::{invoke_or_failure, InvocationContext};
use crate::classifier::IntentClassifier;
use crate::error::{Error, Result};
use crate::registry::AgentRegistry;
use crate::team::TeamRunner;
use crate::types::{Capability, Request, TeamResponse};
use pacer_llm::retry::duration_ms;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Coordinator settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Timeout for a directly invoked agent
    #[serde(default = "default_agent_timeout", rename = "agent_timeout_ms", with = "duration_ms")]
    pub agent_timeout: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            agent_timeout: default_agent_timeout(),
        }
    }
}

impl CoordinatorConfig {
    /// Set the direct invocation timeout
    #[must_use]
    pub fn with_agent_timeout(mut self, timeout: Duration) -> Self {
        self.agent_timeout = timeout;
        self
    }
}

fn default_agent_timeout() -> Duration {
    Duration::from_secs(60)
}

/// Agents chosen for a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    /// Capabilities the request was resolved through (empty for an agent hint)
    pub capabilities: Vec<Capability>,
    /// Agent ids in first-seen order
    pub agents: Vec<String>,
}

/// Routes requests to agents and teams
pub struct Coordinator {
    registry: Arc<AgentRegistry>,
    teams: Arc<TeamRunner>,
    classifier: Arc<dyn IntentClassifier>,
    config: CoordinatorConfig,
}

impl Coordinator {
    /// Create a coordinator
    #[must_use]
    pub fn new(
        registry: Arc<AgentRegistry>,
        teams: Arc<TeamRunner>,
        classifier: Arc<dyn IntentClassifier>,
    ) -> Self {
        Self {
            registry,
            teams,
            classifier,
            config: CoordinatorConfig::default(),
        }
    }

    /// Replace the settings
    #[must_use]
    pub fn with_config(mut self, config: CoordinatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Registry behind this coordinator
    #[must_use]
    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    /// Team runner behind this coordinator
    #[must_use]
    pub fn teams(&self) -> &Arc<TeamRunner> {
        &self.teams
    }

    /// Handle a request
    pub async fn handle(&self, request: &Request) -> Result<TeamResponse> {
        self.handle_cancellable(request, &CancellationToken::new())
            .await
    }

    /// Handle a request; cancelling `cancel` aborts every in-flight call
    #[instrument(skip(self, request, cancel), fields(session_id = %request.session_id))]
    pub async fn handle_cancellable(
        &self,
        request: &Request,
        cancel: &CancellationToken,
    ) -> Result<TeamResponse> {
        let route = self.route(request, cancel).await?;

        if route.agents.is_empty() {
            warn!(capabilities = ?route.capabilities, "No capable agent");
            return Err(Error::NoCapableAgent {
                capabilities: route.capabilities.iter().map(ToString::to_string).collect(),
            });
        }

        if let [agent_id] = route.agents.as_slice() {
            return self.direct(agent_id, request, cancel).await;
        }

        let team = match self.teams.match_static(&route.agents) {
            Some(team) => team.clone(),
            None => self.teams.ad_hoc(route.agents.clone()),
        };
        info!(team = %team.name, agents = ?route.agents, "Dispatching to team");
        self.teams.aggregate(&team, request, cancel).await
    }

    /// Choose the agents for `request` without invoking them
    pub async fn route(&self, request: &Request, cancel: &CancellationToken) -> Result<Route> {
        if let Some(agent_id) = &request.agent_hint {
            if !self.registry.contains(agent_id) {
                return Err(Error::UnknownAgent(agent_id.clone()));
            }
            return Ok(Route {
                capabilities: Vec::new(),
                agents: vec![agent_id.clone()],
            });
        }

        let capabilities = match &request.capability_hint {
            Some(hint) => vec![hint.clone()],
            None => {
                let known = self.registry.capabilities();
                self.classifier.classify(request, &known, cancel).await
            }
        };

        let mut agents: Vec<String> = Vec::new();
        for capability in &capabilities {
            for descriptor in self.registry.resolve(capability.as_str()) {
                if !agents.contains(&descriptor.id) {
                    agents.push(descriptor.id.clone());
                }
            }
        }

        debug!(capabilities = ?capabilities, agents = ?agents, "Resolved route");
        Ok(Route {
            capabilities,
            agents,
        })
    }

    async fn direct(
        &self,
        agent_id: &str,
        request: &Request,
        cancel: &CancellationToken,
    ) -> Result<TeamResponse> {
        let agent = self
            .registry
            .agent(agent_id)
            .ok_or_else(|| Error::UnknownAgent(agent_id.to_string()))?;

        info!(agent_id = %agent_id, "Invoking agent directly");
        let cx = InvocationContext::new(cancel.child_token());
        let result =
            invoke_or_failure(agent.as_ref(), agent_id, request, &cx, self.config.agent_timeout)
                .await;
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        if !result.contributes() {
            return Err(Error::AggregateFailure {
                diagnostics: result.diagnostics.iter().map(ToString::to_string).collect(),
            });
        }
        Ok(TeamResponse::direct(result))
    }
}
