//! Shared orchestration types
//!
//! Requests flow into agents, agents produce [`AgentResult`]s, and teams
//! combine those into a [`TeamResponse`].

use pacer_llm::{Message, ModelTier};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::borrow::Borrow;
use std::fmt;
use std::time::Duration;

/// Opaque capability tag (e.g. "training-planning")
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Capability(String);

impl Capability {
    /// Create a capability tag
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    /// The tag as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for Capability {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Capability {
    fn from(tag: &str) -> Self {
        Self(tag.to_string())
    }
}

impl From<String> for Capability {
    fn from(tag: String) -> Self {
        Self(tag)
    }
}

/// Static description of a registered agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentDescriptor {
    /// Unique agent id
    pub id: String,
    /// Display name
    pub name: String,
    /// Ordered capabilities (non-empty once registered)
    pub capabilities: Vec<Capability>,
    /// Higher priority agents are preferred
    #[serde(default)]
    pub priority: u32,
    /// Cost/latency tier
    #[serde(default)]
    pub tier: ModelTier,
}

impl AgentDescriptor {
    /// Create a descriptor with no capabilities
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            capabilities: Vec::new(),
            priority: 0,
            tier: ModelTier::default(),
        }
    }

    /// Add a capability
    #[must_use]
    pub fn with_capability(mut self, capability: impl Into<Capability>) -> Self {
        self.capabilities.push(capability.into());
        self
    }

    /// Set priority
    #[must_use]
    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    /// Set tier
    #[must_use]
    pub fn with_tier(mut self, tier: ModelTier) -> Self {
        self.tier = tier;
        self
    }

    /// Whether the agent offers `capability`
    #[must_use]
    pub fn supports(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|c| c.as_str() == capability)
    }
}

/// User input carried by a request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum RequestInput {
    /// Raw user text
    Text(String),
    /// Structured payload
    Structured(Value),
}

impl RequestInput {
    /// Text view of the input
    #[must_use]
    pub fn as_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Structured(value) => value.to_string(),
        }
    }
}

/// Context the caller supplies with a request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestContext {
    /// Prior conversation turns
    #[serde(default)]
    pub turns: Vec<Message>,
    /// User profile facts
    #[serde(default)]
    pub profile: Map<String, Value>,
    /// Results of agents that already ran for this request
    #[serde(default)]
    pub prior_results: Vec<AgentResult>,
}

/// A request dispatched to agents; immutable once dispatched
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Session id
    pub session_id: String,
    /// User input
    pub input: RequestInput,
    /// Capability the caller asks for explicitly
    #[serde(default)]
    pub capability_hint: Option<Capability>,
    /// Agent the caller asks for explicitly
    #[serde(default)]
    pub agent_hint: Option<String>,
    /// Conversation and profile context
    #[serde(default)]
    pub context: RequestContext,
}

impl Request {
    /// Text request
    #[must_use]
    pub fn text(session_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::with_input(session_id, RequestInput::Text(text.into()))
    }

    /// Structured request
    #[must_use]
    pub fn structured(session_id: impl Into<String>, value: Value) -> Self {
        Self::with_input(session_id, RequestInput::Structured(value))
    }

    fn with_input(session_id: impl Into<String>, input: RequestInput) -> Self {
        Self {
            session_id: session_id.into(),
            input,
            capability_hint: None,
            agent_hint: None,
            context: RequestContext::default(),
        }
    }

    /// Ask for a capability explicitly
    #[must_use]
    pub fn with_capability_hint(mut self, capability: impl Into<Capability>) -> Self {
        self.capability_hint = Some(capability.into());
        self
    }

    /// Ask for an agent explicitly
    #[must_use]
    pub fn with_agent_hint(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_hint = Some(agent_id.into());
        self
    }

    /// Replace the profile facts
    #[must_use]
    pub fn with_profile(mut self, profile: Map<String, Value>) -> Self {
        self.context.profile = profile;
        self
    }

    /// Add a single profile fact
    #[must_use]
    pub fn with_profile_fact(mut self, key: impl Into<String>, value: Value) -> Self {
        self.context.profile.insert(key.into(), value);
        self
    }

    /// Add a prior conversation turn
    #[must_use]
    pub fn with_turn(mut self, turn: Message) -> Self {
        self.context.turns.push(turn);
        self
    }

    /// Copy of this request that also carries `result` as prior context
    #[must_use]
    pub fn with_prior_result(&self, result: AgentResult) -> Self {
        let mut next = self.clone();
        next.context.prior_results.push(result);
        next
    }
}

/// Outcome class of one agent invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    /// Complete answer
    Success,
    /// Incomplete answer (possibly empty)
    Partial,
    /// No usable answer
    Failure,
}

/// Diagnostic category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// Agent did not answer in time
    Timeout,
    /// Agent failed
    Failure,
    /// Call was cancelled
    Cancelled,
    /// Informational
    Note,
}

/// A diagnostic attached to a result or response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Agent the diagnostic concerns
    pub agent_id: String,
    /// Category
    pub kind: DiagnosticKind,
    /// Detail
    pub message: String,
}

impl Diagnostic {
    /// Create a diagnostic
    #[must_use]
    pub fn new(agent_id: impl Into<String>, kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.agent_id, self.message)
    }
}

fn default_confidence() -> f64 {
    1.0
}

/// Result of one agent invocation; never mutated after the invocation returns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResult {
    /// Producing agent
    pub agent_id: String,
    /// Outcome class
    pub status: AgentStatus,
    /// Ask sequential teams to stop after this result
    #[serde(default)]
    pub terminal: bool,
    /// Answer payload
    #[serde(default)]
    pub payload: Value,
    /// Self-reported confidence in [0, 1]
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    /// Diagnostics
    #[serde(default)]
    pub diagnostics: Vec<Diagnostic>,
    /// Wall time of the invocation
    #[serde(default)]
    pub duration_ms: u64,
}

impl AgentResult {
    /// Successful result
    #[must_use]
    pub fn success(agent_id: impl Into<String>, payload: Value) -> Self {
        Self {
            agent_id: agent_id.into(),
            status: AgentStatus::Success,
            terminal: false,
            payload,
            confidence: default_confidence(),
            diagnostics: Vec::new(),
            duration_ms: 0,
        }
    }

    /// Failed result carrying a failure diagnostic
    #[must_use]
    pub fn failure(agent_id: impl Into<String>, message: impl Into<String>) -> Self {
        let agent_id = agent_id.into();
        let diagnostic = Diagnostic::new(agent_id.clone(), DiagnosticKind::Failure, message);
        let mut result = Self::success(agent_id, Value::Null);
        result.status = AgentStatus::Failure;
        result.confidence = 0.0;
        result.diagnostics.push(diagnostic);
        result
    }

    /// Empty partial result for an agent that ran out of time
    #[must_use]
    pub fn timed_out(agent_id: impl Into<String>, after: Duration) -> Self {
        let agent_id = agent_id.into();
        let diagnostic = Diagnostic::new(
            agent_id.clone(),
            DiagnosticKind::Timeout,
            format!("timed out after {}ms", after.as_millis()),
        );
        let mut result = Self::success(agent_id, Value::Null);
        result.status = AgentStatus::Partial;
        result.confidence = 0.0;
        result.duration_ms = after.as_millis() as u64;
        result.diagnostics.push(diagnostic);
        result
    }

    /// Set confidence (clamped to [0, 1])
    #[must_use]
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    /// Mark as terminal
    #[must_use]
    pub fn terminal(mut self) -> Self {
        self.terminal = true;
        self
    }

    /// Set status
    #[must_use]
    pub fn with_status(mut self, status: AgentStatus) -> Self {
        self.status = status;
        self
    }

    /// Attach a diagnostic
    #[must_use]
    pub fn with_diagnostic(mut self, diagnostic: Diagnostic) -> Self {
        self.diagnostics.push(diagnostic);
        self
    }

    /// Whether this result carries a usable contribution
    #[must_use]
    pub fn contributes(&self) -> bool {
        self.status != AgentStatus::Failure && !self.payload.is_null()
    }
}

/// Combined answer to a request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamResponse {
    /// Every agent result, in invocation order
    pub results: Vec<AgentResult>,
    /// Synthesized payload
    pub payload: Value,
    /// Agents whose output contributed to the payload
    pub contributors: Vec<String>,
    /// Diagnostics collected along the way
    pub diagnostics: Vec<Diagnostic>,
    /// Team that produced the response (absent for direct answers)
    pub team: Option<String>,
}

impl TeamResponse {
    /// Response carrying a single agent's result unmerged
    #[must_use]
    pub fn direct(result: AgentResult) -> Self {
        Self {
            payload: result.payload.clone(),
            contributors: vec![result.agent_id.clone()],
            diagnostics: result.diagnostics.clone(),
            results: vec![result],
            team: None,
        }
    }

    /// Lowest confidence among contributing results
    #[must_use]
    pub fn confidence(&self) -> f64 {
        self.results
            .iter()
            .filter(|r| self.contributors.contains(&r.agent_id))
            .map(|r| r.confidence)
            .fold(None, |acc: Option<f64>, c| Some(acc.map_or(c, |a| a.min(c))))
            .unwrap_or(0.0)
    }

    /// Human-readable rendering of the payload
    #[must_use]
    pub fn render(&self) -> String {
        match &self.payload {
            Value::String(text) => text.clone(),
            Value::Null => String::new(),
            other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
        }
    }
}
