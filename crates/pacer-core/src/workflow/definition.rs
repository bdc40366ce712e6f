//! Workflow definitions
//!
//! Static, loaded once and never mutated.

use pacer_llm::retry::duration_ms;
use pacer_llm::RetryConfig;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

/// Named ordered list of steps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Workflow name
    pub name: String,
    /// Human-readable description
    #[serde(default)]
    pub description: String,
    /// Steps, executed in order
    pub steps: Vec<WorkflowStepSpec>,
}

impl WorkflowDefinition {
    /// Create a definition
    #[must_use]
    pub fn new(name: impl Into<String>, steps: Vec<WorkflowStepSpec>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            steps,
        }
    }

    /// Set the description
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Index of the step named `id`
    #[must_use]
    pub fn step_index(&self, id: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.id == id)
    }
}

/// What a step invokes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepTarget {
    /// A single agent by id
    Agent(String),
    /// A static team by name
    Team(String),
}

impl std::fmt::Display for StepTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Agent(id) => write!(f, "agent:{id}"),
            Self::Team(name) => write!(f, "team:{name}"),
        }
    }
}

/// How the step's request is derived from run state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputMapping {
    /// State keys passed as structured input (all keys when empty)
    #[serde(default)]
    pub keys: Vec<String>,
    /// Capability hint attached to the request
    #[serde(default)]
    pub capability: Option<String>,
    /// Text prompt with `{key}` placeholders rendered from state
    #[serde(default)]
    pub template: Option<String>,
    /// Keys that must be present before the step may run
    #[serde(default)]
    pub required: Vec<String>,
}

/// When a step's answer counts as success
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuccessCondition {
    /// Accept a partial result as long as it carries a payload
    #[serde(default = "default_true")]
    pub accept_partial: bool,
    /// Object keys the payload must contain
    #[serde(default)]
    pub require_keys: Vec<String>,
    /// Lowest acceptable confidence
    #[serde(default)]
    pub min_confidence: Option<f64>,
}

impl Default for SuccessCondition {
    fn default() -> Self {
        Self {
            accept_partial: true,
            require_keys: Vec::new(),
            min_confidence: None,
        }
    }
}

/// Predicate over run state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateCondition {
    /// State key to inspect
    pub key: String,
    /// Value the key must equal
    #[serde(default)]
    pub equals: Option<Value>,
    /// Whether the key must (or must not) be present
    #[serde(default)]
    pub exists: Option<bool>,
}

impl StateCondition {
    /// Evaluate against `state`
    ///
    /// With neither `equals` nor `exists` set, the key must hold a truthy
    /// value (not null, false, zero, or empty).
    #[must_use]
    pub fn holds(&self, state: &Map<String, Value>) -> bool {
        let value = state.get(&self.key);
        if let Some(expected) = &self.equals {
            return value == Some(expected);
        }
        if let Some(exists) = self.exists {
            return value.is_some_and(|v| !v.is_null()) == exists;
        }
        value.is_some_and(truthy)
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(fields) => !fields.is_empty(),
    }
}

/// Repeat a step until a state condition holds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UntilCondition {
    /// Stop repeating once this holds
    pub condition: StateCondition,
    /// Upper bound on executions of the step
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
}

/// One step of a workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStepSpec {
    /// Step id, unique within the workflow
    pub id: String,
    /// Agent or team to invoke
    pub target: StepTarget,
    /// Input mapping
    #[serde(default)]
    pub input: InputMapping,
    /// Success condition
    #[serde(default)]
    pub success: SuccessCondition,
    /// Retry budget for recoverable failures
    #[serde(default = "RetryConfig::none")]
    pub retry: RetryConfig,
    /// Step has external effects and must not run twice
    #[serde(default)]
    pub side_effecting: bool,
    /// Failure after the retry budget skips the step instead of failing the run
    #[serde(default)]
    pub optional: bool,
    /// Run the step only when this holds
    #[serde(default)]
    pub when: Option<StateCondition>,
    /// Repeat the step until this holds
    #[serde(default)]
    pub until: Option<UntilCondition>,
    /// State key receiving the payload (merged into state when absent)
    #[serde(default)]
    pub output_key: Option<String>,
    /// Per-attempt timeout (engine default when absent)
    #[serde(default, rename = "timeout_ms", with = "duration_ms::option")]
    pub timeout: Option<Duration>,
}

impl WorkflowStepSpec {
    /// Step invoking an agent
    #[must_use]
    pub fn agent(id: impl Into<String>, agent_id: impl Into<String>) -> Self {
        Self::with_target(id, StepTarget::Agent(agent_id.into()))
    }

    /// Step invoking a static team
    #[must_use]
    pub fn team(id: impl Into<String>, team: impl Into<String>) -> Self {
        Self::with_target(id, StepTarget::Team(team.into()))
    }

    fn with_target(id: impl Into<String>, target: StepTarget) -> Self {
        Self {
            id: id.into(),
            target,
            input: InputMapping::default(),
            success: SuccessCondition::default(),
            retry: RetryConfig::none(),
            side_effecting: false,
            optional: false,
            when: None,
            until: None,
            output_key: None,
            timeout: None,
        }
    }

    /// Set the input mapping
    #[must_use]
    pub fn with_input(mut self, input: InputMapping) -> Self {
        self.input = input;
        self
    }

    /// Set the success condition
    #[must_use]
    pub fn with_success(mut self, success: SuccessCondition) -> Self {
        self.success = success;
        self
    }

    /// Set the retry budget
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Mark as side-effecting
    #[must_use]
    pub fn side_effecting(mut self) -> Self {
        self.side_effecting = true;
        self
    }

    /// Mark as optional
    #[must_use]
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Guard the step
    #[must_use]
    pub fn when(mut self, condition: StateCondition) -> Self {
        self.when = Some(condition);
        self
    }

    /// Repeat the step
    #[must_use]
    pub fn until(mut self, condition: StateCondition, max_iterations: u32) -> Self {
        self.until = Some(UntilCondition {
            condition,
            max_iterations,
        });
        self
    }

    /// Store the payload under `key`
    #[must_use]
    pub fn with_output_key(mut self, key: impl Into<String>) -> Self {
        self.output_key = Some(key.into());
        self
    }

    /// Set the per-attempt timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

fn default_true() -> bool {
    true
}

fn default_max_iterations() -> u32 {
    5
}
