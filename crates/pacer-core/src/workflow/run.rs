//! Workflow run state

use crate::types::Diagnostic;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use uuid::Uuid;

/// Run lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Created, not started
    Pending,
    /// Executing steps
    Running,
    /// Stopped by shutdown; resumable
    Suspended,
    /// All steps done
    Completed,
    /// A step failed
    Failed,
    /// Aborted by an operator
    Aborted,
}

impl RunStatus {
    /// Whether the run can never execute again
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Aborted)
    }

    /// Lowercase name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Suspended => "suspended",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Aborted => "aborted",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "suspended" => Ok(Self::Suspended),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "aborted" => Ok(Self::Aborted),
            other => Err(format!("unknown run status: {other}")),
        }
    }
}

/// Outcome class of one step execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Success condition met
    Completed,
    /// Guard was false, step not executed
    Skipped,
    /// Optional step failed after its retry budget
    Failed,
}

/// Entry of the append-only outcome log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOutcome {
    /// Step id
    pub step_id: String,
    /// Step index within the definition
    pub step_index: usize,
    /// Outcome class
    pub status: StepStatus,
    /// Attempts made
    pub attempts: u32,
    /// Payload produced (null unless completed)
    #[serde(default)]
    pub payload: Value,
    /// Contributing agents
    #[serde(default)]
    pub contributors: Vec<String>,
    /// Diagnostics from the invocation
    #[serde(default)]
    pub diagnostics: Vec<Diagnostic>,
    /// When the outcome was recorded
    pub completed_at: DateTime<Utc>,
}

impl StepOutcome {
    /// Outcome without payload
    #[must_use]
    pub fn new(step_id: impl Into<String>, step_index: usize, status: StepStatus, attempts: u32) -> Self {
        Self {
            step_id: step_id.into(),
            step_index,
            status,
            attempts,
            payload: Value::Null,
            contributors: Vec::new(),
            diagnostics: Vec::new(),
            completed_at: Utc::now(),
        }
    }
}

/// Why a run failed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    /// Failing step
    pub step_id: String,
    /// Error message
    pub message: String,
    /// Attempts made
    pub attempts: u32,
}

/// Persisted state of one workflow execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRun {
    /// Run id
    pub run_id: String,
    /// Workflow name
    pub workflow: String,
    /// Index of the next step to execute
    pub current_step: usize,
    /// Outcomes recorded for the current step start at this log position
    #[serde(default)]
    pub step_log_start: usize,
    /// Finished iterations of the current step (repeating steps)
    #[serde(default)]
    pub iteration: u32,
    /// Append-only outcome log
    #[serde(default)]
    pub outcomes: Vec<StepOutcome>,
    /// Accumulated run state
    #[serde(default)]
    pub state: Map<String, Value>,
    /// Lifecycle status
    pub status: RunStatus,
    /// Stored version (optimistic concurrency)
    #[serde(default)]
    pub version: u64,
    /// Failure details when failed
    #[serde(default)]
    pub failure: Option<FailureRecord>,
    /// Engine currently executing the run
    #[serde(default)]
    pub owner: Option<String>,
    /// The owner must renew its claim before this instant
    #[serde(default)]
    pub lease_expires_at: Option<DateTime<Utc>>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last update time
    pub updated_at: DateTime<Utc>,
}

impl WorkflowRun {
    /// New pending run
    #[must_use]
    pub fn new(workflow: impl Into<String>, state: Map<String, Value>) -> Self {
        let now = Utc::now();
        Self {
            run_id: Uuid::new_v4().to_string(),
            workflow: workflow.into(),
            current_step: 0,
            step_log_start: 0,
            iteration: 0,
            outcomes: Vec::new(),
            state,
            status: RunStatus::Pending,
            version: 0,
            failure: None,
            owner: None,
            lease_expires_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Completed outcome for step `index` recorded since the step started
    #[must_use]
    pub fn completed_outcome(&self, index: usize) -> Option<&StepOutcome> {
        self.outcomes
            .get(self.step_log_start..)
            .unwrap_or_default()
            .iter()
            .rev()
            .find(|o| o.step_index == index && o.status == StepStatus::Completed)
    }

    /// Move to the next step
    pub fn advance(&mut self) {
        self.current_step += 1;
        self.iteration = 0;
        self.step_log_start = self.outcomes.len();
    }

    /// Run the current step again
    pub fn repeat(&mut self) {
        self.iteration += 1;
        self.step_log_start = self.outcomes.len();
    }

    /// Set status and bump the update time
    pub fn set_status(&mut self, status: RunStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    /// Claim the run for `owner` until `ttl` from now
    pub fn claim(&mut self, owner: &str, ttl: Duration) {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        self.owner = Some(owner.to_string());
        self.lease_expires_at = Utc::now().checked_add_signed(ttl);
    }

    /// Drop any claim
    pub fn release(&mut self) {
        self.owner = None;
        self.lease_expires_at = None;
    }

    /// Whether no executor holds a live claim at `now`
    #[must_use]
    pub fn lease_expired(&self, now: DateTime<Utc>) -> bool {
        self.lease_expires_at.map_or(true, |expires| expires <= now)
    }

    /// Compact view for listings
    #[must_use]
    pub fn summary(&self) -> RunSummary {
        RunSummary {
            run_id: self.run_id.clone(),
            workflow: self.workflow.clone(),
            status: self.status,
            current_step: self.current_step,
            version: self.version,
            updated_at: self.updated_at,
        }
    }
}

/// Listing entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Run id
    pub run_id: String,
    /// Workflow name
    pub workflow: String,
    /// Lifecycle status
    pub status: RunStatus,
    /// Next step index
    pub current_step: usize,
    /// Stored version
    pub version: u64,
    /// Last update time
    pub updated_at: DateTime<Utc>,
}
