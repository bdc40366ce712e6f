//! Error types for pacer-core
//!
//! This module provides the orchestration error taxonomy and user-friendly
//! error formatting.

use thiserror::Error;

/// Core error type
#[derive(Debug, Error)]
pub enum Error {
    /// No registered agent can serve the request
    #[error("no capable agent for capabilities {capabilities:?}")]
    NoCapableAgent {
        /// Capabilities that were tried (empty when classification found none)
        capabilities: Vec<String>,
    },

    /// Agent id registered twice
    #[error("duplicate agent id: {0}")]
    DuplicateAgentId(String),

    /// Agent id not present in the registry
    #[error("unknown agent: {0}")]
    UnknownAgent(String),

    /// Team name not configured
    #[error("unknown team: {0}")]
    UnknownTeam(String),

    /// Model provider error
    #[error("provider error: {0}")]
    Provider(#[from] pacer_llm::Error),

    /// An agent failed while handling a request
    #[error("agent '{agent_id}' failed: {message}")]
    AgentInvocationFailure {
        /// Failing agent
        agent_id: String,
        /// Failure detail
        message: String,
    },

    /// Every agent involved in a call failed
    #[error("all agents failed: {}", .diagnostics.join("; "))]
    AggregateFailure {
        /// One entry per failed agent
        diagnostics: Vec<String>,
    },

    /// Team deadline elapsed before any agent succeeded
    #[error("team '{team}' produced no result within {timeout_ms}ms")]
    TeamAggregationTimeout {
        /// Team name
        team: String,
        /// Team timeout
        timeout_ms: u64,
    },

    /// Delegation chain exceeded its bound
    #[error("delegation depth exceeded (max {max_depth})")]
    DelegationDepthExceeded {
        /// Configured maximum depth
        max_depth: u32,
    },

    /// Workflow name not configured
    #[error("unknown workflow: {0}")]
    UnknownWorkflow(String),

    /// Run id not present in the store
    #[error("unknown run: {0}")]
    UnknownRun(String),

    /// Resume requested for a run that is not suspended
    #[error("run {run_id} is not suspended (status: {status})")]
    RunNotSuspended {
        /// Run id
        run_id: String,
        /// Current status
        status: String,
    },

    /// Operation requires a non-terminal run
    #[error("run {run_id} already finished (status: {status})")]
    RunFinished {
        /// Run id
        run_id: String,
        /// Terminal status
        status: String,
    },

    /// Optimistic version check failed on save
    #[error("version conflict on run {run_id}: expected {expected}, found {actual}")]
    VersionConflict {
        /// Run id
        run_id: String,
        /// Version the writer expected
        expected: u64,
        /// Version currently stored
        actual: u64,
    },

    /// A workflow step failed after exhausting its retry budget
    #[error("workflow run {run_id} failed at step '{step_id}': {message}")]
    WorkflowStepFailure {
        /// Run id
        run_id: String,
        /// Failing step
        step_id: String,
        /// Failure detail
        message: String,
    },

    /// Malformed request or step input
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Invalid static configuration
    #[error("invalid configuration: {field}: {message}")]
    InvalidConfig {
        /// Config field name
        field: String,
        /// Detailed message
        message: String,
    },

    /// Operation cancelled
    #[error("operation cancelled")]
    Cancelled,

    /// Persistence failure
    #[error("storage error: {0}")]
    Storage(String),

    /// Internal error (serialization, task join, etc.)
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an `InvalidConfig` error
    pub fn invalid_config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Error::InvalidConfig {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Whether a workflow step failing with this error may be retried
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::Provider(e) => e.is_transient() || matches!(e, pacer_llm::Error::ProviderCircuitOpen { .. }),
            Error::AgentInvocationFailure { .. }
            | Error::AggregateFailure { .. }
            | Error::TeamAggregationTimeout { .. }
            | Error::Storage(_) => true,
            _ => false,
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Trait for user-friendly error messages
///
/// Provides human-readable error messages, suggestions for fixing,
/// and a pointer to further help.
pub trait UserFriendlyError {
    /// Get a user-friendly error message
    fn user_message(&self) -> String;

    /// Get a suggestion for how to fix the error
    fn suggestion(&self) -> Option<String>;

    /// Get a command or document with more information
    fn docs_hint(&self) -> Option<&str>;
}

impl UserFriendlyError for Error {
    fn user_message(&self) -> String {
        match self {
            Error::NoCapableAgent { .. } => {
                "🤷 Sorry, I don't have a coach who can help with that yet.".to_string()
            }
            Error::Provider(pacer_llm::Error::RateLimited {
                retry_after: Some(secs),
                ..
            }) => format!("⏳ Rate limit exceeded. Please wait {} seconds.", secs),
            Error::Provider(pacer_llm::Error::NotConfigured(msg)) => {
                format!("🔑 Model provider is not configured: {}", msg)
            }
            Error::Provider(e) => format!("🤖 Model provider error: {}", e),
            Error::AgentInvocationFailure { agent_id, .. } => {
                format!("⚡ The {} agent could not finish its answer.", agent_id)
            }
            Error::AggregateFailure { .. } => {
                "⚡ None of the agents could answer this request.".to_string()
            }
            Error::TeamAggregationTimeout { team, .. } => {
                format!("⏱️ The {} team took too long to answer.", team)
            }
            Error::UnknownWorkflow(name) => format!("📋 There is no workflow named '{}'.", name),
            Error::UnknownRun(id) => format!("📋 No workflow run with id {}.", id),
            Error::RunNotSuspended { run_id, status } => {
                format!("📋 Run {} cannot be resumed while {}.", run_id, status)
            }
            Error::RunFinished { run_id, status } => {
                format!("📋 Run {} has already {}.", run_id, status)
            }
            Error::WorkflowStepFailure { step_id, message, .. } => {
                format!("📋 Workflow step '{}' failed: {}", step_id, message)
            }
            Error::InvalidConfig { field, message } => {
                format!("⚙️ Configuration error in '{}': {}", field, message)
            }
            Error::Cancelled => "🛑 The request was cancelled.".to_string(),
            other => format!("❌ {}", other),
        }
    }

    fn suggestion(&self) -> Option<String> {
        match self {
            Error::NoCapableAgent { .. } => Some(
                "💡 Try asking about training, recovery, nutrition or goals, or name an agent explicitly."
                    .to_string(),
            ),
            Error::Provider(pacer_llm::Error::NotConfigured(_)) => {
                Some("💡 Set the provider's API key environment variable or switch to the mock provider.".to_string())
            }
            Error::Provider(pacer_llm::Error::ProviderCircuitOpen { .. }) => {
                Some("💡 The provider failed repeatedly; wait for the cooldown and retry.".to_string())
            }
            Error::RunNotSuspended { run_id, .. } => {
                Some(format!("💡 Check the run with `pacer workflow status {}`.", run_id))
            }
            Error::InvalidConfig { field, .. } => Some(format!(
                "💡 Check the '{}' setting in config/default.toml or PACER_* environment variables.",
                field
            )),
            _ => None,
        }
    }

    fn docs_hint(&self) -> Option<&str> {
        match self {
            Error::NoCapableAgent { .. } | Error::UnknownAgent(_) => Some("pacer agents"),
            Error::UnknownWorkflow(_) => Some("pacer workflows"),
            Error::UnknownRun(_) => Some("pacer workflow runs"),
            _ => None,
        }
    }
}

/// Format an error for display in the CLI
pub fn format_error_for_cli(error: &Error) -> String {
    let mut output = String::new();

    output.push_str(&error.user_message());
    output.push_str("\n\n");

    if let Some(suggestion) = error.suggestion() {
        output.push_str(&suggestion);
        output.push_str("\n\n");
    }

    if let Some(hint) = error.docs_hint() {
        output.push_str(&format!("📚 More info: `{}`", hint));
        output.push('\n');
    }

    output
}

/// Format an error for display in a chat message
pub fn format_error_for_chat(error: &Error) -> String {
    let mut output = error.user_message();

    if let Some(suggestion) = error.suggestion() {
        output.push_str("\n\n");
        output.push_str(&suggestion);
    }

    output
}
