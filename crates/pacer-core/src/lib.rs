//! Pacer Core - Agent Orchestration
//!
//! This crate routes coaching requests to specialized agents and runs
//! multi-step workflows over them:
//! - Registry: capability-tagged agents behind one `Agent` interface
//! - Classifier: keyword and model-backed intent classification
//! - Teams: sequential, parallel and hierarchical aggregation
//! - Coordinator: entry point for ad hoc requests
//! - Workflow: persisted, resumable multi-step runs
//! - Store: SQLite and in-memory run persistence
//! - Config: static declarations wired into a runtime
//! - Shutdown: coordinated cancellation of in-flight work

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod agents;
pub mod classifier;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod registry;
pub mod shutdown;
pub mod store;
pub mod team;
pub mod types;
pub mod workflow;

#[cfg(test)]
mod test_support;

pub use agents::{invoke, invoke_or_failure, Agent, InvocationContext, LlmAgent, OutputFormat};
pub use classifier::{IntentClassifier, KeywordClassifier, LlmClassifier};
pub use config::{
    AgentSettings, ClassifierMode, ClassifierSettings, KeywordRuleSettings, PacerConfig, Runtime,
};
pub use coordinator::{Coordinator, CoordinatorConfig, Route};
pub use error::{format_error_for_chat, format_error_for_cli, Error, Result, UserFriendlyError};
pub use registry::AgentRegistry;
pub use shutdown::{wait_for_shutdown_signal, ShutdownController, ShutdownPhase};
pub use store::{MemoryRunStore, RunStore, RunStoreBackend, SqliteRunStore, StoreConfig};
pub use team::{TeamConfig, TeamDefaults, TeamPolicy, TeamRunner};
pub use types::{
    AgentDescriptor, AgentResult, AgentStatus, Capability, Diagnostic, DiagnosticKind, Request,
    RequestContext, RequestInput, TeamResponse,
};
pub use workflow::{
    EngineConfig, RunStatus, RunSummary, StepOutcome, StepStatus, StepTarget, WorkflowDefinition,
    WorkflowEngine, WorkflowRun, WorkflowStepSpec,
};
