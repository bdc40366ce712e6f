//! Workflow engine
//!
//! A workflow is a named, ordered list of steps, each invoking an agent or
//! a static team. Runs are explicit persisted state machines:
//!
//! ```text
//! pending -> running -> completed | failed | suspended | aborted
//! suspended -> running (resume)
//! ```

mod definition;
mod engine;
mod input;
mod run;


pub use definition::{
    InputMapping, StateCondition, StepTarget, SuccessCondition, UntilCondition, WorkflowDefinition,
    WorkflowStepSpec,
};
pub use engine::{EngineConfig, WorkflowEngine};
pub use input::{build_request, render};
pub use run::{FailureRecord, RunStatus, RunSummary, StepOutcome, StepStatus, WorkflowRun};
