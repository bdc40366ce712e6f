//! Workflow engine
//!
//! Drives runs through their definitions, persisting after every step.
//!
//! Per step:
//! - a false `when` guard records a skipped outcome and moves on
//! - side-effecting steps with a completed outcome in the log are not
//!   executed again; the recorded payload is merged instead
//! - recoverable failures are retried with backoff up to the step budget
//! - exhausted optional steps are recorded as failed and skipped
//! - shutdown suspends the run at the current step; abort ends it
//!
//! Outcomes are appended to the store before the advanced run is saved,
//! so a crash between the two never loses a completed step. Both writes
//! are checked against the run version the engine last saw.
//!
//! A running run carries a lease naming its engine. The lease is renewed
//! while a step is in flight; once it lapses the run can be reclaimed
//! with [`WorkflowEngine::resume`] or returned to `suspended` by
//! [`WorkflowEngine::recover`].

use super::definition::{StepTarget, WorkflowDefinition, WorkflowStepSpec};
use super::input::build_request;
use super::run::{FailureRecord, RunStatus, RunSummary, StepOutcome, StepStatus, WorkflowRun};
use crate::agents::{invoke, InvocationContext};
use crate::error::{Error, Result};
use crate::registry::AgentRegistry;
use crate::store::RunStore;
use crate::team::TeamRunner;
use crate::types::{AgentStatus, Diagnostic, DiagnosticKind, Request, TeamResponse};
use dashmap::DashMap;
use pacer_llm::retry::duration_ms;
use pacer_llm::retry_with_backoff;
use serde::{Deserialize, Serialize};
use chrono::Utc;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Per-attempt timeout for agent steps without their own
    #[serde(default = "default_step_timeout", rename = "default_step_timeout_ms", with = "duration_ms")]
    pub default_step_timeout: Duration,
    /// How long a running run stays claimed without a renewal
    #[serde(default = "default_lease_ttl", rename = "lease_ttl_ms", with = "duration_ms")]
    pub lease_ttl: Duration,
}

impl EngineConfig {
    /// Set the lease duration
    #[must_use]
    pub fn with_lease_ttl(mut self, ttl: Duration) -> Self {
        self.lease_ttl = ttl;
        self
    }

    /// Renewal period for the lease of an in-flight step
    #[must_use]
    pub fn heartbeat_interval(&self) -> Duration {
        (self.lease_ttl / 3).max(Duration::from_millis(10))
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_step_timeout: default_step_timeout(),
            lease_ttl: default_lease_ttl(),
        }
    }
}

fn default_step_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_lease_ttl() -> Duration {
    Duration::from_secs(30)
}

#[derive(Clone)]
struct RunControl {
    cancel: CancellationToken,
    abort: Arc<AtomicBool>,
}

/// Entry in the in-flight table, removed when the driving future ends
/// or is dropped
struct ActiveRun<'a> {
    active: &'a DashMap<String, RunControl>,
    run_id: String,
}

impl<'a> ActiveRun<'a> {
    fn insert(active: &'a DashMap<String, RunControl>, run_id: &str, control: RunControl) -> Self {
        active.insert(run_id.to_string(), control);
        Self {
            active,
            run_id: run_id.to_string(),
        }
    }
}

impl Drop for ActiveRun<'_> {
    fn drop(&mut self) {
        self.active.remove(&self.run_id);
    }
}

enum StepError {
    /// Shutdown or abort interrupted the step
    Interrupted,
    Failed { error: Error, attempts: u32 },
    /// The lease could not be renewed; another writer owns the run now
    Lease(Error),
}

/// Executes workflow definitions
pub struct WorkflowEngine {
    workflows: BTreeMap<String, Arc<WorkflowDefinition>>,
    registry: Arc<AgentRegistry>,
    teams: Arc<TeamRunner>,
    store: Arc<dyn RunStore>,
    config: EngineConfig,
    shutdown: CancellationToken,
    active: DashMap<String, RunControl>,
    executor_id: String,
}

impl WorkflowEngine {
    /// Create an engine with no workflows
    #[must_use]
    pub fn new(registry: Arc<AgentRegistry>, teams: Arc<TeamRunner>, store: Arc<dyn RunStore>) -> Self {
        Self {
            workflows: BTreeMap::new(),
            registry,
            teams,
            store,
            config: EngineConfig::default(),
            shutdown: CancellationToken::new(),
            active: DashMap::new(),
            executor_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    /// Replace the settings
    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Suspend in-flight runs when `token` is cancelled
    #[must_use]
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    /// Register a definition after checking its steps and targets
    pub fn register(&mut self, definition: WorkflowDefinition) -> Result<()> {
        let field = format!("workflows.{}", definition.name);
        if self.workflows.contains_key(&definition.name) {
            return Err(Error::invalid_config(field, "duplicate workflow name"));
        }
        if definition.steps.is_empty() {
            return Err(Error::invalid_config(field, "a workflow needs at least one step"));
        }

        let mut seen = HashSet::new();
        for step in &definition.steps {
            if !seen.insert(step.id.as_str()) {
                return Err(Error::invalid_config(
                    format!("{field}.steps.{}", step.id),
                    "duplicate step id",
                ));
            }
            if step.retry.max_attempts == 0 {
                return Err(Error::invalid_config(
                    format!("{field}.steps.{}.retry.max_attempts", step.id),
                    "must be at least 1",
                ));
            }
            let known = match &step.target {
                StepTarget::Agent(id) => self.registry.contains(id),
                StepTarget::Team(name) => self.teams.team(name).is_some(),
            };
            if !known {
                return Err(Error::invalid_config(
                    format!("{field}.steps.{}", step.id),
                    format!("unknown target {}", step.target),
                ));
            }
        }

        info!(workflow = %definition.name, steps = definition.steps.len(), "Registered workflow");
        self.workflows
            .insert(definition.name.clone(), Arc::new(definition));
        Ok(())
    }

    /// Registered definitions, ordered by name
    pub fn workflows(&self) -> impl Iterator<Item = &WorkflowDefinition> {
        self.workflows.values().map(|d| &**d)
    }

    /// Definition by name
    pub fn definition(&self, name: &str) -> Result<Arc<WorkflowDefinition>> {
        self.workflows
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownWorkflow(name.to_string()))
    }

    /// Number of runs currently executing
    #[must_use]
    pub fn active_runs(&self) -> usize {
        self.active.len()
    }

    /// Identity written into the lease of runs this engine executes
    #[must_use]
    pub fn executor_id(&self) -> &str {
        &self.executor_id
    }

    /// Start a run and drive it until it finishes or is suspended
    ///
    /// Returns the run id. A run that fails surfaces as
    /// `WorkflowStepFailure`; its failed state is persisted first.
    pub async fn start(&self, name: &str, initial_state: Map<String, Value>) -> Result<String> {
        let definition = self.definition(name)?;
        let run = self.create(name, initial_state).await?;
        let run_id = run.run_id.clone();
        self.launch(&definition, run).await?;
        Ok(run_id)
    }

    /// Start a run in the background
    pub async fn spawn(
        self: &Arc<Self>,
        name: &str,
        initial_state: Map<String, Value>,
    ) -> Result<(String, JoinHandle<Result<WorkflowRun>>)> {
        let definition = self.definition(name)?;
        let run = self.create(name, initial_state).await?;
        let run_id = run.run_id.clone();

        let engine = Arc::clone(self);
        let handle = tokio::spawn(async move { engine.launch(&definition, run).await });
        Ok((run_id, handle))
    }

    /// Resume a suspended run, or a running one whose lease has lapsed
    #[instrument(skip(self))]
    pub async fn resume(&self, run_id: &str) -> Result<WorkflowRun> {
        let mut run = self.status(run_id).await?;
        let orphaned = run.status == RunStatus::Running
            && run.lease_expired(Utc::now())
            && !self.active.contains_key(run_id);
        if run.status != RunStatus::Suspended && !orphaned {
            return Err(Error::RunNotSuspended {
                run_id: run_id.to_string(),
                status: run.status.to_string(),
            });
        }
        let definition = self.definition(&run.workflow)?;
        if orphaned {
            warn!(previous_owner = ?run.owner, "Reclaiming run with expired lease");
        }

        // claim the run; a concurrent resumer fails the version check
        run.set_status(RunStatus::Running);
        self.persist(&mut run).await?;

        info!(workflow = %run.workflow, step = run.current_step, "Resuming run");
        self.drive(&definition, run).await
    }

    /// Return running runs whose lease has lapsed to `suspended`
    ///
    /// Covers runs left behind by an executor that died without a chance
    /// to suspend them. Returns the recovered run ids.
    #[instrument(skip(self))]
    pub async fn recover(&self) -> Result<Vec<String>> {
        let mut recovered = Vec::new();
        for summary in self.store.list().await? {
            if summary.status != RunStatus::Running || self.active.contains_key(&summary.run_id) {
                continue;
            }
            let Some(mut run) = self.store.load(&summary.run_id).await? else {
                continue;
            };
            if run.status != RunStatus::Running || !run.lease_expired(Utc::now()) {
                continue;
            }

            warn!(run_id = %run.run_id, previous_owner = ?run.owner, "Lease expired, suspending run");
            run.set_status(RunStatus::Suspended);
            match self.persist(&mut run).await {
                Ok(()) => recovered.push(run.run_id),
                Err(Error::VersionConflict { .. }) => {
                    debug!(run_id = %run.run_id, "Run changed while recovering, leaving it");
                }
                Err(e) => return Err(e),
            }
        }
        if !recovered.is_empty() {
            info!(count = recovered.len(), "Recovered orphaned runs");
        }
        Ok(recovered)
    }

    /// Current persisted state of a run
    pub async fn status(&self, run_id: &str) -> Result<WorkflowRun> {
        self.store
            .load(run_id)
            .await?
            .ok_or_else(|| Error::UnknownRun(run_id.to_string()))
    }

    /// All persisted runs
    pub async fn list_runs(&self) -> Result<Vec<RunSummary>> {
        self.store.list().await
    }

    /// Abort a run; completed steps are not rolled back
    #[instrument(skip(self))]
    pub async fn abort(&self, run_id: &str) -> Result<()> {
        let control = self.active.get(run_id).map(|entry| entry.value().clone());
        if let Some(control) = control {
            info!("Aborting in-flight run");
            control.abort.store(true, Ordering::SeqCst);
            control.cancel.cancel();
            return Ok(());
        }

        let mut run = self.status(run_id).await?;
        if run.status.is_terminal() {
            return Err(Error::RunFinished {
                run_id: run_id.to_string(),
                status: run.status.to_string(),
            });
        }
        run.set_status(RunStatus::Aborted);
        self.persist(&mut run).await?;
        info!("Run aborted");
        Ok(())
    }

    async fn create(&self, name: &str, initial_state: Map<String, Value>) -> Result<WorkflowRun> {
        let mut run = WorkflowRun::new(name, initial_state);
        self.persist(&mut run).await?;
        info!(run_id = %run.run_id, workflow = %name, "Created run");
        Ok(run)
    }

    async fn launch(&self, definition: &WorkflowDefinition, mut run: WorkflowRun) -> Result<WorkflowRun> {
        run.set_status(RunStatus::Running);
        self.persist(&mut run).await?;
        self.drive(definition, run).await
    }

    /// Save with a version check, renewing the lease of a running run
    async fn persist(&self, run: &mut WorkflowRun) -> Result<()> {
        if run.status == RunStatus::Running {
            run.claim(&self.executor_id, self.config.lease_ttl);
        } else {
            run.release();
        }
        run.version = self.store.save(run, run.version).await?;
        Ok(())
    }

    async fn drive(&self, definition: &WorkflowDefinition, mut run: WorkflowRun) -> Result<WorkflowRun> {
        let control = RunControl {
            cancel: self.shutdown.child_token(),
            abort: Arc::new(AtomicBool::new(false)),
        };
        let entry = ActiveRun::insert(&self.active, &run.run_id, control.clone());

        let result = self.drive_steps(definition, &mut run, &control).await;
        drop(entry);

        result.map(|()| run)
    }

    #[instrument(skip_all, fields(run_id = %run.run_id, workflow = %definition.name))]
    async fn drive_steps(
        &self,
        definition: &WorkflowDefinition,
        run: &mut WorkflowRun,
        control: &RunControl,
    ) -> Result<()> {
        while let Some(step) = definition.steps.get(run.current_step) {
            let index = run.current_step;

            if control.abort.load(Ordering::SeqCst) {
                return self.stop(run, RunStatus::Aborted).await;
            }
            if control.cancel.is_cancelled() {
                return self.stop(run, RunStatus::Suspended).await;
            }

            if let Some(guard) = &step.when {
                if !guard.holds(&run.state) {
                    debug!(step_id = %step.id, "Guard false, skipping step");
                    self.record(run, StepOutcome::new(&step.id, index, StepStatus::Skipped, 0))
                        .await?;
                    run.advance();
                    self.persist(run).await?;
                    continue;
                }
            }

            if step.side_effecting {
                if let Some(done) = run.completed_outcome(index).cloned() {
                    info!(step_id = %step.id, "Side-effecting step already completed, not executing again");
                    merge_output(step, &mut run.state, &done.payload);
                    finish_step(step, run);
                    self.persist(run).await?;
                    continue;
                }
            }

            debug!(step_id = %step.id, target = %step.target, iteration = run.iteration, "Executing step");
            match self.execute(run, step, &control.cancel).await {
                Ok((response, attempts)) => {
                    let mut outcome = StepOutcome::new(&step.id, index, StepStatus::Completed, attempts);
                    outcome.payload = response.payload;
                    outcome.contributors = response.contributors;
                    outcome.diagnostics = response.diagnostics;

                    self.record(run, outcome.clone()).await?;
                    merge_output(step, &mut run.state, &outcome.payload);
                    finish_step(step, run);
                    self.persist(run).await?;
                    info!(step_id = %step.id, attempts = attempts, "Step completed");
                }
                Err(StepError::Interrupted) => {
                    let status = if control.abort.load(Ordering::SeqCst) {
                        RunStatus::Aborted
                    } else {
                        RunStatus::Suspended
                    };
                    return self.stop(run, status).await;
                }
                Err(StepError::Lease(error)) => {
                    warn!(step_id = %step.id, error = %error, "Lost the run lease, stopping");
                    return Err(error);
                }
                Err(StepError::Failed { error, attempts }) => {
                    if step.optional && error.is_recoverable() {
                        warn!(step_id = %step.id, attempts = attempts, error = %error, "Optional step failed, skipping");
                        let mut outcome = StepOutcome::new(&step.id, index, StepStatus::Failed, attempts);
                        outcome.diagnostics.push(Diagnostic::new(
                            step.target.to_string(),
                            DiagnosticKind::Failure,
                            error.to_string(),
                        ));
                        self.record(run, outcome).await?;
                        run.advance();
                        self.persist(run).await?;
                        continue;
                    }

                    error!(step_id = %step.id, attempts = attempts, error = %error, "Step failed, failing run");
                    let message = error.to_string();
                    run.failure = Some(FailureRecord {
                        step_id: step.id.clone(),
                        message: message.clone(),
                        attempts,
                    });
                    run.set_status(RunStatus::Failed);
                    self.persist(run).await?;
                    return Err(Error::WorkflowStepFailure {
                        run_id: run.run_id.clone(),
                        step_id: step.id.clone(),
                        message,
                    });
                }
            }
        }

        run.set_status(RunStatus::Completed);
        self.persist(run).await?;
        info!(outcomes = run.outcomes.len(), "Run completed");
        Ok(())
    }

    async fn stop(&self, run: &mut WorkflowRun, status: RunStatus) -> Result<()> {
        info!(step = run.current_step, status = %status, "Run stopped");
        run.set_status(status);
        self.persist(run).await
    }

    async fn record(&self, run: &mut WorkflowRun, outcome: StepOutcome) -> Result<()> {
        self.store
            .append_outcome(&run.run_id, &outcome, run.version)
            .await?;
        run.outcomes.push(outcome);
        Ok(())
    }

    async fn execute(
        &self,
        run: &mut WorkflowRun,
        step: &WorkflowStepSpec,
        cancel: &CancellationToken,
    ) -> std::result::Result<(TeamResponse, u32), StepError> {
        let request = build_request(&run.run_id, &step.input, &run.state)
            .map_err(|error| StepError::Failed { error, attempts: 1 })?;
        let timeout = step.timeout.unwrap_or(self.config.default_step_timeout);

        let attempts = AtomicU32::new(0);
        let attempt = retry_with_backoff(
            &step.retry,
            |n| {
                attempts.store(n, Ordering::SeqCst);
                let request = &request;
                async move {
                    let response = self.run_target(step, request, timeout, cancel).await?;
                    check_success(step, response)
                }
            },
            |e: &Error| e.is_recoverable() && !cancel.is_cancelled(),
        );

        tokio::pin!(attempt);

        let period = self.config.heartbeat_interval();
        let mut heartbeat = tokio::time::interval_at(Instant::now() + period, period);
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(StepError::Interrupted),
                result = &mut attempt => {
                    return match result {
                        Ok(response) => Ok((response, attempts.load(Ordering::SeqCst))),
                        Err(e) if matches!(e.last_error, Error::Cancelled) => Err(StepError::Interrupted),
                        Err(e) => Err(StepError::Failed {
                            error: e.last_error,
                            attempts: e.attempts,
                        }),
                    };
                }
                _ = heartbeat.tick() => {
                    self.persist(run).await.map_err(StepError::Lease)?;
                    debug!(step_id = %step.id, version = run.version, "Lease renewed");
                }
            }
        }
    }

    async fn run_target(
        &self,
        step: &WorkflowStepSpec,
        request: &Request,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<TeamResponse> {
        match &step.target {
            StepTarget::Agent(agent_id) => {
                let agent = self
                    .registry
                    .agent(agent_id)
                    .ok_or_else(|| Error::UnknownAgent(agent_id.clone()))?;
                let cx = InvocationContext::new(cancel.child_token());
                let result = invoke(agent.as_ref(), agent_id, request, &cx, timeout)
                    .await
                    .map_err(|e| match e {
                        Error::Internal(message) => Error::AgentInvocationFailure {
                            agent_id: agent_id.clone(),
                            message,
                        },
                        other => other,
                    })?;

                if result.status == AgentStatus::Failure {
                    let message = result
                        .diagnostics
                        .iter()
                        .map(|d| d.message.as_str())
                        .collect::<Vec<_>>()
                        .join("; ");
                    return Err(Error::AgentInvocationFailure {
                        agent_id: agent_id.clone(),
                        message,
                    });
                }
                Ok(TeamResponse::direct(result))
            }
            StepTarget::Team(name) => self.teams.run(name, request, cancel).await,
        }
    }
}

/// Check the step's success condition; unmet conditions are recoverable
fn check_success(step: &WorkflowStepSpec, response: TeamResponse) -> Result<TeamResponse> {
    let unmet = |message: String| Error::AgentInvocationFailure {
        agent_id: step.target.to_string(),
        message,
    };
    let condition = &step.success;

    if response.payload.is_null() {
        let detail = response
            .diagnostics
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        return Err(unmet(format!("no payload ({detail})")));
    }

    if !condition.accept_partial
        && response
            .results
            .iter()
            .any(|r| r.status == AgentStatus::Partial)
    {
        return Err(unmet("partial result not accepted".to_string()));
    }

    let missing: Vec<&str> = condition
        .require_keys
        .iter()
        .filter(|key| response.payload.get(key.as_str()).map_or(true, Value::is_null))
        .map(String::as_str)
        .collect();
    if !missing.is_empty() {
        return Err(unmet(format!("payload missing keys: {}", missing.join(", "))));
    }

    if let Some(min) = condition.min_confidence {
        let confidence = response.confidence();
        if confidence < min {
            return Err(unmet(format!("confidence {confidence:.2} below {min:.2}")));
        }
    }

    Ok(response)
}

/// Fold a step payload into run state
fn merge_output(step: &WorkflowStepSpec, state: &mut Map<String, Value>, payload: &Value) {
    if payload.is_null() {
        return;
    }
    match (&step.output_key, payload) {
        (Some(key), value) => {
            state.insert(key.clone(), value.clone());
        }
        (None, Value::Object(fields)) => {
            for (key, value) in fields {
                state.insert(key.clone(), value.clone());
            }
        }
        (None, value) => {
            state.insert(step.id.clone(), value.clone());
        }
    }
}

/// Advance past a completed step, or repeat it while its `until` fails
fn finish_step(step: &WorkflowStepSpec, run: &mut WorkflowRun) {
    if let Some(until) = &step.until {
        let done = until.condition.holds(&run.state);
        if !done && run.iteration + 1 < until.max_iterations {
            run.repeat();
            return;
        }
        if !done {
            warn!(step_id = %step.id, max_iterations = until.max_iterations, "Repeat limit reached, moving on");
        }
    }
    run.advance();
}
