//! Command execution
//!
//! Builds the runtime from configuration and dispatches CLI commands.
//! Orchestration errors are shown through their user-facing rendering;
//! only setup problems propagate as `anyhow` errors.

use crate::cli::{Cli, Commands, WorkflowCommand};
use crate::settings::AppConfig;
use anyhow::{bail, Context, Result};
use pacer_core::shutdown::shutdown_on_signal;
use pacer_core::{
    format_error_for_cli, Error, Request, RunStatus, Runtime, ShutdownController, TeamResponse,
    WorkflowRun,
};
use serde_json::{Map, Value};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, info};

/// Run one CLI invocation
pub async fn run(cli: Cli, config: AppConfig) -> Result<ExitCode> {
    let Some(command) = cli.command else {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        cmd.print_help()?;
        println!();
        return Ok(ExitCode::SUCCESS);
    };

    let shutdown = ShutdownController::new();
    let runtime = config
        .pacer
        .build(shutdown.token())
        .await
        .context("Failed to build orchestration runtime")?;
    info!(
        agents = runtime.registry.len(),
        version = env!("CARGO_PKG_VERSION"),
        "Pacer ready"
    );

    tokio::spawn(shutdown_on_signal(Arc::clone(&shutdown)));
    let work = shutdown.register_task();

    let outcome = execute(command, &runtime, &shutdown).await;
    drop(work);

    match outcome {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(Failure::Core(e)) => {
            eprintln!("{}", format_error_for_cli(&e));
            Ok(ExitCode::FAILURE)
        }
        Err(Failure::Setup(e)) => Err(e),
    }
}

enum Failure {
    Core(Error),
    Setup(anyhow::Error),
}

impl From<Error> for Failure {
    fn from(e: Error) -> Self {
        Self::Core(e)
    }
}

impl From<anyhow::Error> for Failure {
    fn from(e: anyhow::Error) -> Self {
        Self::Setup(e)
    }
}

async fn execute(
    command: Commands,
    runtime: &Runtime,
    shutdown: &ShutdownController,
) -> std::result::Result<(), Failure> {
    match command {
        Commands::Ask {
            text,
            capability,
            agent,
            session,
            profile,
            json,
        } => {
            let mut request = Request::text(
                session.unwrap_or_else(|| format!("cli-{}", uuid::Uuid::new_v4())),
                text.join(" "),
            )
            .with_profile(parse_object(profile.as_deref(), "--profile")?);
            if let Some(capability) = capability {
                request = request.with_capability_hint(capability);
            }
            if let Some(agent) = agent {
                request = request.with_agent_hint(agent);
            }

            match runtime
                .coordinator
                .handle_cancellable(&request, &shutdown.token())
                .await
            {
                Ok(response) => print_response(&response, json)?,
                // the fallback message is the answer, not a failure
                Err(e @ Error::NoCapableAgent { .. }) => println!("{}", format_error_for_cli(&e)),
                Err(e) => return Err(e.into()),
            }
        }
        Commands::Agents => {
            for descriptor in runtime.registry.descriptors() {
                let capabilities: Vec<&str> =
                    descriptor.capabilities.iter().map(|c| c.as_str()).collect();
                println!(
                    "{:<20} priority {:<3} {:<9} {}",
                    descriptor.id,
                    descriptor.priority,
                    descriptor.tier,
                    capabilities.join(", ")
                );
            }
        }
        Commands::Workflows => {
            for definition in runtime.engine.workflows() {
                println!("{}  {}", definition.name, definition.description);
                for (index, step) in definition.steps.iter().enumerate() {
                    println!("  {}. {:<24} {}", index + 1, step.id, step.target);
                }
            }
        }
        Commands::Workflow(command) => workflow(command, runtime).await?,
    }
    Ok(())
}

async fn workflow(command: WorkflowCommand, runtime: &Runtime) -> std::result::Result<(), Failure> {
    let engine = &runtime.engine;
    // runs left behind by a killed process become resumable again
    for run_id in engine.recover().await? {
        eprintln!("Run {run_id} lost its executor and was suspended");
    }
    match command {
        WorkflowCommand::Start { name, input } => {
            let state = parse_object(input.as_deref(), "--input")?;
            let run_id = engine.start(&name, state).await?;
            print_run(runtime, &engine.status(&run_id).await?);
        }
        WorkflowCommand::Resume { run_id } => {
            let run = engine.resume(&run_id).await?;
            print_run(runtime, &run);
        }
        WorkflowCommand::Status { run_id, json } => {
            let run = engine.status(&run_id).await?;
            if json {
                println!("{}", to_pretty(&run)?);
            } else {
                print_run(runtime, &run);
            }
        }
        WorkflowCommand::Abort { run_id } => {
            engine.abort(&run_id).await?;
            println!("Run {run_id} aborted");
        }
        WorkflowCommand::Runs => {
            let runs = engine.list_runs().await?;
            if runs.is_empty() {
                println!("No workflow runs yet");
            }
            for run in runs {
                println!(
                    "{}  {:<16} {:<10} step {}  {}",
                    run.run_id,
                    run.workflow,
                    run.status,
                    run.current_step,
                    run.updated_at.format("%Y-%m-%d %H:%M:%S")
                );
            }
        }
    }
    Ok(())
}

fn print_response(response: &TeamResponse, json: bool) -> Result<()> {
    if json {
        println!("{}", to_pretty(response)?);
        return Ok(());
    }
    println!("{}", response.render());
    debug!(diagnostics = response.diagnostics.len(), "Response rendered");
    println!(
        "\n[{} | confidence {:.2}]",
        response.contributors.join(", "),
        response.confidence()
    );
    for diagnostic in &response.diagnostics {
        eprintln!("  ! {}: {}", diagnostic.agent_id, diagnostic.message);
    }
    Ok(())
}

fn print_run(runtime: &Runtime, run: &WorkflowRun) {
    let total = runtime
        .engine
        .definition(&run.workflow)
        .map(|d| d.steps.len())
        .unwrap_or_default();
    println!(
        "Run {} ({}): {}, step {}/{}",
        run.run_id, run.workflow, run.status, run.current_step, total
    );
    match run.status {
        RunStatus::Suspended => println!("Resume with `pacer workflow resume {}`", run.run_id),
        RunStatus::Failed => {
            if let Some(failure) = &run.failure {
                println!(
                    "Step '{}' failed after {} attempt(s): {}",
                    failure.step_id, failure.attempts, failure.message
                );
            }
        }
        _ => {}
    }
    if !run.state.is_empty() {
        println!(
            "{}",
            serde_json::to_string_pretty(&run.state).unwrap_or_default()
        );
    }
}

fn to_pretty<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).context("Failed to serialize output")
}

/// Parse a JSON object given on the command line
fn parse_object(raw: Option<&str>, flag: &str) -> Result<Map<String, Value>> {
    let Some(raw) = raw else {
        return Ok(Map::new());
    };
    match serde_json::from_str(raw).with_context(|| format!("{flag} is not valid JSON"))? {
        Value::Object(fields) => Ok(fields),
        _ => bail!("{flag} must be a JSON object"),
    }
}
