//! Command line interface

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Multi-agent coaching orchestrator
#[derive(Parser, Debug)]
#[command(name = "pacer")]
#[command(about = "Multi-agent coaching orchestrator")]
#[command(version)]
pub struct Cli {
    /// Extra configuration file, applied after the built-in layers
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Send a request to the coordinator
    Ask {
        /// Request text
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
        /// Route straight to agents with this capability
        #[arg(long)]
        capability: Option<String>,
        /// Route straight to this agent
        #[arg(long, conflicts_with = "capability")]
        agent: Option<String>,
        /// Session id (random when absent)
        #[arg(long)]
        session: Option<String>,
        /// Profile facts as a JSON object
        #[arg(long)]
        profile: Option<String>,
        /// Print the full response as JSON
        #[arg(long)]
        json: bool,
    },
    /// List registered agents
    Agents,
    /// List workflow definitions
    Workflows,
    /// Manage workflow runs
    #[command(subcommand)]
    Workflow(WorkflowCommand),
}

#[derive(Subcommand, Debug)]
pub enum WorkflowCommand {
    /// Start a run and drive it in the foreground
    Start {
        /// Workflow name
        name: String,
        /// Initial run state as a JSON object
        #[arg(long)]
        input: Option<String>,
    },
    /// Resume a suspended run, or a running one whose lease has expired
    Resume {
        /// Run id
        run_id: String,
    },
    /// Show a run
    Status {
        /// Run id
        run_id: String,
        /// Print the full run as JSON
        #[arg(long)]
        json: bool,
    },
    /// Abort a run
    Abort {
        /// Run id
        run_id: String,
    },
    /// List persisted runs
    Runs,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_ask_with_hint() {
        let cli = Cli::parse_from(["pacer", "ask", "--capability", "recovery-assessment", "legs", "sore"]);
        match cli.command {
            Some(Commands::Ask { text, capability, .. }) => {
                assert_eq!(text, vec!["legs", "sore"]);
                assert_eq!(capability.as_deref(), Some("recovery-assessment"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_workflow_start() {
        let cli = Cli::parse_from([
            "pacer",
            "--config",
            "coach.toml",
            "workflow",
            "start",
            "daily-checkin",
            "--input",
            r#"{"user":"u1"}"#,
        ]);
        assert_eq!(cli.config, Some(PathBuf::from("coach.toml")));
        assert!(matches!(
            cli.command,
            Some(Commands::Workflow(WorkflowCommand::Start { ref name, .. })) if name == "daily-checkin"
        ));
    }
}
