//! CLI command definitions

use crate::core::EventKind;
use crate::execution::SchedulingStrategy;
use clap::Args;
use std::path::PathBuf;

/// Run a workflow
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    /// Workflow YAML file (defaults to the repository's workflow, else the built-in one)
    #[arg(short, long)]
    pub file: Option<PathBuf>,

    /// Repository event to simulate (push, pull_request, ...)
    #[arg(long, default_value = "push")]
    pub event: EventKind,

    /// Branch the event refers to
    #[arg(long)]
    pub branch: Option<String>,

    /// Repository directory to check out into each job
    #[arg(long, default_value = ".")]
    pub repo: PathBuf,

    /// Only run these jobs
    #[arg(long)]
    pub job: Vec<String>,

    /// Environment overrides (KEY=VALUE)
    #[arg(long, value_parser = parse_key_value)]
    pub env: Vec<(String, String)>,

    /// Scheduling strategy: parallel, sequential or parallel-limited[=N]
    #[arg(long, default_value = "parallel")]
    pub strategy: SchedulingStrategy,

    /// Create job workspaces under this directory
    #[arg(long)]
    pub workspace_dir: Option<PathBuf>,

    /// Don't save the run to history
    #[arg(long)]
    pub no_history: bool,
}

/// Validate a workflow configuration
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Workflow YAML file (defaults to the repository's workflow, else the built-in one)
    #[arg(short, long)]
    pub file: Option<PathBuf>,

    /// Repository directory used to find the default workflow
    #[arg(long, default_value = ".")]
    pub repo: PathBuf,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// List workflows with recorded runs
#[derive(Debug, Args, Clone)]
pub struct ListCommand {
    /// Show run counts
    #[arg(long)]
    pub with_counts: bool,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Show run history
#[derive(Debug, Args, Clone)]
pub struct HistoryCommand {
    /// Workflow name to filter by
    #[arg(short, long)]
    pub workflow: Option<String>,

    /// Number of recent runs to show
    #[arg(short, long, default_value_t = 10)]
    pub limit: usize,

    /// Show full details
    #[arg(long)]
    pub verbose: bool,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,

    /// Show a single run
    #[arg(long)]
    pub execution_id: Option<String>,

    /// Delete a run from history
    #[arg(long, value_name = "EXECUTION_ID")]
    pub delete: Option<String>,
}

/// Parse KEY=VALUE pairs
pub fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("Invalid KEY=VALUE pair: {}", s)),
    }
}
