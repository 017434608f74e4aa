use anyhow::{Context, Result};
use ci_runner::cli::commands::{HistoryCommand, ListCommand, RunCommand, ValidateCommand};
use ci_runner::cli::output::*;
use ci_runner::cli::{Cli, Command};
use ci_runner::core::config::WorkflowConfig;
use ci_runner::core::{EnvironmentConfig, ExecutionStatus, RepositoryEvent};
use ci_runner::execution::{ExecutionEvent, RepositorySnapshot, WorkflowEngine};
use ci_runner::persistence::{
    create_summary, ExecutionSummary, InMemoryPersistence, PersistenceBackend,
};
use ci_runner::shell::SubprocessExecutor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging; RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set logging subscriber")?;

    let success = match &cli.command {
        Command::Run(cmd) => run_workflow(cmd, &cli).await?,
        Command::Validate(cmd) => validate_workflow(cmd)?,
        Command::List(cmd) => list_workflows(cmd, &cli).await?,
        Command::History(cmd) => show_history(cmd, &cli).await?,
    };

    if !success {
        std::process::exit(1);
    }

    Ok(())
}

/// Open the run history: SQLite when available, otherwise in memory only
async fn open_store(history_db: Option<&Path>) -> Result<Arc<dyn PersistenceBackend>> {
    #[cfg(feature = "sqlite")]
    {
        use ci_runner::persistence::SqliteExecutionStore;

        let store = match history_db {
            Some(path) => SqliteExecutionStore::new(path).await?,
            None => SqliteExecutionStore::with_default_path().await?,
        };
        Ok(Arc::new(store))
    }

    #[cfg(not(feature = "sqlite"))]
    {
        if history_db.is_some() {
            warn!("Built without the sqlite feature; history is not persisted");
        }
        Ok(Arc::new(InMemoryPersistence::new()))
    }
}

/// Resolve the workflow file and load it, falling back to the built-in workflow
fn load_workflow(file: Option<&Path>, repo: &Path) -> Result<(WorkflowConfig, String)> {
    match WorkflowConfig::discover(file, repo) {
        Some(path) => {
            let config = WorkflowConfig::from_file(&path)
                .with_context(|| format!("Failed to load workflow {}", path.display()))?;
            Ok((config, path.display().to_string()))
        }
        None => Ok((WorkflowConfig::builtin()?, "built-in".to_string())),
    }
}

async fn run_workflow(cmd: &RunCommand, cli: &Cli) -> Result<bool> {
    let repo: PathBuf = cmd
        .repo
        .canonicalize()
        .with_context(|| format!("Repository {} not found", cmd.repo.display()))?;
    let snapshot = RepositorySnapshot::new(&repo)?;

    let (config, source) = load_workflow(cmd.file.as_deref(), &repo)?;
    println!(
        "{} Loaded workflow: {} ({})",
        INFO,
        style(&config.name).bold(),
        style(&source).dim()
    );

    let workflow = config.to_workflow()?.select_jobs(&cmd.job)?;

    let mut env_config = EnvironmentConfig::from_host();
    for (key, value) in &cmd.env {
        env_config = env_config.with_override(key.clone(), value.clone());
        println!(
            "{} Environment override: {} = {}",
            INFO,
            style(key).cyan(),
            style(value).dim()
        );
    }

    let mut event = RepositoryEvent::new(cmd.event.clone());
    if let Some(branch) = &cmd.branch {
        event = event.with_branch(branch.clone());
    }

    // Set up persistence
    let store: Arc<dyn PersistenceBackend> = if cmd.no_history {
        Arc::new(InMemoryPersistence::new())
    } else {
        open_store(cli.history_db.as_deref()).await?
    };

    let progress = create_progress_bar(workflow.jobs.len());
    let stream = cli.stream;
    let bar = progress.clone();

    let mut engine = WorkflowEngine::new(SubprocessExecutor::new(), cmd.strategy)
        .with_environment(env_config)
        .with_event_handler(move |event| {
            match &event {
                ExecutionEvent::StepOutput { output, .. } => {
                    if stream {
                        bar.println(format_output(output, 20));
                    }
                    return;
                }
                ExecutionEvent::JobCompleted { job_id, .. } => {
                    bar.inc(1);
                    bar.set_message(job_id.clone());
                }
                _ => {}
            }
            bar.println(format_execution_event(&event));
        });
    if let Some(dir) = &cmd.workspace_dir {
        engine = engine.with_workspace_base(dir.clone());
    }

    println!();
    let run = engine.execute(&workflow, &event, &snapshot).await;
    progress.finish_and_clear();

    if run.status == ExecutionStatus::NotTriggered {
        println!(
            "\n{} {} ignores {} events; nothing to do",
            SKIP,
            style(&run.workflow_name).bold(),
            style(&run.event).cyan()
        );
        return Ok(true);
    }

    println!("\n{}", separator());
    for job in &run.jobs {
        println!("{}", format_job_report(job));
    }
    println!("{}", separator());

    // Save to history
    if !cmd.no_history {
        let summary = create_summary(&run);
        match store.save_execution(&summary).await {
            Ok(()) => println!(
                "{} Run saved to history (ID: {})",
                INFO,
                style(&summary.execution_id.to_string()[..8]).dim()
            ),
            Err(e) => warn!("Failed to save run to history: {:#}", e),
        }
    }

    // Print final status
    if run.is_success() {
        println!(
            "\n{} {} {}",
            CHECK,
            style(&run.workflow_name).bold(),
            style("passed").green()
        );
    } else {
        let failed: Vec<_> = run.failed_jobs().iter().map(|j| j.name.clone()).collect();
        println!(
            "\n{} {} {} ({})",
            CROSS,
            style(&run.workflow_name).bold(),
            style("failed").red(),
            failed.join(", ")
        );
    }

    Ok(run.is_success())
}

fn validate_workflow(cmd: &ValidateCommand) -> Result<bool> {
    println!("{} Validating workflow...", INFO);

    match load_workflow(cmd.file.as_deref(), &cmd.repo) {
        Ok((config, source)) => {
            println!("{} Workflow configuration is valid!", CHECK);
            println!("  Source: {}", style(&source).dim());
            println!("  Name: {}", style(&config.name).bold());
            println!("  Triggers: {}", style(config.trigger_names().join(", ")).cyan());
            println!("  Jobs: {}", style(config.jobs.len()).cyan());
            for (id, job) in config.jobs.iter() {
                println!(
                    "    {} ({} steps)",
                    style(job.name.as_deref().unwrap_or(id)).bold(),
                    job.steps.len()
                );
            }

            if cmd.json {
                let json = serde_json::to_string_pretty(&config)?;
                println!("\n{}", json);
            }
            Ok(true)
        }
        Err(e) => {
            println!("{} Validation failed:", CROSS);
            println!("  {}", style(format!("{:#}", e)).red());
            Ok(false)
        }
    }
}

async fn list_workflows(cmd: &ListCommand, cli: &Cli) -> Result<bool> {
    let store = open_store(cli.history_db.as_deref()).await?;
    let workflows = store.list_workflows().await?;

    if cmd.json {
        let mut json_data = Vec::new();
        for workflow in &workflows {
            let executions = store.list_executions(workflow).await?;
            json_data.push(serde_json::json!({
                "name": workflow,
                "execution_count": executions.len(),
                "passed": executions.iter().filter(|e| e.status == ExecutionStatus::Succeeded).count(),
                "failed": executions.iter().filter(|e| e.status == ExecutionStatus::Failed).count(),
            }));
        }
        let data = serde_json::json!({ "workflows": json_data });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(true);
    }

    if workflows.is_empty() {
        println!("{} No workflows found in history", INFO);
        return Ok(true);
    }

    println!("{} Workflows in history:", INFO);

    for workflow_name in &workflows {
        if cmd.with_counts {
            let executions = store.list_executions(workflow_name).await?;
            let passed = executions
                .iter()
                .filter(|e| e.status == ExecutionStatus::Succeeded)
                .count();
            let failed = executions
                .iter()
                .filter(|e| e.status == ExecutionStatus::Failed)
                .count();
            println!(
                "  {} ({} runs: {} passed, {} failed)",
                style(workflow_name).bold(),
                style(executions.len()).cyan(),
                style(passed).green(),
                style(failed).red()
            );
        } else {
            println!("  {}", style(workflow_name).bold());
        }
    }

    Ok(true)
}

async fn show_history(cmd: &HistoryCommand, cli: &Cli) -> Result<bool> {
    let store = open_store(cli.history_db.as_deref()).await?;

    if let Some(exec_id_str) = &cmd.delete {
        let exec_id =
            uuid::Uuid::parse_str(exec_id_str).context("Invalid execution ID format")?;
        if store.delete_execution(exec_id).await? {
            println!("{} Deleted run {}", CHECK, style(exec_id).cyan());
            return Ok(true);
        }
        println!("{} Run not found", WARN);
        return Ok(false);
    }

    // If specific execution ID is requested
    if let Some(exec_id_str) = &cmd.execution_id {
        let exec_id =
            uuid::Uuid::parse_str(exec_id_str).context("Invalid execution ID format")?;

        return match store.load_execution(exec_id).await? {
            Some(summary) if cmd.json => {
                println!("{}", serde_json::to_string_pretty(&summary)?);
                Ok(true)
            }
            Some(summary) => {
                print_execution_details(&summary, cmd.verbose)?;
                Ok(true)
            }
            None => {
                println!("{} Run not found", WARN);
                Ok(false)
            }
        };
    }

    // List runs for one workflow or all of them
    let mut executions = match &cmd.workflow {
        Some(workflow_name) => store.list_executions(workflow_name).await?,
        None => {
            let mut all_execs = Vec::new();
            for workflow in store.list_workflows().await? {
                all_execs.extend(store.list_executions(&workflow).await?);
            }
            all_execs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
            all_execs
        }
    };
    executions.truncate(cmd.limit);
    debug!("Showing {} runs", executions.len());

    if cmd.json {
        let data = serde_json::json!({ "executions": executions });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(true);
    }

    if executions.is_empty() {
        println!("{} No runs found", INFO);
        return Ok(true);
    }

    println!("{} Run history (showing latest {}):", INFO, cmd.limit);
    for summary in &executions {
        println!("  {}", format_execution_summary(summary));
        if cmd.verbose {
            for job in &summary.jobs {
                let detail = match (&job.failed_step, &job.error) {
                    (Some(step), Some(error)) => format!(" - {}: {}", step, error),
                    (None, Some(error)) => format!(" - {}", error),
                    _ => String::new(),
                };
                println!(
                    "      {} {}{}",
                    format_status(job.status),
                    job.name,
                    style(detail).dim()
                );
            }
        }
    }

    Ok(true)
}

fn print_execution_details(summary: &ExecutionSummary, verbose: bool) -> Result<()> {
    println!("{} Run Details", INFO);
    println!("  ID: {}", style(summary.execution_id).cyan());
    println!("  Workflow: {}", style(&summary.workflow_name).bold());
    println!("  Event: {}", style(&summary.event).cyan());
    println!("  Status: {}", format_status(summary.status));
    println!("  Started: {}", style(summary.started_at.to_rfc3339()).dim());
    if let Some(completed) = summary.completed_at {
        println!("  Completed: {}", style(completed.to_rfc3339()).dim());
    }
    if let Some(duration) = summary.duration() {
        println!("  Duration: {}", style(format_duration(duration)).dim());
    }
    println!(
        "  Jobs: {}/{} passed",
        style(summary.passed_jobs()).cyan(),
        summary.jobs.len()
    );
    for job in &summary.jobs {
        println!("    {} {}", format_status(job.status), style(&job.name).bold());
        if let Some(step) = &job.failed_step {
            println!("      failed at: {}", step);
        }
        if let Some(error) = &job.error {
            println!("      {}", style(error).red());
        }
    }

    if verbose {
        println!("\n  {}", style("Full details:").bold());
        let json = serde_json::to_string_pretty(summary)?;
        for line in json.lines() {
            println!("    {}", line);
        }
    }

    Ok(())
}
