//! CLI output formatting

use crate::{
    core::{ExecutionStatus, JobRun, StepRun, StepState},
    execution::ExecutionEvent,
    persistence::ExecutionSummary,
};
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static SKIP: Emoji<'_, '_> = Emoji("⏭️  ", "- ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "! ");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");

/// Create a progress bar counting finished jobs
pub fn create_progress_bar(total: usize) -> ProgressBar {
    let progress = ProgressBar::new(total as u64);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} jobs {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    progress.set_style(style);
    progress.enable_steady_tick(Duration::from_millis(100));
    progress
}

/// Horizontal rule spanning the terminal width
pub fn separator() -> String {
    let width = term_size::dimensions_stdout()
        .map(|(w, _)| w)
        .unwrap_or(80)
        .min(120);
    style("─".repeat(width)).dim().to_string()
}

/// Format a step state for display
pub fn format_step_state(state: &StepState) -> String {
    match state {
        StepState::Pending => style("PENDING").dim().to_string(),
        StepState::Running { .. } => style("RUNNING").yellow().to_string(),
        StepState::Succeeded { .. } => style("PASSED").green().to_string(),
        StepState::Failed { .. } => style("FAILED").red().to_string(),
        StepState::Skipped { .. } => style("SKIPPED").dim().to_string(),
    }
}

/// Format an execution status for display
pub fn format_status(status: ExecutionStatus) -> String {
    match status {
        ExecutionStatus::Pending => style("PENDING").dim().to_string(),
        ExecutionStatus::Running => style("RUNNING").yellow().to_string(),
        ExecutionStatus::Succeeded => style("PASSED").green().to_string(),
        ExecutionStatus::Failed => style("FAILED").red().to_string(),
        ExecutionStatus::NotTriggered => style("NOT TRIGGERED").blue().to_string(),
    }
}

fn status_icon(status: ExecutionStatus) -> Emoji<'static, 'static> {
    match status {
        ExecutionStatus::Succeeded => CHECK,
        ExecutionStatus::Failed => CROSS,
        ExecutionStatus::Running => SPINNER,
        ExecutionStatus::NotTriggered => SKIP,
        ExecutionStatus::Pending => INFO,
    }
}

fn short_id(id: &uuid::Uuid) -> String {
    id.to_string()[..8].to_string()
}

/// Format a history entry for display
pub fn format_execution_summary(summary: &ExecutionSummary) -> String {
    format!(
        "{} {} - {} - {} - {} ({}/{} jobs passed) - {}",
        status_icon(summary.status),
        style(short_id(&summary.execution_id)).dim(),
        style(&summary.workflow_name).bold(),
        style(&summary.event).cyan(),
        format_status(summary.status),
        summary.passed_jobs(),
        summary.jobs.len(),
        style(summary.started_at.format("%Y-%m-%d %H:%M:%S")).dim()
    )
}

/// Format an execution event for display
pub fn format_execution_event(event: &ExecutionEvent) -> String {
    match event {
        ExecutionEvent::WorkflowStarted {
            execution_id,
            workflow_name,
            event,
            jobs,
        } => format!(
            "{} Starting workflow {} on {} with {} jobs ({})",
            ROCKET,
            style(workflow_name).bold(),
            style(event).cyan(),
            jobs,
            style(short_id(execution_id)).dim()
        ),
        ExecutionEvent::WorkflowSkipped {
            workflow_name,
            event,
            ..
        } => format!(
            "{} Workflow {} is not triggered by {}",
            SKIP,
            style(workflow_name).bold(),
            style(event).cyan()
        ),
        ExecutionEvent::JobStarted { job_id, name } => {
            format!("{} [{}] {}", SPINNER, style(job_id).cyan(), style(name).bold())
        }
        ExecutionEvent::StepStarted {
            job_id, step_name, ..
        } => format!("  {} [{}] {}", SPINNER, style(job_id).dim(), step_name),
        ExecutionEvent::StepOutput { job_id, output, .. } => {
            format!("  {} Output from {}:\n{}", INFO, style(job_id).dim(), output)
        }
        ExecutionEvent::StepSucceeded {
            job_id, step_name, ..
        } => format!("  {} [{}] {}", CHECK, style(job_id).dim(), style(step_name).green()),
        ExecutionEvent::StepFailed {
            job_id,
            step_name,
            error,
            ..
        } => format!(
            "  {} [{}] {}: {}",
            CROSS,
            style(job_id).dim(),
            style(step_name).red(),
            style(error).dim()
        ),
        ExecutionEvent::StepSkipped {
            job_id, step_name, ..
        } => format!("  {} [{}] {}", SKIP, style(job_id).dim(), style(step_name).dim()),
        ExecutionEvent::JobCompleted { job_id, status } => format!(
            "{} [{}] {}",
            status_icon(*status),
            style(job_id).cyan(),
            format_status(*status)
        ),
        ExecutionEvent::WorkflowCompleted {
            execution_id,
            status,
        } => {
            let status_str = match status {
                ExecutionStatus::Succeeded => format!("{}", style("passed").green()),
                ExecutionStatus::Failed => style("failed").red().to_string(),
                other => other.as_str().to_string(),
            };
            format!(
                "{} Workflow ({}) {}",
                INFO,
                style(short_id(execution_id)).dim(),
                status_str
            )
        }
    }
}

fn format_step_line(step: &StepRun) -> String {
    let detail = match &step.state {
        StepState::Failed { error, .. } => format!(" - {}", style(error).red()),
        StepState::Skipped { reason } => format!(" - {}", style(reason).dim()),
        _ => String::new(),
    };
    format!(
        "    {:>2}. {} {}{}",
        step.index + 1,
        format_step_state(&step.state),
        step.name,
        detail
    )
}

/// Per-job report block: one header line and one line per step
pub fn format_job_report(job: &JobRun) -> String {
    let duration = job
        .duration()
        .map(|d| format!(" in {}", format_duration(d)))
        .unwrap_or_default();

    let mut lines = vec![format!(
        "  {} {} ({}) {}{}",
        status_icon(job.status),
        style(&job.name).bold(),
        style(&job.runs_on).dim(),
        format_status(job.status),
        style(duration).dim()
    )];
    if let Some(error) = &job.error {
        lines.push(format!("    {}", style(error).red()));
    }
    lines.extend(job.steps.iter().map(format_step_line));
    lines.join("\n")
}

/// Format step output with truncation
pub fn format_output(output: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = output.lines().collect();

    if lines.len() <= max_lines {
        output.to_string()
    } else {
        let truncated = lines[lines.len() - max_lines..].join("\n");
        format!(
            "{}... ({} earlier lines)\n{}",
            style("[truncated]").dim(),
            lines.len() - max_lines,
            truncated
        )
    }
}

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
