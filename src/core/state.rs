//! Execution state models

use crate::core::{trigger::RepositoryEvent, workflow::Job};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Status of a job or of a whole workflow run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    /// Not started yet
    Pending,
    /// Currently running
    Running,
    /// Finished and every step passed
    Succeeded,
    /// Finished with at least one failure
    Failed,
    /// The event didn't match the trigger set, nothing ran
    NotTriggered,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Pending => "Pending",
            ExecutionStatus::Running => "Running",
            ExecutionStatus::Succeeded => "Succeeded",
            ExecutionStatus::Failed => "Failed",
            ExecutionStatus::NotTriggered => "NotTriggered",
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Succeeded | ExecutionStatus::Failed | ExecutionStatus::NotTriggered
        )
    }
}

impl FromStr for ExecutionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(ExecutionStatus::Pending),
            "Running" => Ok(ExecutionStatus::Running),
            "Succeeded" => Ok(ExecutionStatus::Succeeded),
            "Failed" => Ok(ExecutionStatus::Failed),
            "NotTriggered" => Ok(ExecutionStatus::NotTriggered),
            other => Err(format!("Unknown execution status: {}", other)),
        }
    }
}

/// State of a single step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StepState {
    /// Step hasn't run yet
    Pending,
    /// Step is currently running
    Running { started_at: DateTime<Utc> },
    /// Step completed successfully
    Succeeded {
        exit_code: Option<i32>,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
    },
    /// Step failed; the rest of the job was aborted
    Failed {
        error: String,
        exit_code: Option<i32>,
        started_at: DateTime<Utc>,
        failed_at: DateTime<Utc>,
    },
    /// Step never ran because an earlier step failed
    Skipped { reason: String },
}

impl StepState {
    /// Check if step is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepState::Succeeded { .. } | StepState::Failed { .. } | StepState::Skipped { .. }
        )
    }
}

/// Report for one step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRun {
    pub index: usize,
    pub name: String,
    pub state: StepState,

    /// Captured standard output
    #[serde(default)]
    pub stdout: String,

    /// Captured standard error
    #[serde(default)]
    pub stderr: String,
}

/// Report for one job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRun {
    pub job_id: String,
    pub name: String,
    pub runs_on: String,
    pub status: ExecutionStatus,
    pub steps: Vec<StepRun>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,

    /// Failure that happened outside of any step (e.g. environment setup)
    pub error: Option<String>,
}

impl JobRun {
    /// Create a pending report for a job
    pub fn new(job: &Job) -> Self {
        Self {
            job_id: job.id.clone(),
            name: job.name.clone(),
            runs_on: job.runs_on.clone(),
            status: ExecutionStatus::Pending,
            steps: job
                .steps
                .iter()
                .map(|step| StepRun {
                    index: step.index,
                    name: step.name.clone(),
                    state: StepState::Pending,
                    stdout: String::new(),
                    stderr: String::new(),
                })
                .collect(),
            started_at: None,
            completed_at: None,
            error: None,
        }
    }

    /// Mark job as started
    pub fn start(&mut self) {
        self.status = ExecutionStatus::Running;
        self.started_at = Some(Utc::now());
    }

    /// Mark job as failed before or outside of its steps
    pub fn fail(&mut self, error: impl Into<String>) {
        self.error = Some(error.into());
        self.status = ExecutionStatus::Failed;
        self.completed_at = Some(Utc::now());
        for step in &mut self.steps {
            if !step.state.is_terminal() {
                step.state = StepState::Skipped {
                    reason: "job failed".to_string(),
                };
            }
        }
    }

    /// Settle the job status from its steps
    pub fn finish(&mut self) {
        self.status = if self.error.is_some() || self.failed_step().is_some() {
            ExecutionStatus::Failed
        } else {
            ExecutionStatus::Succeeded
        };
        self.completed_at = Some(Utc::now());
    }

    pub fn failed_step(&self) -> Option<&StepRun> {
        self.steps
            .iter()
            .find(|s| matches!(s.state, StepState::Failed { .. }))
    }

    pub fn succeeded(&self) -> bool {
        self.status == ExecutionStatus::Succeeded
    }

    pub fn duration(&self) -> Option<std::time::Duration> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => end.signed_duration_since(start).to_std().ok(),
            _ => None,
        }
    }
}

/// Report for a whole workflow run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRun {
    /// Unique execution ID
    pub execution_id: Uuid,

    pub workflow_name: String,

    /// Event that was evaluated
    pub event: RepositoryEvent,

    /// Aggregate status
    pub status: ExecutionStatus,

    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,

    /// Per-job reports, in declaration order
    pub jobs: Vec<JobRun>,
}

impl WorkflowRun {
    pub fn new(workflow_name: impl Into<String>, event: RepositoryEvent) -> Self {
        Self {
            execution_id: Uuid::new_v4(),
            workflow_name: workflow_name.into(),
            event,
            status: ExecutionStatus::Pending,
            started_at: Utc::now(),
            completed_at: None,
            jobs: Vec::new(),
        }
    }

    /// Mark workflow as started
    pub fn start(&mut self) {
        self.status = ExecutionStatus::Running;
        self.started_at = Utc::now();
    }

    /// Record that the event didn't match the trigger set
    pub fn not_triggered(&mut self) {
        self.status = ExecutionStatus::NotTriggered;
        self.completed_at = Some(Utc::now());
    }

    /// Aggregate job results: failed if and only if any job failed
    pub fn complete(&mut self, jobs: Vec<JobRun>) {
        self.jobs = jobs;
        self.status = if self.jobs.iter().any(|j| j.status == ExecutionStatus::Failed) {
            ExecutionStatus::Failed
        } else {
            ExecutionStatus::Succeeded
        };
        self.completed_at = Some(Utc::now());
    }

    /// True unless some job failed
    pub fn is_success(&self) -> bool {
        self.status != ExecutionStatus::Failed
    }

    pub fn job(&self, job_id: &str) -> Option<&JobRun> {
        self.jobs.iter().find(|j| j.job_id == job_id)
    }

    pub fn failed_jobs(&self) -> Vec<&JobRun> {
        self.jobs
            .iter()
            .filter(|j| j.status == ExecutionStatus::Failed)
            .collect()
    }

    /// Calculate progress (0.0 to 1.0)
    pub fn progress(&self) -> f64 {
        if self.jobs.is_empty() {
            return 0.0;
        }
        let finished = self.jobs.iter().filter(|j| j.status.is_finished()).count();
        finished as f64 / self.jobs.len() as f64
    }
}
