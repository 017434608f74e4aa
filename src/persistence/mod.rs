//! Persistence layer for workflow run history

#[cfg(feature = "sqlite")]
pub mod store;

#[cfg(feature = "sqlite")]
pub use store::SqliteExecutionStore;

pub use crate::core::ExecutionStatus;
use crate::core::{JobRun, WorkflowRun};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Pass/fail record for one job of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSummary {
    pub job_id: String,
    pub name: String,
    pub status: ExecutionStatus,

    /// Name of the step that failed, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_step: Option<String>,

    /// Failure message of that step (or of the job itself)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Summary of a workflow run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionSummary {
    /// Unique execution ID
    pub execution_id: Uuid,

    pub workflow_name: String,

    /// Triggering event, e.g. `push (main)`
    pub event: String,

    /// Aggregate status
    pub status: ExecutionStatus,

    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,

    /// Per-job results, in declaration order
    pub jobs: Vec<JobSummary>,
}

impl ExecutionSummary {
    pub fn passed_jobs(&self) -> usize {
        self.jobs
            .iter()
            .filter(|j| j.status == ExecutionStatus::Succeeded)
            .count()
    }

    pub fn duration(&self) -> Option<std::time::Duration> {
        self.completed_at
            .and_then(|end| end.signed_duration_since(self.started_at).to_std().ok())
    }
}

/// Trait for persistence backends
#[async_trait::async_trait]
pub trait PersistenceBackend: Send + Sync {
    /// Save a workflow run, replacing any earlier record with the same ID
    async fn save_execution(&self, execution: &ExecutionSummary) -> Result<()>;

    /// Load an execution by ID
    async fn load_execution(&self, execution_id: Uuid) -> Result<Option<ExecutionSummary>>;

    /// List all executions for a workflow, newest first
    async fn list_executions(&self, workflow_name: &str) -> Result<Vec<ExecutionSummary>>;

    /// List all workflow names with recorded runs
    async fn list_workflows(&self) -> Result<Vec<String>>;

    /// Delete an execution; returns whether it existed
    async fn delete_execution(&self, execution_id: Uuid) -> Result<bool>;
}

/// In-memory persistence (for testing or ephemeral use)
pub struct InMemoryPersistence {
    executions: RwLock<HashMap<Uuid, ExecutionSummary>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self {
            executions: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryPersistence {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl PersistenceBackend for InMemoryPersistence {
    async fn save_execution(&self, execution: &ExecutionSummary) -> Result<()> {
        let mut execs = self.executions.write().await;
        execs.insert(execution.execution_id, execution.clone());
        Ok(())
    }

    async fn load_execution(&self, execution_id: Uuid) -> Result<Option<ExecutionSummary>> {
        let execs = self.executions.read().await;
        Ok(execs.get(&execution_id).cloned())
    }

    async fn list_executions(&self, workflow_name: &str) -> Result<Vec<ExecutionSummary>> {
        let execs = self.executions.read().await;
        let mut result: Vec<_> = execs
            .values()
            .filter(|e| e.workflow_name == workflow_name)
            .cloned()
            .collect();
        result.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(result)
    }

    async fn list_workflows(&self) -> Result<Vec<String>> {
        let execs = self.executions.read().await;
        let mut names: Vec<String> = execs.values().map(|e| e.workflow_name.clone()).collect();
        names.sort();
        names.dedup();
        Ok(names)
    }

    async fn delete_execution(&self, execution_id: Uuid) -> Result<bool> {
        let mut execs = self.executions.write().await;
        Ok(execs.remove(&execution_id).is_some())
    }
}

fn summarize_job(job: &JobRun) -> JobSummary {
    let failed = job.failed_step();
    let step_error = failed.and_then(|step| match &step.state {
        crate::core::StepState::Failed { error, .. } => Some(error.clone()),
        _ => None,
    });

    JobSummary {
        job_id: job.job_id.clone(),
        name: job.name.clone(),
        status: job.status,
        failed_step: failed.map(|step| step.name.clone()),
        error: step_error.or_else(|| job.error.clone()),
    }
}

/// Create a summary from a finished workflow run
pub fn create_summary(run: &WorkflowRun) -> ExecutionSummary {
    ExecutionSummary {
        execution_id: run.execution_id,
        workflow_name: run.workflow_name.clone(),
        event: run.event.to_string(),
        status: run.status,
        started_at: run.started_at,
        completed_at: run.completed_at,
        jobs: run.jobs.iter().map(summarize_job).collect(),
    }
}
