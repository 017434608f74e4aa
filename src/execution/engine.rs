//! Main execution engine - orchestrates a whole workflow run

use crate::{
    core::{EnvironmentConfig, ExecutionStatus, JobRun, RepositoryEvent, Workflow, WorkflowRun},
    execution::{
        environment::RepositorySnapshot,
        executor::StepExecutor,
        job_runner::JobRunner,
        scheduler::{JobScheduler, SchedulingStrategy},
    },
    shell::CommandExecutor,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{error, info};
use uuid::Uuid;

/// Events that can occur during workflow execution
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    WorkflowStarted {
        execution_id: Uuid,
        workflow_name: String,
        event: String,
        jobs: usize,
    },
    WorkflowSkipped {
        execution_id: Uuid,
        workflow_name: String,
        event: String,
    },
    JobStarted {
        job_id: String,
        name: String,
    },
    StepStarted {
        job_id: String,
        step_index: usize,
        step_name: String,
    },
    StepOutput {
        job_id: String,
        step_index: usize,
        output: String,
    },
    StepSucceeded {
        job_id: String,
        step_index: usize,
        step_name: String,
    },
    StepFailed {
        job_id: String,
        step_index: usize,
        step_name: String,
        error: String,
    },
    StepSkipped {
        job_id: String,
        step_index: usize,
        step_name: String,
    },
    JobCompleted {
        job_id: String,
        status: ExecutionStatus,
    },
    WorkflowCompleted {
        execution_id: Uuid,
        status: ExecutionStatus,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(ExecutionEvent) + Send + Sync>;

/// Fan-out of events to every registered handler
#[derive(Clone, Default)]
pub struct EventSink {
    handlers: Vec<EventHandler>,
}

impl EventSink {
    pub fn push(&mut self, handler: EventHandler) {
        self.handlers.push(handler);
    }

    /// Emit an event to all handlers
    pub fn emit(&self, event: ExecutionEvent) {
        for handler in &self.handlers {
            handler(event.clone());
        }
    }
}

/// Main workflow execution engine
pub struct WorkflowEngine<E> {
    executor: Arc<E>,
    strategy: SchedulingStrategy,
    env_config: Arc<EnvironmentConfig>,
    workspace_base: Option<PathBuf>,
    events: EventSink,
}

impl<E: CommandExecutor + 'static> WorkflowEngine<E> {
    /// Create an engine; job environments inherit the allow-listed host variables
    pub fn new(executor: E, strategy: SchedulingStrategy) -> Self {
        Self {
            executor: Arc::new(executor),
            strategy,
            env_config: Arc::new(EnvironmentConfig::from_host()),
            workspace_base: None,
            events: EventSink::default(),
        }
    }

    /// Replace the runner-wide environment configuration
    pub fn with_environment(mut self, config: EnvironmentConfig) -> Self {
        self.env_config = Arc::new(config);
        self
    }

    /// Create job workspaces under `base` instead of the system temp dir
    pub fn with_workspace_base(mut self, base: impl Into<PathBuf>) -> Self {
        self.workspace_base = Some(base.into());
        self
    }

    /// Add an event handler
    pub fn with_event_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        self.events.push(Arc::new(handler));
        self
    }

    pub fn executor(&self) -> &Arc<E> {
        &self.executor
    }

    /// Run `workflow` for `event` against the repository `snapshot`.
    ///
    /// Jobs that fail never stop their siblings; the returned run is failed
    /// if and only if at least one job failed.
    pub async fn execute(
        &self,
        workflow: &Workflow,
        event: &RepositoryEvent,
        snapshot: &RepositorySnapshot,
    ) -> WorkflowRun {
        let mut run = WorkflowRun::new(&workflow.name, event.clone());
        let execution_id = run.execution_id;

        if !workflow.should_trigger(event) {
            info!("Workflow '{}' is not triggered by {}", workflow.name, event);
            run.not_triggered();
            self.events.emit(ExecutionEvent::WorkflowSkipped {
                execution_id,
                workflow_name: workflow.name.clone(),
                event: event.to_string(),
            });
            return run;
        }

        info!(
            "Starting workflow execution: {} ({}) for {}",
            workflow.name, execution_id, event
        );
        run.start();
        self.events.emit(ExecutionEvent::WorkflowStarted {
            execution_id,
            workflow_name: workflow.name.clone(),
            event: event.to_string(),
            jobs: workflow.jobs.len(),
        });

        let jobs = self.run_jobs(workflow, snapshot).await;
        run.complete(jobs);

        info!(
            "Workflow execution finished: {} - {}",
            workflow.name,
            run.status.as_str()
        );
        self.events.emit(ExecutionEvent::WorkflowCompleted {
            execution_id,
            status: run.status,
        });

        run
    }

    /// Spawn every job and wait for all of them; reports come back in declaration order
    async fn run_jobs(&self, workflow: &Workflow, snapshot: &RepositorySnapshot) -> Vec<JobRun> {
        let scheduler = JobScheduler::new(self.strategy, workflow.jobs.len());
        let snapshot = match &self.workspace_base {
            Some(base) => snapshot.clone().excluding(base),
            None => snapshot.clone(),
        };
        let runner = Arc::new(JobRunner::new(
            StepExecutor::new(self.executor.clone(), snapshot),
            self.env_config.clone(),
            self.workspace_base.clone(),
            self.events.clone(),
        ));
        let workflow_env = Arc::new(workflow.env.clone());

        info!(
            "Scheduling {} jobs ({})",
            workflow.jobs.len(),
            scheduler.strategy()
        );

        let mut tasks = JoinSet::new();
        for (position, job) in workflow.jobs.iter().cloned().enumerate() {
            let runner = runner.clone();
            let workflow_env = workflow_env.clone();
            let scheduler = scheduler.clone();
            let events = self.events.clone();

            tasks.spawn(async move {
                let _slot = scheduler.acquire().await;

                let job_for_task = job.clone();
                let handle =
                    tokio::spawn(async move { runner.run(&job_for_task, &workflow_env).await });

                let report = match handle.await {
                    Ok(report) => report,
                    Err(e) => {
                        error!("Job {} task failed: {}", job.id, e);
                        let mut report = JobRun::new(&job);
                        report.start();
                        report.fail(format!("Job task failed: {}", e));
                        events.emit(ExecutionEvent::JobCompleted {
                            job_id: job.id.clone(),
                            status: report.status,
                        });
                        report
                    }
                };

                (position, report)
            });
        }

        let mut slots: Vec<Option<JobRun>> = vec![None; workflow.jobs.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((position, report)) => slots[position] = Some(report),
                Err(e) => error!("Job supervisor task failed: {}", e),
            }
        }

        slots
            .into_iter()
            .zip(&workflow.jobs)
            .map(|(slot, job)| {
                slot.unwrap_or_else(|| {
                    let mut report = JobRun::new(job);
                    report.fail("Job never reported a result");
                    report
                })
            })
            .collect()
    }
}
