//! Job runner - one job, its steps in order, in its own environment

use crate::{
    core::{EnvironmentConfig, ExecutionStatus, Job, JobContext, JobRun, StepState},
    execution::{
        engine::{EventSink, ExecutionEvent},
        environment::JobEnvironment,
        executor::{ExecutionResult, StepError, StepExecutor},
    },
    shell::{CommandExecutor, CommandOutput},
};
use chrono::Utc;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info, warn};

/// Runs a single job to completion
pub struct JobRunner<E> {
    steps: StepExecutor<E>,
    env_config: Arc<EnvironmentConfig>,
    workspace_base: Option<PathBuf>,
    events: EventSink,
}

impl<E: CommandExecutor> JobRunner<E> {
    pub fn new(
        steps: StepExecutor<E>,
        env_config: Arc<EnvironmentConfig>,
        workspace_base: Option<PathBuf>,
        events: EventSink,
    ) -> Self {
        Self {
            steps,
            env_config,
            workspace_base,
            events,
        }
    }

    /// Run every step of `job` in declaration order, stopping at the first failure
    pub async fn run(&self, job: &Job, workflow_env: &BTreeMap<String, String>) -> JobRun {
        let mut report = JobRun::new(job);
        report.start();

        info!("Starting job {} ({})", job.id, job.name);
        self.events.emit(ExecutionEvent::JobStarted {
            job_id: job.id.clone(),
            name: job.name.clone(),
        });

        let environment = match JobEnvironment::acquire(&job.id, self.workspace_base.as_deref()) {
            Ok(environment) => environment,
            Err(e) => {
                error!("Job {}: {}", job.id, e);
                report.fail(e.to_string());
                self.emit_skipped(&report);
                self.emit_completed(&report);
                return report;
            }
        };

        let mut context =
            JobContext::new(job, workflow_env, &self.env_config, environment.workspace());
        let deadline = job.timeout.map(|limit| Instant::now() + limit);
        let mut aborted = false;

        for (step, step_run) in job.steps.iter().zip(report.steps.iter_mut()) {
            if aborted {
                step_run.state = StepState::Skipped {
                    reason: "a previous step failed".to_string(),
                };
                self.events.emit(ExecutionEvent::StepSkipped {
                    job_id: job.id.clone(),
                    step_index: step.index,
                    step_name: step.name.clone(),
                });
                continue;
            }

            let started_at = Utc::now();
            step_run.state = StepState::Running { started_at };
            self.events.emit(ExecutionEvent::StepStarted {
                job_id: job.id.clone(),
                step_index: step.index,
                step_name: step.name.clone(),
            });

            let result = match remaining_budget(deadline) {
                Ok(timeout) => self.steps.execute(step, &mut context, timeout).await,
                Err(error) => ExecutionResult::Failed {
                    error,
                    output: CommandOutput::default(),
                },
            };

            let output = result.output();
            step_run.stdout = output.stdout.clone();
            step_run.stderr = output.stderr.clone();
            let combined = format!("{}{}", output.stdout, output.stderr);
            if !combined.trim().is_empty() {
                self.events.emit(ExecutionEvent::StepOutput {
                    job_id: job.id.clone(),
                    step_index: step.index,
                    output: combined,
                });
            }

            match result {
                ExecutionResult::Success { output } => {
                    step_run.state = StepState::Succeeded {
                        exit_code: output.exit_code,
                        started_at,
                        completed_at: Utc::now(),
                    };
                    self.events.emit(ExecutionEvent::StepSucceeded {
                        job_id: job.id.clone(),
                        step_index: step.index,
                        step_name: step.name.clone(),
                    });
                }
                ExecutionResult::Failed { error, output } => {
                    let message = describe_failure(&error, &output);
                    warn!("Job {}: step '{}' failed: {}", job.id, step.name, message);

                    step_run.state = StepState::Failed {
                        error: message.clone(),
                        exit_code: output.exit_code,
                        started_at,
                        failed_at: Utc::now(),
                    };
                    self.events.emit(ExecutionEvent::StepFailed {
                        job_id: job.id.clone(),
                        step_index: step.index,
                        step_name: step.name.clone(),
                        error: message,
                    });
                    aborted = true;
                }
            }
        }

        environment.release();
        report.finish();

        match report.status {
            ExecutionStatus::Succeeded => info!("Job {} succeeded", job.id),
            _ => warn!("Job {} failed", job.id),
        }
        self.emit_completed(&report);

        report
    }

    fn emit_skipped(&self, report: &JobRun) {
        for step in &report.steps {
            self.events.emit(ExecutionEvent::StepSkipped {
                job_id: report.job_id.clone(),
                step_index: step.index,
                step_name: step.name.clone(),
            });
        }
    }

    fn emit_completed(&self, report: &JobRun) {
        self.events.emit(ExecutionEvent::JobCompleted {
            job_id: report.job_id.clone(),
            status: report.status,
        });
    }
}

/// Time left before the job deadline; an error once it has passed
fn remaining_budget(deadline: Option<Instant>) -> Result<Option<Duration>, StepError> {
    match deadline {
        None => Ok(None),
        Some(deadline) => {
            let now = Instant::now();
            if now >= deadline {
                Err(StepError::JobTimeout)
            } else {
                Ok(Some(deadline - now))
            }
        }
    }
}

/// Error message for a failed step, with the last line of diagnostics if any
fn describe_failure(error: &StepError, output: &CommandOutput) -> String {
    match output.last_error_line() {
        Some(line) => format!("{}: {}", error, line),
        None => error.to_string(),
    }
}
