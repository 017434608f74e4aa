//! Step executor - runs individual steps

use crate::{
    core::{JobContext, Step, StepAction},
    execution::{
        actions::BuiltinAction,
        environment::{EnvironmentError, RepositorySnapshot},
    },
    shell::{CommandError, CommandExecutor, CommandOutput, Invocation},
};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info};

/// Why a step failed
#[derive(Debug, Error)]
pub enum StepError {
    #[error("Process exited with code {0}")]
    ExitCode(i32),

    #[error("Process was terminated by a signal")]
    Terminated,

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error(transparent)]
    Environment(#[from] EnvironmentError),

    #[error("Unsupported action '{0}'")]
    UnsupportedAction(String),

    #[error("Job timed out before the step could start")]
    JobTimeout,
}

impl StepError {
    /// Map a non-success exit code to an error
    pub fn from_exit(exit_code: Option<i32>) -> Self {
        match exit_code {
            Some(code) => StepError::ExitCode(code),
            None => StepError::Terminated,
        }
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self {
            StepError::ExitCode(code) => Some(*code),
            _ => None,
        }
    }
}

/// Result of executing a step
#[derive(Debug)]
pub enum ExecutionResult {
    /// Step completed successfully
    Success { output: CommandOutput },
    /// Step failed; the job must stop here
    Failed {
        error: StepError,
        output: CommandOutput,
    },
}

impl ExecutionResult {
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionResult::Success { .. })
    }

    pub fn output(&self) -> &CommandOutput {
        match self {
            ExecutionResult::Success { output } | ExecutionResult::Failed { output, .. } => output,
        }
    }
}

/// Executes a single step
pub struct StepExecutor<E> {
    executor: Arc<E>,
    snapshot: RepositorySnapshot,
}

impl<E: CommandExecutor> StepExecutor<E> {
    pub fn new(executor: Arc<E>, snapshot: RepositorySnapshot) -> Self {
        Self { executor, snapshot }
    }

    pub fn command_executor(&self) -> &E {
        self.executor.as_ref()
    }

    /// Repository contents checked out by `actions/checkout`
    pub fn snapshot(&self) -> &RepositorySnapshot {
        &self.snapshot
    }

    /// Execute a step and return the result
    pub async fn execute(
        &self,
        step: &Step,
        context: &mut JobContext,
        timeout: Option<Duration>,
    ) -> ExecutionResult {
        info!("Job {}: executing step '{}'", context.job_id, step.name);

        match &step.action {
            StepAction::Run { script } => self.run_script(script, step, context, timeout).await,
            StepAction::Uses { action, with } => match BuiltinAction::resolve(action) {
                Some(builtin) => {
                    debug!("Job {}: performing {:?} for {}", context.job_id, builtin, action);
                    builtin
                        .perform(self, action, with, step, context, timeout)
                        .await
                }
                None => {
                    error!("Job {}: unsupported action {}", context.job_id, action);
                    ExecutionResult::Failed {
                        error: StepError::UnsupportedAction(action.to_string()),
                        output: CommandOutput::default(),
                    }
                }
            },
        }
    }

    async fn run_script(
        &self,
        script: &str,
        step: &Step,
        context: &JobContext,
        timeout: Option<Duration>,
    ) -> ExecutionResult {
        let invocation = Invocation::shell(script, context.workspace.clone())
            .with_env(context.env_for_step(step))
            .with_timeout(timeout);

        match self.executor.run(&invocation).await {
            Ok(output) if output.is_success() => ExecutionResult::Success { output },
            Ok(output) => {
                error!(
                    "Job {}: step '{}' failed with exit code {:?}",
                    context.job_id, step.name, output.exit_code
                );
                ExecutionResult::Failed {
                    error: StepError::from_exit(output.exit_code),
                    output,
                }
            }
            Err(e) => {
                error!("Job {}: step '{}' could not run: {}", context.job_id, step.name, e);
                ExecutionResult::Failed {
                    error: StepError::Command(e),
                    output: CommandOutput::default(),
                }
            }
        }
    }
}
