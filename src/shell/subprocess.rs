//! Subprocess executor - runs invocations as child processes

use crate::shell::{CommandError, CommandExecutor, CommandOutput, Invocation};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Executes invocations as real child processes
#[derive(Debug, Clone, Default)]
pub struct SubprocessExecutor;

impl SubprocessExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandExecutor for SubprocessExecutor {
    /// Spawn the process with exactly the invocation's environment and capture its output
    ///
    /// # Errors
    /// Returns `CommandError` if:
    /// - The program cannot be spawned
    /// - The invocation's timeout elapses (the child is killed)
    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput, CommandError> {
        debug!("Spawning: {} (in {})", invocation, invocation.working_dir.display());

        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .current_dir(&invocation.working_dir)
            .env_clear()
            .envs(&invocation.env)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let running = command.output();
        let result = match invocation.timeout {
            Some(limit) => timeout(limit, running)
                .await
                .map_err(|_| CommandError::Timeout(limit))?,
            None => running.await,
        };

        let output = result.map_err(|e| CommandError::Spawn {
            program: invocation.program.clone(),
            message: e.to_string(),
        })?;

        let exit_code = output.status.code();
        if !output.status.success() {
            warn!("{} exited with {:?}", invocation.program, exit_code);
        }

        debug!(
            "{} returned {} bytes of stdout, {} bytes of stderr",
            invocation.program,
            output.stdout.len(),
            output.stderr.len()
        );

        Ok(CommandOutput {
            exit_code,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
