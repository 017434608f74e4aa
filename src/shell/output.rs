//! Command output and error types

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Error types for command execution
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Failed to spawn '{program}': {message}")]
    Spawn { program: String, message: String },

    #[error("Timed out after {} seconds", .0.as_secs())]
    Timeout(Duration),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result of a finished process. A non-zero exit is not an error at this level.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    /// Exit code; `None` when the process was terminated by a signal
    pub exit_code: Option<i32>,

    pub stdout: String,

    pub stderr: String,
}

impl CommandOutput {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failure(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code: Some(exit_code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Last non-empty line of stderr (or stdout), for short failure messages
    pub fn last_error_line(&self) -> Option<&str> {
        last_line(&self.stderr).or_else(|| last_line(&self.stdout))
    }
}

fn last_line(text: &str) -> Option<&str> {
    text.lines().rev().map(str::trim).find(|line| !line.is_empty())
}
