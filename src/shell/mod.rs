//! Process execution for steps

pub mod output;
pub mod subprocess;

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

pub use output::{CommandError, CommandOutput};
pub use subprocess::SubprocessExecutor;

/// A fully described process invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,

    /// Directory the process runs in
    pub working_dir: PathBuf,

    /// Complete environment; nothing is inherited implicitly
    pub env: BTreeMap<String, String>,

    /// Kill the process after this long
    pub timeout: Option<Duration>,
}

impl Invocation {
    pub fn new(program: impl Into<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: working_dir.into(),
            env: BTreeMap::new(),
            timeout: None,
        }
    }

    /// Run an inline script through the platform shell, stopping at the first failing command
    pub fn shell(script: &str, working_dir: impl Into<PathBuf>) -> Self {
        if cfg!(windows) {
            Self::new("cmd", working_dir).args(["/C", script])
        } else {
            Self::new("sh", working_dir).args(["-e", "-c", script])
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            if arg.contains(char::is_whitespace) {
                write!(f, " {:?}", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

/// Trait for process execution - allows for different implementations
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run the invocation to completion and capture its output
    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput, CommandError>;
}
