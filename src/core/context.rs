//! Job context - the environment a job's steps see

use crate::core::{step::Step, workflow::Job};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Host variables passed through to job environments. Everything else is dropped.
pub const HOST_ENV_ALLOWLIST: &[&str] = &[
    "PATH",
    "HOME",
    "USER",
    "LANG",
    "LC_ALL",
    "TERM",
    "TMPDIR",
    "CARGO_HOME",
    "RUSTUP_HOME",
    "SYSTEMROOT",
    "USERPROFILE",
    "APPDATA",
    "LOCALAPPDATA",
];

/// Runner-wide environment configuration, handed to every job explicitly
#[derive(Debug, Clone, Default)]
pub struct EnvironmentConfig {
    /// Variables inherited from the host process
    pub host: BTreeMap<String, String>,

    /// Overrides given on the command line; beat workflow env, lose to job env
    pub overrides: BTreeMap<String, String>,
}

impl EnvironmentConfig {
    /// Capture the allow-listed host variables
    pub fn from_host() -> Self {
        let host = HOST_ENV_ALLOWLIST
            .iter()
            .filter_map(|key| std::env::var(key).ok().map(|v| (key.to_string(), v)))
            .collect();

        Self {
            host,
            overrides: BTreeMap::new(),
        }
    }

    pub fn with_override(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.overrides.insert(key.into(), value.into());
        self
    }
}

/// Execution context for one job. Owned exclusively by that job.
#[derive(Debug, Clone)]
pub struct JobContext {
    /// Job being executed
    pub job_id: String,

    /// Root of the job's ephemeral workspace
    pub workspace: PathBuf,

    /// Toolchain selected by an install step, if any
    pub toolchain: Option<String>,

    /// Environment shared by all steps of this job
    base_env: BTreeMap<String, String>,

    /// Variables exported by earlier steps (e.g. `RUSTUP_TOOLCHAIN`)
    exported: BTreeMap<String, String>,
}

impl JobContext {
    /// Build the context for a job.
    ///
    /// Layering, later wins: host < workflow env < overrides < job env < CI variables.
    pub fn new(
        job: &Job,
        workflow_env: &BTreeMap<String, String>,
        config: &EnvironmentConfig,
        workspace: impl Into<PathBuf>,
    ) -> Self {
        let workspace = workspace.into();

        let mut base_env = config.host.clone();
        base_env.extend(workflow_env.iter().map(|(k, v)| (k.clone(), v.clone())));
        base_env.extend(config.overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
        base_env.extend(job.env.iter().map(|(k, v)| (k.clone(), v.clone())));
        base_env.insert("CI".to_string(), "true".to_string());
        base_env.insert("CI_JOB".to_string(), job.id.clone());
        base_env.insert(
            "CI_WORKSPACE".to_string(),
            workspace.to_string_lossy().into_owned(),
        );

        Self {
            job_id: job.id.clone(),
            workspace,
            toolchain: None,
            base_env,
            exported: BTreeMap::new(),
        }
    }

    /// Make a variable visible to every later step of this job
    pub fn export(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.exported.insert(key.into(), value.into());
    }

    /// Resolve a variable as a step without its own env would see it
    pub fn get(&self, key: &str) -> Option<&String> {
        self.exported.get(key).or_else(|| self.base_env.get(key))
    }

    /// Full environment for a step
    pub fn env_for_step(&self, step: &Step) -> BTreeMap<String, String> {
        let mut env = self.base_env.clone();
        env.extend(self.exported.iter().map(|(k, v)| (k.clone(), v.clone())));
        env.extend(step.env.iter().map(|(k, v)| (k.clone(), v.clone())));
        env
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }
}
