//! Workflow configuration from YAML

use crate::core::{
    builtin::BUILTIN_WORKFLOW,
    trigger::{BranchPattern, EventKind, Trigger, TriggerSet},
    Workflow,
};
use anyhow::{Context, Result};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_yaml::Value;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};

/// Location of the workflow file inside a repository
pub const DEFAULT_WORKFLOW_PATH: &str = ".github/workflows/ci.yml";

/// Top-level workflow configuration loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Workflow name
    #[serde(default = "default_workflow_name")]
    pub name: String,

    /// Events that trigger the workflow
    pub on: TriggerConfig,

    /// Process-wide environment variables, visible to every step of every job
    #[serde(default)]
    env: BTreeMap<String, Value>,

    /// Jobs keyed by id, in declaration order
    pub jobs: JobMap,
}

/// Trigger declaration: `on: push`, `on: [push, pull_request]` or a map with filters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TriggerConfig {
    Single(String),
    List(Vec<String>),
    Detailed(BTreeMap<String, Option<EventFilterConfig>>),
}

/// Branch filters for a single event
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventFilterConfig {
    #[serde(default)]
    pub branches: Vec<String>,

    #[serde(default, rename = "branches-ignore")]
    pub branches_ignore: Vec<String>,
}

/// Job configuration as defined in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    /// Human-readable job name (defaults to the job id)
    #[serde(default)]
    pub name: Option<String>,

    /// Execution target descriptor
    #[serde(rename = "runs-on", default = "default_runs_on")]
    pub runs_on: String,

    /// Job-scoped environment variables
    #[serde(default)]
    env: BTreeMap<String, Value>,

    /// Upper bound for the whole job
    #[serde(rename = "timeout-minutes", default)]
    pub timeout_minutes: Option<u64>,

    /// Ordered steps
    pub steps: Vec<StepConfig>,
}

/// Step configuration as defined in YAML
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepConfig {
    /// Optional display name
    #[serde(default)]
    pub name: Option<String>,

    /// Reusable action reference (`owner/name@version`)
    #[serde(default)]
    pub uses: Option<String>,

    /// Inline command
    #[serde(default)]
    pub run: Option<String>,

    /// Action inputs
    #[serde(default)]
    with: BTreeMap<String, Value>,

    /// Step-scoped environment variables
    #[serde(default)]
    env: BTreeMap<String, Value>,
}

/// Ordered map of job id to job configuration
#[derive(Debug, Clone, Default)]
pub struct JobMap(Vec<(String, JobConfig)>);

fn default_workflow_name() -> String {
    "CI".to_string()
}

fn default_runs_on() -> String {
    "ubuntu-latest".to_string()
}

/// Render a scalar YAML value the way it would appear in an environment
fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Null => String::new(),
        other => serde_yaml::to_string(other)
            .unwrap_or_default()
            .trim_end()
            .to_string(),
    }
}

fn string_map(values: &BTreeMap<String, Value>) -> BTreeMap<String, String> {
    values
        .iter()
        .map(|(k, v)| (k.clone(), value_to_string(v)))
        .collect()
}

fn is_valid_env_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn is_valid_job_id(id: &str) -> bool {
    let mut chars = id.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

impl WorkflowConfig {
    /// Load workflow configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read workflow file {}", path.display()))?;
        Self::from_yaml(&content)
    }

    /// Parse workflow configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: WorkflowConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// The workflow shipped with the runner
    pub fn builtin() -> Result<Self> {
        Self::from_yaml(BUILTIN_WORKFLOW).context("Built-in workflow is invalid")
    }

    /// Pick the workflow file to use for a repository: an explicit path wins,
    /// then the repository's own workflow file. `None` means the built-in one.
    pub fn discover(explicit: Option<&Path>, repository: &Path) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(path.to_path_buf());
        }
        let candidate = repository.join(DEFAULT_WORKFLOW_PATH);
        candidate.is_file().then_some(candidate)
    }

    /// Validate the workflow configuration
    pub fn validate(&self) -> Result<()> {
        if self.trigger_names().is_empty() {
            anyhow::bail!("Workflow '{}' declares no triggers", self.name);
        }

        if self.jobs.is_empty() {
            anyhow::bail!("Workflow '{}' declares no jobs", self.name);
        }

        for key in self.env.keys() {
            if !is_valid_env_name(key) {
                anyhow::bail!("Invalid environment variable name '{}'", key);
            }
        }

        for (id, job) in self.jobs.iter() {
            if !is_valid_job_id(id) {
                anyhow::bail!("Invalid job id '{}'", id);
            }

            if job.steps.is_empty() {
                anyhow::bail!("Job '{}' has no steps", id);
            }

            if job.timeout_minutes == Some(0) {
                anyhow::bail!("Job '{}' has a zero timeout-minutes", id);
            }

            for key in job.env.keys() {
                if !is_valid_env_name(key) {
                    anyhow::bail!("Job '{}' has invalid environment variable name '{}'", id, key);
                }
            }

            for (index, step) in job.steps.iter().enumerate() {
                if let Some(run) = &step.run {
                    if run.trim().is_empty() {
                        anyhow::bail!("Job '{}' step {} has an empty 'run' command", id, index + 1);
                    }
                }
                for key in step.env.keys() {
                    if !is_valid_env_name(key) {
                        anyhow::bail!(
                            "Job '{}' step {} has invalid environment variable name '{}'",
                            id,
                            index + 1,
                            key
                        );
                    }
                }
            }
        }

        // Builds the trigger set, branch patterns and action references
        self.to_workflow()?;

        Ok(())
    }

    /// Event names in declaration order
    pub fn trigger_names(&self) -> Vec<String> {
        match &self.on {
            TriggerConfig::Single(name) => vec![name.clone()],
            TriggerConfig::List(names) => names.clone(),
            TriggerConfig::Detailed(map) => map.keys().cloned().collect(),
        }
    }

    /// Build the trigger set
    pub fn trigger_set(&self) -> Result<TriggerSet> {
        let entries: Vec<(String, Option<EventFilterConfig>)> = match &self.on {
            TriggerConfig::Single(name) => vec![(name.clone(), None)],
            TriggerConfig::List(names) => names.iter().map(|n| (n.clone(), None)).collect(),
            TriggerConfig::Detailed(map) => {
                map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
            }
        };

        let mut seen = HashSet::new();
        let mut triggers = Vec::with_capacity(entries.len());
        for (name, filter) in entries {
            let kind: EventKind = name.parse().map_err(|e| anyhow::anyhow!("{}", e))?;
            if !seen.insert(kind.clone()) {
                anyhow::bail!("Duplicate trigger '{}'", name);
            }

            let mut trigger = Trigger::new(kind);
            if let Some(filter) = filter {
                for pattern in &filter.branches {
                    trigger.branches.push(
                        BranchPattern::new(pattern)
                            .with_context(|| format!("Invalid branch pattern '{}'", pattern))?,
                    );
                }
                for pattern in &filter.branches_ignore {
                    trigger.branches_ignore.push(
                        BranchPattern::new(pattern)
                            .with_context(|| format!("Invalid branch pattern '{}'", pattern))?,
                    );
                }
            }
            triggers.push(trigger);
        }

        Ok(TriggerSet::new(triggers))
    }

    /// Workflow-level environment as strings
    pub fn env_as_string_map(&self) -> BTreeMap<String, String> {
        string_map(&self.env)
    }

    /// Convert config to a Workflow domain model
    pub fn to_workflow(&self) -> Result<Workflow> {
        Workflow::from_config(self)
    }
}

impl JobConfig {
    pub fn env_as_string_map(&self) -> BTreeMap<String, String> {
        string_map(&self.env)
    }
}

impl StepConfig {
    /// Inline command step
    pub fn run(script: impl Into<String>) -> Self {
        Self {
            run: Some(script.into()),
            ..Self::default()
        }
    }

    /// Action step
    pub fn uses(reference: impl Into<String>) -> Self {
        Self {
            uses: Some(reference.into()),
            ..Self::default()
        }
    }

    pub fn with_as_string_map(&self) -> BTreeMap<String, String> {
        string_map(&self.with)
    }

    pub fn env_as_string_map(&self) -> BTreeMap<String, String> {
        string_map(&self.env)
    }
}

impl JobMap {
    pub fn new(jobs: Vec<(String, JobConfig)>) -> Self {
        Self(jobs)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &JobConfig)> {
        self.0.iter().map(|(id, job)| (id, job))
    }

    pub fn get(&self, id: &str) -> Option<&JobConfig> {
        self.0.iter().find(|(k, _)| k == id).map(|(_, job)| job)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for JobMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (id, job) in &self.0 {
            map.serialize_entry(id, job)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for JobMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct JobMapVisitor;

        impl<'de> Visitor<'de> for JobMapVisitor {
            type Value = JobMap;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of job ids to jobs")
            }

            fn visit_map<M: MapAccess<'de>>(self, mut access: M) -> Result<JobMap, M::Error> {
                let mut jobs: Vec<(String, JobConfig)> = Vec::new();
                while let Some((id, job)) = access.next_entry::<String, JobConfig>()? {
                    if jobs.iter().any(|(existing, _)| *existing == id) {
                        return Err(serde::de::Error::custom(format!("Duplicate job id: {}", id)));
                    }
                    jobs.push((id, job));
                }
                Ok(JobMap(jobs))
            }
        }

        deserializer.deserialize_map(JobMapVisitor)
    }
}
