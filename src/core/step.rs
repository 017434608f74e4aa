//! Step domain model

use crate::core::config::StepConfig;
use anyhow::Result;
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

/// Reference to a reusable action, pinned to a version (`owner/name@version`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionRef {
    /// Repository part, e.g. `actions/checkout`
    pub repository: String,

    /// Optional sub-path inside the action repository
    pub path: Option<String>,

    /// Pinned version: tag, branch, toolchain name or commit
    pub version: String,
}

fn action_ref_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^([A-Za-z0-9_.-]+/[A-Za-z0-9_.-]+)(/[^@]+)?@([^@\s]+)$")
            .expect("action reference regex is valid")
    })
}

impl ActionRef {
    /// Parse `owner/name[/path]@version`
    pub fn parse(reference: &str) -> Result<Self> {
        let caps = action_ref_regex().captures(reference.trim()).ok_or_else(|| {
            anyhow::anyhow!(
                "Invalid action reference '{}': expected 'owner/name@version'",
                reference
            )
        })?;

        Ok(Self {
            repository: caps[1].to_string(),
            path: caps.get(2).map(|m| m.as_str().trim_start_matches('/').to_string()),
            version: caps[3].to_string(),
        })
    }

    /// Action name without the version, including any sub-path
    pub fn name(&self) -> String {
        match &self.path {
            Some(path) => format!("{}/{}", self.repository, path),
            None => self.repository.clone(),
        }
    }
}

impl fmt::Display for ActionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name(), self.version)
    }
}

/// What a step does
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepAction {
    /// Invoke a reusable action
    Uses {
        action: ActionRef,
        with: BTreeMap<String, String>,
    },
    /// Run an inline shell command
    Run { script: String },
}

/// A single step in a job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    /// Position within the job (0-based)
    pub index: usize,

    /// Display name
    pub name: String,

    pub action: StepAction,

    /// Step-scoped environment variables
    pub env: BTreeMap<String, String>,
}

impl Step {
    /// Create a step from its configuration
    pub fn from_config(config: &StepConfig, index: usize) -> Result<Self> {
        let action = match (&config.uses, &config.run) {
            (Some(uses), None) => StepAction::Uses {
                action: ActionRef::parse(uses)?,
                with: config.with_as_string_map(),
            },
            (None, Some(script)) => StepAction::Run {
                script: script.clone(),
            },
            (Some(_), Some(_)) => {
                anyhow::bail!("Step {} sets both 'uses' and 'run'", index + 1)
            }
            (None, None) => {
                anyhow::bail!("Step {} must set either 'uses' or 'run'", index + 1)
            }
        };

        let name = config
            .name
            .clone()
            .unwrap_or_else(|| Self::default_name(&action));

        Ok(Step {
            index,
            name,
            action,
            env: config.env_as_string_map(),
        })
    }

    /// Build a `run` step directly
    pub fn run(index: usize, script: impl Into<String>) -> Self {
        let action = StepAction::Run {
            script: script.into(),
        };
        Step {
            index,
            name: Self::default_name(&action),
            action,
            env: BTreeMap::new(),
        }
    }

    fn default_name(action: &StepAction) -> String {
        match action {
            StepAction::Uses { action, .. } => format!("Run {}", action),
            StepAction::Run { script } => {
                let first_line = script.lines().next().unwrap_or("").trim();
                format!("Run {}", first_line)
            }
        }
    }

    pub fn is_action(&self) -> bool {
        matches!(self.action, StepAction::Uses { .. })
    }
}
