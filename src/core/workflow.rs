//! Workflow domain model

use crate::core::{
    config::WorkflowConfig,
    step::Step,
    trigger::{RepositoryEvent, TriggerSet},
};
use anyhow::Result;
use std::collections::BTreeMap;
use std::time::Duration;

/// A workflow definition. Loaded once per invocation and never mutated while running.
#[derive(Debug, Clone)]
pub struct Workflow {
    /// Workflow name
    pub name: String,

    /// Events that start the workflow
    pub triggers: TriggerSet,

    /// Process-wide environment visible to every step of every job
    pub env: BTreeMap<String, String>,

    /// Jobs in declaration order
    pub jobs: Vec<Job>,
}

/// An independently executed unit of work
#[derive(Debug, Clone)]
pub struct Job {
    /// Job id (key in the `jobs` map)
    pub id: String,

    /// Display name
    pub name: String,

    /// Execution target descriptor
    pub runs_on: String,

    /// Job-scoped environment
    pub env: BTreeMap<String, String>,

    /// Upper bound for the whole job
    pub timeout: Option<Duration>,

    /// Steps, executed strictly in order
    pub steps: Vec<Step>,
}

impl Workflow {
    /// Create a workflow from configuration
    pub fn from_config(config: &WorkflowConfig) -> Result<Self> {
        let mut jobs = Vec::with_capacity(config.jobs.len());

        for (id, job_config) in config.jobs.iter() {
            let steps = job_config
                .steps
                .iter()
                .enumerate()
                .map(|(index, step)| Step::from_config(step, index))
                .collect::<Result<Vec<_>>>()
                .map_err(|e| anyhow::anyhow!("Job '{}': {}", id, e))?;

            jobs.push(Job {
                id: id.clone(),
                name: job_config.name.clone().unwrap_or_else(|| id.clone()),
                runs_on: job_config.runs_on.clone(),
                env: job_config.env_as_string_map(),
                timeout: job_config
                    .timeout_minutes
                    .map(|minutes| Duration::from_secs(minutes * 60)),
                steps,
            });
        }

        Ok(Workflow {
            name: config.name.clone(),
            triggers: config.trigger_set()?,
            env: config.env_as_string_map(),
            jobs,
        })
    }

    /// Get a job by id
    pub fn job(&self, id: &str) -> Option<&Job> {
        self.jobs.iter().find(|j| j.id == id)
    }

    /// Check whether an event starts this workflow
    pub fn should_trigger(&self, event: &RepositoryEvent) -> bool {
        self.triggers.matches(event)
    }

    /// Restrict the workflow to the given job ids. An empty selection keeps every job.
    pub fn select_jobs(&self, ids: &[String]) -> Result<Workflow> {
        if ids.is_empty() {
            return Ok(self.clone());
        }

        for id in ids {
            if self.job(id).is_none() {
                let known: Vec<_> = self.jobs.iter().map(|j| j.id.as_str()).collect();
                anyhow::bail!(
                    "Workflow '{}' has no job '{}' (available: {})",
                    self.name,
                    id,
                    known.join(", ")
                );
            }
        }

        Ok(Workflow {
            jobs: self
                .jobs
                .iter()
                .filter(|j| ids.contains(&j.id))
                .cloned()
                .collect(),
            ..self.clone()
        })
    }
}
