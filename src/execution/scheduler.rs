//! Job scheduling - how many jobs may run at once

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Strategy for scheduling job execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedulingStrategy {
    /// Execute jobs one at a time, in declaration order
    Sequential,

    /// Execute all jobs in parallel
    #[default]
    Parallel,

    /// Limited parallelism (max N concurrent jobs)
    LimitedParallel(usize),
}

impl SchedulingStrategy {
    /// Maximum number of concurrently running jobs for `job_count` jobs
    pub fn concurrency(&self, job_count: usize) -> usize {
        let limit = match self {
            SchedulingStrategy::Sequential => 1,
            SchedulingStrategy::Parallel => job_count,
            SchedulingStrategy::LimitedParallel(max) => (*max).min(job_count),
        };
        limit.max(1)
    }
}

impl fmt::Display for SchedulingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulingStrategy::Sequential => write!(f, "sequential"),
            SchedulingStrategy::Parallel => write!(f, "parallel"),
            SchedulingStrategy::LimitedParallel(n) => write!(f, "parallel-limited ({})", n),
        }
    }
}

impl FromStr for SchedulingStrategy {
    type Err = String;

    /// Parse `sequential`, `parallel`, `parallel-limited` (defaults to 2) or `parallel-limited=N`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, limit) = match s.split_once('=') {
            Some((name, limit)) => (name, Some(limit)),
            None => (s, None),
        };

        match (name, limit) {
            ("sequential", None) => Ok(SchedulingStrategy::Sequential),
            ("parallel", None) => Ok(SchedulingStrategy::Parallel),
            ("parallel-limited", None) => Ok(SchedulingStrategy::LimitedParallel(2)),
            ("parallel-limited", Some(limit)) => match limit.parse::<usize>() {
                Ok(n) if n > 0 => Ok(SchedulingStrategy::LimitedParallel(n)),
                _ => Err(format!("Invalid job limit '{}': expected a positive integer", limit)),
            },
            _ => Err(format!(
                "Unknown strategy '{}': expected sequential, parallel or parallel-limited[=N]",
                s
            )),
        }
    }
}

/// Hands out permits to start jobs according to the strategy
#[derive(Debug, Clone)]
pub struct JobScheduler {
    strategy: SchedulingStrategy,
    slots: Arc<Semaphore>,
}

impl JobScheduler {
    pub fn new(strategy: SchedulingStrategy, job_count: usize) -> Self {
        Self {
            strategy,
            slots: Arc::new(Semaphore::new(strategy.concurrency(job_count))),
        }
    }

    pub fn strategy(&self) -> SchedulingStrategy {
        self.strategy
    }

    /// Wait for a free slot. The slot is returned when the permit drops.
    pub async fn acquire(&self) -> Option<OwnedSemaphorePermit> {
        // The semaphore is never closed, so this only fails if that changes
        self.slots.clone().acquire_owned().await.ok()
    }

    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }
}
