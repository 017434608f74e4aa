//! ci-runner - run event-triggered CI workflows locally, one throwaway workspace per job

pub mod cli;
pub mod core;
pub mod execution;
pub mod persistence;
pub mod shell;

// Re-export commonly used types
pub use core::{
    EnvironmentConfig, EventKind, ExecutionStatus, Job, JobRun, RepositoryEvent, Step, StepState,
    Workflow, WorkflowRun,
};
pub use execution::{ExecutionEvent, RepositorySnapshot, SchedulingStrategy, WorkflowEngine};
pub use shell::{CommandExecutor, SubprocessExecutor};
