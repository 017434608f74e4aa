//! Workflow execution

pub mod actions;
pub mod engine;
pub mod environment;
pub mod executor;
pub mod job_runner;
pub mod scheduler;

pub use actions::BuiltinAction;
pub use engine::{EventHandler, EventSink, ExecutionEvent, WorkflowEngine};
pub use environment::{EnvironmentError, JobEnvironment, RepositorySnapshot};
pub use executor::{ExecutionResult, StepError, StepExecutor};
pub use job_runner::JobRunner;
pub use scheduler::{JobScheduler, SchedulingStrategy};
