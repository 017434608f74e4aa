//! Test: Concurrency - job scheduling and fault containment between jobs

use crate::helpers::*;
use ci_runner::core::{ExecutionStatus, RepositoryEvent};
use ci_runner::execution::{ExecutionEvent, SchedulingStrategy};
use std::collections::BTreeMap;
use std::time::Duration;

/// Sequential runs never overlap commands
#[tokio::test]
async fn test_sequential_runs_one_job_at_a_time() {
    let workflow = builtin_workflow();
    let result = run_workflow_with(
        &workflow,
        RepositoryEvent::push(),
        MockExecutor::new().with_delay(Duration::from_millis(20)),
        SchedulingStrategy::Sequential,
        BTreeMap::new(),
    )
    .await;

    assert!(result.run.is_success());
    assert_eq!(result.executor.max_concurrency(), 1);
}

/// Independent jobs overlap when run in parallel
#[tokio::test]
async fn test_parallel_jobs_overlap() {
    let workflow = builtin_workflow();
    let result = run_workflow(
        &workflow,
        RepositoryEvent::push(),
        MockExecutor::new().with_delay(Duration::from_millis(50)),
    )
    .await;

    assert!(result.run.is_success());
    assert!(
        result.executor.max_concurrency() >= 2,
        "expected overlapping jobs, max concurrency was {}",
        result.executor.max_concurrency()
    );
}

/// A limited pool never exceeds its size
#[tokio::test]
async fn test_limited_parallelism_is_bounded() {
    let workflow = builtin_workflow();
    let result = run_workflow_with(
        &workflow,
        RepositoryEvent::push(),
        MockExecutor::new().with_delay(Duration::from_millis(20)),
        SchedulingStrategy::LimitedParallel(2),
        BTreeMap::new(),
    )
    .await;

    assert!(result.run.is_success());
    assert!(result.executor.max_concurrency() <= 2);
}

/// Reports come back in declaration order regardless of finishing order
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_report_order_is_declaration_order() {
    let workflow = workflow_from_yaml(
        r#"
name: Ordering
on: push
jobs:
  slow:
    steps:
      - run: sleep-a-while
  fast:
    steps:
      - run: "true"
"#,
    );
    let executor = MockExecutor::new().fail_when(
        |inv| {
            if command_line(inv) == "sleep-a-while" {
                std::thread::sleep(Duration::from_millis(30));
            }
            false
        },
        ci_runner::shell::CommandOutput::success(""),
    );

    let result = run_workflow(&workflow, RepositoryEvent::push(), executor).await;

    let ids: Vec<_> = result.run.jobs.iter().map(|j| j.job_id.as_str()).collect();
    assert_eq!(ids, vec!["slow", "fast"]);

    let completed = result
        .events
        .iter()
        .filter(|e| matches!(e, ExecutionEvent::JobCompleted { .. }))
        .count();
    assert_eq!(completed, 2);
}

/// A job that crashes is reported as failed without taking the others down
#[tokio::test]
async fn test_panicking_job_is_contained() {
    let workflow = builtin_workflow();
    let result = run_workflow(
        &workflow,
        RepositoryEvent::push(),
        MockExecutor::new().panic_on("cargo test"),
    )
    .await;

    assert_job_status(&result, "tests", ExecutionStatus::Failed);
    let error = result.job("tests").error.clone().unwrap_or_default();
    assert!(error.contains("Job task failed"), "unexpected error: {}", error);

    assert_job_status(&result, "checks", ExecutionStatus::Succeeded);
    assert_job_status(&result, "msrv", ExecutionStatus::Succeeded);
    assert_eq!(result.run.status, ExecutionStatus::Failed);
    assert_eq!(result.leftover_workspaces(), 0);
}
