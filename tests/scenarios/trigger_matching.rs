//! Test: Trigger Matching - which events start the workflow

use crate::helpers::*;
use ci_runner::core::{EventKind, ExecutionStatus, RepositoryEvent};
use ci_runner::execution::ExecutionEvent;

/// Events outside the trigger set never execute anything
#[tokio::test]
async fn test_other_events_never_execute() {
    let workflow = builtin_workflow();

    for name in ["release", "schedule", "workflow_dispatch", "issues"] {
        let event = RepositoryEvent::new(EventKind::Other(name.to_string()));
        let result = run_workflow(&workflow, event, MockExecutor::new()).await;

        assert_eq!(result.run.status, ExecutionStatus::NotTriggered, "event {}", name);
        assert!(result.run.is_success());
        assert!(result.run.jobs.is_empty());
        assert!(result.executor.calls().is_empty(), "event {} ran commands", name);
        assert_eq!(result.leftover_workspaces(), 0);
        assert!(matches!(
            result.events.as_slice(),
            [ExecutionEvent::WorkflowSkipped { .. }]
        ));
    }
}

/// Push and pull request each run all three jobs exactly once
#[tokio::test]
async fn test_push_and_pull_request_run_every_job_once() {
    let workflow = builtin_workflow();

    for event in [RepositoryEvent::push(), RepositoryEvent::pull_request()] {
        let result = run_workflow(&workflow, event.clone(), MockExecutor::new()).await;

        assert_eq!(result.run.status, ExecutionStatus::Succeeded, "event {}", event);
        let ids: Vec<_> = result.run.jobs.iter().map(|j| j.job_id.as_str()).collect();
        assert_eq!(ids, vec!["tests", "checks", "msrv"]);

        for job in ["tests", "checks", "msrv"] {
            assert_eq!(result.job_starts(job), 1, "job {} on {}", job, event);
            assert_job_status(&result, job, ExecutionStatus::Succeeded);
        }

        assert_eq!(result.executor.count_matching("cargo test --workspace"), 1);
        assert_eq!(result.executor.count_matching("cargo clippy"), 1);
        assert_eq!(result.executor.count_matching("cargo check --workspace"), 1);
    }
}

/// Every step of a passing job runs in declaration order
#[tokio::test]
async fn test_steps_run_in_order() {
    let workflow = builtin_workflow();
    let result = run_workflow(&workflow, RepositoryEvent::push(), MockExecutor::new()).await;

    assert_eq!(
        result.executor.commands_for_job("checks"),
        vec![
            "rustup toolchain install stable --profile minimal --no-self-update --component clippy --component rustfmt",
            "cargo clippy --workspace --all-targets --all-features",
            "cargo fmt --all -- --check",
            "cargo doc --workspace --no-deps",
        ]
    );
}

/// Branch filters narrow a trigger
#[tokio::test]
async fn test_branch_filters() {
    let workflow = workflow_from_yaml(
        r#"
name: Filtered
on:
  push:
    branches: [main, "release/**"]
  pull_request:
    branches-ignore: ["dependabot/*"]
jobs:
  build:
    steps:
      - run: cargo build
"#,
    );

    let cases = [
        (RepositoryEvent::push().with_branch("main"), true),
        (RepositoryEvent::push().with_branch("release/1.2/hotfix"), true),
        (RepositoryEvent::push().with_branch("feature/x"), false),
        (RepositoryEvent::pull_request().with_branch("feature/x"), true),
        (RepositoryEvent::pull_request().with_branch("dependabot/cargo"), false),
        (RepositoryEvent::push(), true),
    ];

    for (event, expected) in cases {
        let result = run_workflow(&workflow, event.clone(), MockExecutor::new()).await;
        let ran = result.run.status != ExecutionStatus::NotTriggered;
        assert_eq!(ran, expected, "event {}", event);
        assert_eq!(result.executor.count_matching("cargo build") == 1, expected);
    }
}
