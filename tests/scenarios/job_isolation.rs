//! Test: Job Isolation - ephemeral workspaces and explicit environments

use crate::helpers::*;
use ci_runner::core::{ExecutionStatus, RepositoryEvent};
use ci_runner::execution::SchedulingStrategy;
use ci_runner::shell::CommandOutput;
use std::collections::{BTreeMap, BTreeSet};

/// Workspaces are gone after the run, whatever the outcome
#[tokio::test]
async fn test_workspaces_are_torn_down() {
    let workflow = builtin_workflow();

    let passing = run_workflow(&workflow, RepositoryEvent::push(), MockExecutor::new()).await;
    assert!(passing.run.is_success());
    assert_eq!(passing.leftover_workspaces(), 0);

    let failing = run_workflow(
        &workflow,
        RepositoryEvent::push(),
        MockExecutor::new().fail_command("cargo build", 101, "error: could not compile"),
    )
    .await;
    assert!(!failing.run.is_success());
    assert_eq!(failing.leftover_workspaces(), 0);
}

/// Each job gets its own workspace, populated by checkout
#[tokio::test]
async fn test_each_job_has_its_own_workspace() {
    let workflow = builtin_workflow();
    let result = run_workflow(&workflow, RepositoryEvent::push(), MockExecutor::new()).await;

    let mut workspaces = BTreeSet::new();
    for job in ["tests", "checks", "msrv"] {
        let calls = result.executor.calls_for_job(job);
        assert!(!calls.is_empty(), "job {} ran nothing", job);

        let dirs: BTreeSet<_> = calls.iter().map(|c| c.invocation.working_dir.clone()).collect();
        assert_eq!(dirs.len(), 1, "job {} changed directories", job);

        let dir = dirs.into_iter().next().unwrap();
        assert!(dir.starts_with(&result.workspace_base));
        for call in &calls {
            assert_eq!(call.env("CI_WORKSPACE"), Some(dir.to_string_lossy().as_ref()));
        }
        assert!(workspaces.insert(dir), "job {} shares a workspace", job);
    }

    for call in result.executor.calls() {
        if call.command().starts_with("cargo ") {
            assert!(call.had_sources, "'{}' ran without sources", call.command());
        }
    }
}

/// Build output in the repository never leaks into a job
#[tokio::test]
async fn test_checkout_leaves_build_directory_behind() {
    let workflow = builtin_workflow();
    let executor = MockExecutor::new().fail_when(
        |inv| inv.working_dir.join("target/debug/stale").exists(),
        CommandOutput::failure(1, "stale build output visible"),
    );

    let result = run_workflow(&workflow, RepositoryEvent::push(), executor).await;

    assert_eq!(result.run.status, ExecutionStatus::Succeeded);
}

/// Process-wide settings reach every command through the environment
#[tokio::test]
async fn test_environment_is_explicit() {
    let workflow = builtin_workflow();
    let mut overrides = BTreeMap::new();
    overrides.insert("CARGO_TERM_COLOR".to_string(), "never".to_string());

    let result = run_workflow_with(
        &workflow,
        RepositoryEvent::push(),
        MockExecutor::new(),
        SchedulingStrategy::Parallel,
        overrides,
    )
    .await;

    let calls = result.executor.calls();
    assert!(!calls.is_empty());
    for call in &calls {
        assert_eq!(call.env("RUSTFLAGS"), Some("-Dwarnings"), "{}", call.command());
        assert_eq!(call.env("RUSTDOCFLAGS"), Some("-Dwarnings"), "{}", call.command());
        assert_eq!(call.env("CARGO_TERM_COLOR"), Some("never"));
        assert_eq!(call.env("PATH"), Some("/usr/bin:/bin"));
        assert_eq!(call.env("CI"), Some("true"));
    }
}

/// A toolchain selected in one job doesn't leak into another
#[tokio::test]
async fn test_toolchain_is_scoped_to_its_job() {
    let workflow = builtin_workflow();
    let result = run_workflow(&workflow, RepositoryEvent::push(), MockExecutor::new()).await;

    for (job, toolchain) in [("tests", "stable"), ("checks", "stable"), ("msrv", "1.70.0")] {
        for call in result.executor.calls_for_job(job) {
            let expected = if call.command().starts_with("rustup ") {
                None
            } else {
                Some(toolchain)
            };
            assert_eq!(
                call.env("RUSTUP_TOOLCHAIN"),
                expected,
                "job {}: {}",
                job,
                call.command()
            );
        }
    }
}

/// Workflow env wins over the host, job env wins over the workflow
#[tokio::test]
async fn test_env_layering() {
    let workflow = workflow_from_yaml(
        r#"
name: Layers
on: push
env:
  PATH: /opt/ci/bin
  LEVEL: workflow
jobs:
  plain:
    steps:
      - run: env
  scoped:
    env:
      LEVEL: job
    steps:
      - run: env
      - run: env --step
        env:
          LEVEL: step
"#,
    );

    let result = run_workflow(&workflow, RepositoryEvent::push(), MockExecutor::new()).await;
    assert!(result.run.is_success());

    let plain = result.executor.calls_for_job("plain");
    assert_eq!(plain[0].env("PATH"), Some("/opt/ci/bin"));
    assert_eq!(plain[0].env("LEVEL"), Some("workflow"));

    let scoped = result.executor.calls_for_job("scoped");
    assert_eq!(scoped[0].env("LEVEL"), Some("job"));
    assert_eq!(scoped[1].env("LEVEL"), Some("step"));
}

/// A workspace directory inside the repository is never checked out into a job
#[tokio::test]
async fn test_workspace_base_inside_repository() {
    use ci_runner::core::EnvironmentConfig;
    use ci_runner::execution::{RepositorySnapshot, WorkflowEngine};

    let repo = sample_repository();
    let base = repo.path().join(".ci-work");
    let executor = MockExecutor::new().fail_when(
        |inv| inv.working_dir.join(".ci-work").exists(),
        CommandOutput::failure(1, "runner workspaces visible in checkout"),
    );

    let engine = WorkflowEngine::new(executor, SchedulingStrategy::Parallel)
        .with_environment(EnvironmentConfig::default())
        .with_workspace_base(&base);
    let snapshot = RepositorySnapshot::new(repo.path()).unwrap();
    let run = engine
        .execute(&builtin_workflow(), &RepositoryEvent::push(), &snapshot)
        .await;

    assert_eq!(run.status, ExecutionStatus::Succeeded, "{:?}", run.jobs);
    for call in engine.executor().calls() {
        if call.command().starts_with("cargo ") {
            assert!(call.had_sources, "'{}' ran without sources", call.command());
        }
    }
    assert_eq!(std::fs::read_dir(&base).unwrap().count(), 0);
}
