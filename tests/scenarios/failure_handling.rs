//! Test: Failure Handling - abort-on-failure inside a job, isolation between jobs

use crate::helpers::*;
use ci_runner::core::{ExecutionStatus, RepositoryEvent};
use ci_runner::execution::ExecutionEvent;

/// The test step keeps going after a failing test, and still fails the job
#[tokio::test]
async fn test_failing_test_fails_tests_job() {
    let workflow = builtin_workflow();
    let executor = MockExecutor::new().fail_command(
        "cargo test",
        101,
        "test parser::empty ... FAILED\ntest result: FAILED. 11 passed; 1 failed\n",
    );

    let result = run_workflow(&workflow, RepositoryEvent::push(), executor).await;

    let test_commands: Vec<_> = result
        .executor
        .commands_for_job("tests")
        .into_iter()
        .filter(|c| c.starts_with("cargo test"))
        .collect();
    assert_eq!(test_commands, vec!["cargo test --workspace --no-fail-fast"]);

    assert_job_status(&result, "tests", ExecutionStatus::Failed);
    assert_step_failed(&result, "tests", "Test", "test result: FAILED");
    assert_job_status(&result, "checks", ExecutionStatus::Succeeded);
    assert_job_status(&result, "msrv", ExecutionStatus::Succeeded);
    assert_eq!(result.run.status, ExecutionStatus::Failed);
}

/// A lint escalated to an error by the workflow env fails Checks and nothing else
#[tokio::test]
async fn test_lint_warning_fails_checks() {
    let workflow = builtin_workflow();
    let executor = MockExecutor::new().fail_when(
        |inv| {
            command_line(inv).starts_with("cargo clippy")
                && inv.env.get("RUSTFLAGS").map(String::as_str) == Some("-Dwarnings")
        },
        ci_runner::shell::CommandOutput::failure(
            101,
            "error: unused variable: `x`\n  = note: `-D unused-variables` implied by `-D warnings`\n",
        ),
    );

    let result = run_workflow(&workflow, RepositoryEvent::pull_request(), executor).await;

    assert_job_status(&result, "checks", ExecutionStatus::Failed);
    assert_step_failed(&result, "checks", "Clippy", "Process exited with code 101");
    assert_step_skipped(&result, "checks", "Format");
    assert_step_skipped(&result, "checks", "Docs");
    assert_job_status(&result, "tests", ExecutionStatus::Succeeded);
    assert_job_status(&result, "msrv", ExecutionStatus::Succeeded);
    assert!(!result.run.is_success());
}

/// Steps after a failure are reported as skipped and never reach the executor
#[tokio::test]
async fn test_steps_after_failure_never_run() {
    let workflow = builtin_workflow();
    let executor = MockExecutor::new().fail_command("cargo build", 101, "error[E0425]: cannot find value");

    let result = run_workflow(&workflow, RepositoryEvent::push(), executor).await;

    assert_step_failed(&result, "tests", "Build", "cannot find value");
    assert_step_skipped(&result, "tests", "Test");
    assert_eq!(result.executor.count_matching("cargo test"), 0);

    let skipped: Vec<_> = result
        .events
        .iter()
        .filter_map(|e| match e {
            ExecutionEvent::StepSkipped { job_id, step_name, .. } if job_id == "tests" => {
                Some(step_name.as_str())
            }
            _ => None,
        })
        .collect();
    assert_eq!(skipped, vec!["Test"]);
}

/// Overall result is a failure exactly when some job fails
#[tokio::test]
async fn test_aggregate_result() {
    let workflow = builtin_workflow();

    let passing = run_workflow(&workflow, RepositoryEvent::push(), MockExecutor::new()).await;
    assert_eq!(passing.run.status, ExecutionStatus::Succeeded);
    assert!(passing.run.failed_jobs().is_empty());

    let failing = run_workflow(
        &workflow,
        RepositoryEvent::push(),
        MockExecutor::new()
            .fail_command("cargo fmt", 1, "Diff in src/lib.rs")
            .fail_command("cargo check", 101, "error[E0658]: use of unstable library feature"),
    )
    .await;
    assert_eq!(failing.run.status, ExecutionStatus::Failed);

    let failed: Vec<_> = failing.run.failed_jobs().iter().map(|j| j.job_id.clone()).collect();
    assert_eq!(failed, vec!["checks", "msrv"]);
}

/// Actions without a built-in handler fail their step
#[tokio::test]
async fn test_unsupported_action_fails_job() {
    let workflow = workflow_from_yaml(
        r#"
name: Artifacts
on: push
jobs:
  package:
    steps:
      - run: cargo package
      - name: Upload
        uses: actions/upload-artifact@v4
        with:
          path: target/package
      - run: echo done
"#,
    );

    let result = run_workflow(&workflow, RepositoryEvent::push(), MockExecutor::new()).await;

    assert_job_status(&result, "package", ExecutionStatus::Failed);
    assert_step_failed(&result, "package", "Upload", "Unsupported action");
    assert_step_skipped(&result, "package", "Run echo done");
    assert_eq!(result.executor.count_matching("echo done"), 0);
}

/// A job whose budget runs out fails at the step that overran it
#[tokio::test]
async fn test_job_timeout_fails_running_step() {
    let mut workflow = workflow_from_yaml(
        r#"
name: Slow
on: push
jobs:
  slow:
    steps:
      - run: first
      - run: second
      - run: third
"#,
    );
    workflow.jobs[0].timeout = Some(std::time::Duration::from_millis(300));

    let executor = MockExecutor::new().with_delay(std::time::Duration::from_millis(200));
    let result = run_workflow(&workflow, RepositoryEvent::push(), executor).await;

    assert_job_status(&result, "slow", ExecutionStatus::Failed);
    assert!(matches!(
        result.step_state("slow", "Run first"),
        ci_runner::core::StepState::Succeeded { .. }
    ));
    assert_step_failed(&result, "slow", "Run second", "Timed out");
    assert_step_skipped(&result, "slow", "Run third");
}
