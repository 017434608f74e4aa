//! Shared fixtures for workflow scenarios

use async_trait::async_trait;
use ci_runner::core::config::WorkflowConfig;
use ci_runner::core::{
    EnvironmentConfig, ExecutionStatus, JobRun, RepositoryEvent, StepState, Workflow, WorkflowRun,
};
use ci_runner::execution::{ExecutionEvent, RepositorySnapshot, SchedulingStrategy, WorkflowEngine};
use ci_runner::shell::{CommandError, CommandExecutor, CommandOutput, Invocation};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

type Rule = Box<dyn Fn(&Invocation) -> Option<CommandOutput> + Send + Sync>;

/// One recorded process invocation
#[derive(Debug, Clone)]
pub struct Call {
    pub invocation: Invocation,

    /// Whether the checked-out sources were present in the working dir at the time
    pub had_sources: bool,
}

impl Call {
    pub fn command(&self) -> String {
        command_line(&self.invocation)
    }

    pub fn job(&self) -> &str {
        self.invocation.env.get("CI_JOB").map(String::as_str).unwrap_or("")
    }

    pub fn env(&self, key: &str) -> Option<&str> {
        self.invocation.env.get(key).map(String::as_str)
    }
}

/// The script for shell invocations, the full command line otherwise
pub fn command_line(invocation: &Invocation) -> String {
    match invocation.program.as_str() {
        "sh" | "cmd" => invocation.args.last().cloned().unwrap_or_default(),
        _ => invocation.to_string(),
    }
}

/// Mock process executor: every command succeeds unless a rule says otherwise
pub struct MockExecutor {
    rules: Vec<Rule>,
    panic_on: Vec<String>,
    delay: Option<Duration>,
    calls: Mutex<Vec<Call>>,
    running: AtomicUsize,
    max_running: AtomicUsize,
}

impl MockExecutor {
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            panic_on: Vec::new(),
            delay: None,
            calls: Mutex::new(Vec::new()),
            running: AtomicUsize::new(0),
            max_running: AtomicUsize::new(0),
        }
    }

    /// Commands containing `needle` exit with `code` and print `stderr`
    pub fn fail_command(self, needle: &str, code: i32, stderr: &str) -> Self {
        let needle = needle.to_string();
        let output = CommandOutput::failure(code, stderr);
        self.fail_when(move |inv| command_line(inv).contains(&needle), output)
    }

    /// Invocations matching `predicate` return `output`
    pub fn fail_when<F>(mut self, predicate: F, output: CommandOutput) -> Self
    where
        F: Fn(&Invocation) -> bool + Send + Sync + 'static,
    {
        self.rules
            .push(Box::new(move |inv| predicate(inv).then(|| output.clone())));
        self
    }

    /// Commands containing `needle` panic
    pub fn panic_on(mut self, needle: &str) -> Self {
        self.panic_on.push(needle.to_string());
        self
    }

    /// Every command takes this long (and honors the invocation's timeout)
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for_job(&self, job_id: &str) -> Vec<Call> {
        self.calls().into_iter().filter(|c| c.job() == job_id).collect()
    }

    pub fn commands_for_job(&self, job_id: &str) -> Vec<String> {
        self.calls_for_job(job_id).iter().map(Call::command).collect()
    }

    pub fn count_matching(&self, needle: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.command().contains(needle))
            .count()
    }

    /// Highest number of commands that were running at the same time
    pub fn max_concurrency(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CommandExecutor for MockExecutor {
    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput, CommandError> {
        let command = command_line(invocation);
        self.calls.lock().unwrap().push(Call {
            invocation: invocation.clone(),
            had_sources: invocation.working_dir.join("Cargo.toml").is_file(),
        });

        if self.panic_on.iter().any(|needle| command.contains(needle)) {
            panic!("mock executor asked to panic on '{}'", command);
        }

        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(now, Ordering::SeqCst);

        let mut result = Ok(());
        if let Some(delay) = self.delay {
            match invocation.timeout {
                Some(limit) if limit < delay => {
                    tokio::time::sleep(limit).await;
                    result = Err(CommandError::Timeout(limit));
                }
                _ => tokio::time::sleep(delay).await,
            }
        }

        self.running.fetch_sub(1, Ordering::SeqCst);
        result?;

        Ok(self
            .rules
            .iter()
            .find_map(|rule| rule(invocation))
            .unwrap_or_else(|| CommandOutput::success(format!("ran: {}\n", command))))
    }
}

/// A throwaway repository with a Cargo manifest and a build directory
pub fn sample_repository() -> TempDir {
    let repo = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(repo.path().join("src")).unwrap();
    std::fs::create_dir_all(repo.path().join("target/debug")).unwrap();
    std::fs::write(
        repo.path().join("Cargo.toml"),
        "[package]\nname = \"sample\"\nversion = \"0.1.0\"\nedition = \"2021\"\n",
    )
    .unwrap();
    std::fs::write(repo.path().join("src/lib.rs"), "pub fn answer() -> u32 { 42 }\n").unwrap();
    std::fs::write(repo.path().join("target/debug/stale"), "old build").unwrap();
    repo
}

pub fn builtin_workflow() -> Workflow {
    WorkflowConfig::builtin().unwrap().to_workflow().unwrap()
}

pub fn workflow_from_yaml(yaml: &str) -> Workflow {
    WorkflowConfig::from_yaml(yaml).unwrap().to_workflow().unwrap()
}

/// Everything a scenario may want to inspect after a run
pub struct TestRun {
    pub run: WorkflowRun,
    pub executor: Arc<MockExecutor>,
    pub events: Vec<ExecutionEvent>,
    pub workspace_base: PathBuf,
    _repo: TempDir,
    _workspaces: TempDir,
}

impl TestRun {
    pub fn job(&self, job_id: &str) -> &JobRun {
        self.run
            .job(job_id)
            .unwrap_or_else(|| panic!("no report for job '{}'", job_id))
    }

    pub fn step_state(&self, job_id: &str, step_name: &str) -> &StepState {
        &self
            .job(job_id)
            .steps
            .iter()
            .find(|s| s.name == step_name)
            .unwrap_or_else(|| panic!("job '{}' has no step '{}'", job_id, step_name))
            .state
    }

    /// Number of `JobStarted` events per job
    pub fn job_starts(&self, job_id: &str) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, ExecutionEvent::JobStarted { job_id: id, .. } if id == job_id))
            .count()
    }

    /// Entries left behind in the workspace base directory
    pub fn leftover_workspaces(&self) -> usize {
        std::fs::read_dir(&self.workspace_base)
            .map(|entries| entries.count())
            .unwrap_or(0)
    }
}

pub async fn run_workflow(
    workflow: &Workflow,
    event: RepositoryEvent,
    executor: MockExecutor,
) -> TestRun {
    run_workflow_with(workflow, event, executor, SchedulingStrategy::Parallel, BTreeMap::new()).await
}

pub async fn run_workflow_with(
    workflow: &Workflow,
    event: RepositoryEvent,
    executor: MockExecutor,
    strategy: SchedulingStrategy,
    overrides: BTreeMap<String, String>,
) -> TestRun {
    let repo = sample_repository();
    let workspaces = tempfile::tempdir().unwrap();
    let snapshot = RepositorySnapshot::new(repo.path()).unwrap();

    let mut env_config = EnvironmentConfig::default();
    env_config
        .host
        .insert("PATH".to_string(), "/usr/bin:/bin".to_string());
    env_config.overrides = overrides;

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();

    let engine = WorkflowEngine::new(executor, strategy)
        .with_environment(env_config)
        .with_workspace_base(workspaces.path())
        .with_event_handler(move |event| sink.lock().unwrap().push(event));

    let run = engine.execute(workflow, &event, &snapshot).await;
    let events = events.lock().unwrap().clone();

    TestRun {
        run,
        executor: engine.executor().clone(),
        events,
        workspace_base: workspaces.path().to_path_buf(),
        _repo: repo,
        _workspaces: workspaces,
    }
}

pub fn assert_job_status(result: &TestRun, job_id: &str, expected: ExecutionStatus) {
    let job = result.job(job_id);
    assert_eq!(
        job.status, expected,
        "job '{}' expected {:?}, got {:?} (steps: {:?})",
        job_id, expected, job.status, job.steps
    );
}

pub fn assert_step_failed(result: &TestRun, job_id: &str, step_name: &str, error_contains: &str) {
    match result.step_state(job_id, step_name) {
        StepState::Failed { error, .. } => assert!(
            error.contains(error_contains),
            "step '{}' of '{}' failed with '{}', expected it to mention '{}'",
            step_name,
            job_id,
            error,
            error_contains
        ),
        other => panic!(
            "step '{}' of '{}' expected to fail, got {:?}",
            step_name, job_id, other
        ),
    }
}

pub fn assert_step_skipped(result: &TestRun, job_id: &str, step_name: &str) {
    assert!(
        matches!(result.step_state(job_id, step_name), StepState::Skipped { .. }),
        "step '{}' of '{}' should have been skipped",
        step_name,
        job_id
    );
}
