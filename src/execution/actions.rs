//! Built-in handlers for reusable actions

use crate::{
    core::{ActionRef, JobContext, Step},
    execution::{
        environment::{EnvironmentError, RepositorySnapshot},
        executor::{ExecutionResult, StepError, StepExecutor},
    },
    shell::{CommandExecutor, CommandOutput, Invocation},
};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info};

/// Actions the runner knows how to perform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinAction {
    /// Copy the repository snapshot into the workspace
    Checkout,
    /// Install a toolchain and select it for later steps
    RustToolchain,
    /// Build cache helper
    RustCache,
}

impl BuiltinAction {
    /// Look up the handler for an action reference; `None` for unsupported actions
    pub fn resolve(action: &ActionRef) -> Option<Self> {
        if action.path.is_some() {
            return None;
        }
        match action.repository.as_str() {
            "actions/checkout" => Some(BuiltinAction::Checkout),
            "dtolnay/rust-toolchain" => Some(BuiltinAction::RustToolchain),
            "Swatinem/rust-cache" => Some(BuiltinAction::RustCache),
            _ => None,
        }
    }

    /// Perform the action for `step`, using the step executor's process runner and snapshot
    pub async fn perform<E: CommandExecutor>(
        self,
        steps: &StepExecutor<E>,
        action: &ActionRef,
        with: &BTreeMap<String, String>,
        step: &Step,
        context: &mut JobContext,
        timeout: Option<Duration>,
    ) -> ExecutionResult {
        match self {
            BuiltinAction::Checkout => checkout(steps.snapshot(), context).await,
            BuiltinAction::RustToolchain => {
                install_toolchain(steps.command_executor(), action, with, step, context, timeout)
                    .await
            }
            BuiltinAction::RustCache => rust_cache(context),
        }
    }
}

async fn checkout(snapshot: &RepositorySnapshot, context: &JobContext) -> ExecutionResult {
    let snapshot = snapshot.clone();
    let workspace = context.workspace.clone();

    let copied = tokio::task::spawn_blocking(move || snapshot.copy_into(&workspace)).await;

    match copied {
        Ok(Ok(count)) => {
            info!("Job {}: checked out {} files", context.job_id, count);
            ExecutionResult::Success {
                output: CommandOutput::success(format!("Checked out {} files\n", count)),
            }
        }
        Ok(Err(e)) => ExecutionResult::Failed {
            error: StepError::Environment(e),
            output: CommandOutput::default(),
        },
        Err(join_error) => ExecutionResult::Failed {
            error: StepError::Environment(EnvironmentError::Copy {
                path: context.workspace.clone(),
                source: std::io::Error::other(join_error.to_string()),
            }),
            output: CommandOutput::default(),
        },
    }
}

/// Split a comma or whitespace separated input
fn list_input(with: &BTreeMap<String, String>, key: &str) -> Vec<String> {
    with.get(key)
        .map(|value| {
            value
                .split(|c: char| c == ',' || c.is_whitespace())
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Toolchain requested by a toolchain action: the `toolchain` input, else the pinned version
pub fn requested_toolchain(action: &ActionRef, with: &BTreeMap<String, String>) -> String {
    with.get("toolchain")
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| action.version.clone())
}

/// Build the `rustup` invocation for a toolchain action
pub fn toolchain_invocation(
    toolchain: &str,
    with: &BTreeMap<String, String>,
    step: &Step,
    context: &JobContext,
) -> Invocation {
    let mut invocation = Invocation::new("rustup", context.workspace.clone()).args([
        "toolchain",
        "install",
        toolchain,
        "--profile",
        "minimal",
        "--no-self-update",
    ]);

    for component in list_input(with, "components") {
        invocation = invocation.args(["--component".to_string(), component]);
    }
    for target in list_input(with, "targets") {
        invocation = invocation.args(["--target".to_string(), target]);
    }

    invocation.with_env(context.env_for_step(step))
}

async fn install_toolchain<E: CommandExecutor>(
    executor: &E,
    action: &ActionRef,
    with: &BTreeMap<String, String>,
    step: &Step,
    context: &mut JobContext,
    timeout: Option<Duration>,
) -> ExecutionResult {
    let toolchain = requested_toolchain(action, with);
    let invocation = toolchain_invocation(&toolchain, with, step, context).with_timeout(timeout);

    debug!("Job {}: installing toolchain {}", context.job_id, toolchain);

    match executor.run(&invocation).await {
        Ok(output) if output.is_success() => {
            info!("Job {}: using toolchain {}", context.job_id, toolchain);
            context.export("RUSTUP_TOOLCHAIN", toolchain.clone());
            context.toolchain = Some(toolchain);
            ExecutionResult::Success { output }
        }
        Ok(output) => ExecutionResult::Failed {
            error: StepError::from_exit(output.exit_code),
            output,
        },
        Err(e) => ExecutionResult::Failed {
            error: StepError::Command(e),
            output: CommandOutput::default(),
        },
    }
}

fn rust_cache(context: &mut JobContext) -> ExecutionResult {
    // Incremental artifacts are useless to a cache and only bloat it
    context.export("CARGO_INCREMENTAL", "0");
    ExecutionResult::Success {
        output: CommandOutput::success("No cache backend configured, nothing restored\n"),
    }
}
