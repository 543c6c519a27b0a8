//! Compilation request orchestration
//!
//! Sequences workspace creation, toolchain invocation, classification and
//! cleanup for one request. Every exit path ends in a [`CompileResponse`].

use std::{sync::Arc, time::Instant};

use super::{
    metrics, CompileRequest, CompileResponse, Invocation, Toolchain, WorkspaceGuard,
    WorkspaceManager,
};
use crate::core::error::CompileResult;

pub const NO_CODE: &str = "No code provided";
pub const TOOLCHAIN_MISSING: &str = "Oker compiler not found. Please build the project first.";
pub const COMPILATION_FAILED: &str = "Compilation failed";

/// Classified result of one compile request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Empty or whitespace-only source; nothing was touched.
    Rejected,
    LaunchFailed,
    /// Carries the bound that was exceeded, in seconds.
    TimedOut(u64),
    /// Exit code zero, with stdout.
    Succeeded(String),
    /// Non-zero exit or signal, with stderr.
    Failed(String),
    /// Anything unanticipated, with a description.
    Faulted(String),
}

impl Outcome {
    /// Classifies a finished invocation. Exit-code semantics live here, not in the invoker.
    pub fn classify(invocation: Invocation, timeout_secs: u64) -> Self {
        match invocation {
            Invocation::LaunchFailed { .. } => Outcome::LaunchFailed,
            Invocation::TimedOut => Outcome::TimedOut(timeout_secs),
            Invocation::Completed {
                exit_code: Some(0),
                stdout,
                ..
            } => Outcome::Succeeded(stdout),
            Invocation::Completed { stderr, .. } => Outcome::Failed(stderr),
        }
    }

    /// Metric label.
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Rejected => "rejected",
            Outcome::LaunchFailed => "launch_failed",
            Outcome::TimedOut(_) => "timed_out",
            Outcome::Succeeded(_) => "succeeded",
            Outcome::Failed(_) => "failed",
            Outcome::Faulted(_) => "faulted",
        }
    }
}

impl From<Outcome> for CompileResponse {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Rejected => CompileResponse::err(NO_CODE),
            Outcome::LaunchFailed => CompileResponse::err(TOOLCHAIN_MISSING),
            Outcome::TimedOut(secs) => {
                CompileResponse::err(format!("Compilation timeout ({secs} seconds)"))
            }
            Outcome::Succeeded(stdout) => CompileResponse::ok(stdout),
            Outcome::Failed(stderr) if stderr.is_empty() => {
                CompileResponse::err(COMPILATION_FAILED)
            }
            Outcome::Failed(stderr) => CompileResponse::err(stderr),
            Outcome::Faulted(description) => {
                CompileResponse::err(format!("Compilation error: {description}"))
            }
        }
    }
}

/// Turns compile requests into bounded toolchain runs.
#[derive(Clone)]
pub struct Orchestrator {
    workspaces: Arc<dyn WorkspaceManager>,
    toolchain: Arc<dyn Toolchain>,
}

impl Orchestrator {
    pub fn new(workspaces: Arc<dyn WorkspaceManager>, toolchain: Arc<dyn Toolchain>) -> Self {
        Self {
            workspaces,
            toolchain,
        }
    }

    /// Handles one request. Never fails: every fault becomes an error response.
    pub async fn handle(&self, request: CompileRequest) -> CompileResponse {
        let start = Instant::now();
        let action = request.action;

        let outcome = self.run(request).await;

        let elapsed = start.elapsed();
        log::info!(
            action = action.as_str(),
            outcome = outcome.label(),
            elapsed_ms = elapsed.as_millis() as u64;
            "Compile request handled"
        );
        metrics::observe(action, &outcome, elapsed);

        outcome.into()
    }

    async fn run(&self, request: CompileRequest) -> Outcome {
        if request.code.trim().is_empty() {
            return Outcome::Rejected;
        }

        let workspaces = self.workspaces.clone();
        let toolchain = self.toolchain.clone();

        // Own task: the run finishes and cleans up even if the client goes away,
        // and a panicking toolchain is contained.
        let task = tokio::spawn(async move {
            compile(workspaces.as_ref(), toolchain.as_ref(), &request).await
        });

        match task.await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                log::error!("Compile request failed: {e}");
                Outcome::Faulted(e.to_string())
            }
            Err(e) => {
                log::error!("Compile task aborted: {e}");
                Outcome::Faulted(format!("compile task aborted: {e}"))
            }
        }
    }
}

async fn compile(
    workspaces: &dyn WorkspaceManager,
    toolchain: &dyn Toolchain,
    request: &CompileRequest,
) -> CompileResult<Outcome> {
    let workspace = workspaces.acquire(&request.code).await?;
    let guard = WorkspaceGuard::new(workspaces, workspace);

    let invocation = toolchain.invoke(guard.path(), request.action).await?;
    Ok(Outcome::classify(invocation, toolchain.timeout().as_secs()))
}
