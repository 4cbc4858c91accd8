use tokio::sync::mpsc::{Receiver, Sender};

use crate::core::{context::Cancellation, context::RunContext, domain::ExecutionRequest};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RunError {
    #[error("failed to start process: {msg}")]
    SpawnFailed { msg: String },
    #[error("{pipe} pipe was not attached")]
    PipeUnavailable { pipe: &'static str },
    #[error("failed to prepare scratch directory: {msg}")]
    Scratch { msg: String },
    #[error("failed to wait for process: {msg}")]
    WaitFailed { msg: String },
    #[error("compilation failed:\n{diagnostics}")]
    Compilation { diagnostics: String },
    #[error("{}", describe_exit(*code, *signal))]
    Exited {
        code: Option<i32>,
        signal: Option<i32>,
    },
    #[error(transparent)]
    Cancelled(#[from] Cancellation),
    #[error("relay task failed: {msg}")]
    RelayPanicked { msg: String },
}

fn describe_exit(code: Option<i32>, signal: Option<i32>) -> String {
    match (code, signal) {
        (Some(code), _) => format!("process exited with status {}", code),
        (None, Some(signal)) => format!("process killed by signal {}", signal),
        (None, None) => "process exited abnormally".to_string(),
    }
}

/// Runs one request inside an isolated process, relaying `input` to its stdin
/// and its combined stdout/stderr to `output`.
///
/// Implementations must not return while any task they spawned is still alive,
/// and must forcibly terminate the process once `ctx` is done.
#[mockall::automock]
#[async_trait::async_trait]
pub trait IsolationRunner: std::fmt::Debug + Send + Sync {
    async fn run(
        &self,
        ctx: &RunContext,
        request: &ExecutionRequest,
        input: Receiver<String>,
        output: Sender<String>,
    ) -> Result<(), RunError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TerminateError {
    #[error("failed to issue kill: {msg}")]
    Launch { msg: String },
    #[error("kill exited with status {status}: {stderr}")]
    Rejected { status: i32, stderr: String },
    #[error("kill did not finish in time")]
    TimedOut,
}

/// Forcibly stops a sandboxed process by its name rather than by handle.
#[async_trait::async_trait]
pub trait Terminator: std::fmt::Debug + Send + Sync {
    fn target(&self) -> &str;

    async fn terminate(&self) -> Result<(), TerminateError>;

    /// Kills whatever the process left behind after exiting on its own.
    async fn sweep(&self) -> Result<(), TerminateError> {
        Ok(())
    }
}
