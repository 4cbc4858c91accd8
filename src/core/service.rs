use std::sync::Arc;
use std::time::Duration;

use tokio::{
    sync::mpsc::{self, Receiver, Sender},
    time::Instant,
};

use crate::{
    constants::{INPUT_QUEUE_CAPACITY, OUTPUT_QUEUE_CAPACITY},
    core::{
        context::{Cancellation, RunContext},
        domain::{ExecRequest, ExecutionRequest, Language, ValidationError},
        traits::isolation::{IsolationRunner, RunError},
    },
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecutionError {
    #[error("invalid request: {0}")]
    Invalid(#[from] ValidationError),
    #[error("execution timed out after {}", humanize(*timeout))]
    TimedOut { timeout: Duration },
    #[error("execution cancelled")]
    Cancelled,
    #[error("{language} compilation error:\n{diagnostics}")]
    Compilation {
        language: Language,
        diagnostics: String,
    },
    #[error("{language} execution failed: {source}")]
    Runtime { language: Language, source: RunError },
}

fn humanize(timeout: Duration) -> String {
    if timeout.subsec_millis() == 0 {
        format!("{}s", timeout.as_secs())
    } else {
        format!("{}ms", timeout.as_millis())
    }
}

/// Output gathered by [`ExecutionService::execute`] along with the outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectedOutput {
    pub output: String,
    pub result: Result<(), ExecutionError>,
}

/// Validates requests, bounds them with the request deadline and hands them
/// to the configured isolation backend.
#[derive(Clone, Debug)]
pub struct ExecutionService {
    runner: Arc<dyn IsolationRunner>,
    timeout: Duration,
}

impl ExecutionService {
    pub fn new(runner: Arc<dyn IsolationRunner>, timeout: Duration) -> Self {
        Self { runner, timeout }
    }

    #[tracing::instrument(skip_all, fields(language = %request.language))]
    pub async fn execute_interactive(
        &self,
        ctx: &RunContext,
        request: ExecRequest,
        input: Receiver<String>,
        output: Sender<String>,
    ) -> Result<(), ExecutionError> {
        let request = ExecutionRequest::try_from(request).inspect_err(|e| {
            tracing::info!(error = %e, "rejected request");
        })?;
        let language = request.language;

        let ctx = ctx.with_timeout(self.timeout);
        let started = Instant::now();
        if let Some(deadline) = ctx.deadline() {
            let budget_ms = deadline.saturating_duration_since(started).as_millis() as u64;
            tracing::debug!(budget_ms, "running with deadline");
        }
        let result = self.runner.run(&ctx, &request, input, output).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(()) => {
                tracing::info!(elapsed_ms, "execution finished");
                Ok(())
            }
            Err(RunError::Cancelled(Cancellation::DeadlineExceeded)) => {
                tracing::warn!(elapsed_ms, timeout_ms = self.timeout.as_millis() as u64, "execution timed out");
                Err(ExecutionError::TimedOut {
                    timeout: self.timeout,
                })
            }
            Err(RunError::Cancelled(Cancellation::Cancelled)) => {
                tracing::info!(elapsed_ms, "execution cancelled by caller");
                Err(ExecutionError::Cancelled)
            }
            Err(RunError::Compilation { diagnostics }) => {
                tracing::info!(elapsed_ms, "compilation failed");
                Err(ExecutionError::Compilation {
                    language,
                    diagnostics,
                })
            }
            Err(source) => {
                tracing::error!(elapsed_ms, error = %source, "execution failed");
                Err(ExecutionError::Runtime { language, source })
            }
        }
    }

    /// Runs a request without interactive input and returns everything it printed.
    #[tracing::instrument(skip_all)]
    pub async fn execute(&self, request: ExecRequest) -> CollectedOutput {
        let (input_tx, input_rx) = mpsc::channel(INPUT_QUEUE_CAPACITY);
        drop(input_tx);
        let (output_tx, mut output_rx) = mpsc::channel(OUTPUT_QUEUE_CAPACITY);

        let ctx = RunContext::new();
        let execution = self.execute_interactive(&ctx, request, input_rx, output_tx);
        let collection = async {
            let mut collected = String::new();
            while let Some(line) = output_rx.recv().await {
                collected.push_str(&line);
                collected.push('\n');
            }
            collected
        };

        let (result, output) = tokio::join!(execution, collection);
        CollectedOutput { output, result }
    }
}
