use std::time::Duration;

use tokio::sync::mpsc::{Receiver, Sender};

use crate::core::{
    context::RunContext,
    domain::ExecutionRequest,
    traits::isolation::{IsolationRunner, RunError},
};

/// Emits canned lines, then waits `delay` (or until cancelled) and returns `result`.
#[derive(Debug, Clone)]
pub struct RunnerStub {
    lines: Vec<String>,
    result: Result<(), RunError>,
    delay: Duration,
}

impl RunnerStub {
    pub fn new(lines: Vec<&str>, result: Result<(), RunError>, delay: Duration) -> Self {
        Self {
            lines: lines.into_iter().map(str::to_string).collect(),
            result,
            delay,
        }
    }
}

#[async_trait::async_trait]
impl IsolationRunner for RunnerStub {
    #[tracing::instrument(skip(input, output))]
    async fn run(
        &self,
        ctx: &RunContext,
        request: &ExecutionRequest,
        mut input: Receiver<String>,
        output: Sender<String>,
    ) -> Result<(), RunError> {
        tracing::debug!("Start execution: request={:?}", request);
        for line in &self.lines {
            if output.send(line.clone()).await.is_err() {
                break;
            }
        }

        let wait = async {
            tokio::time::sleep(self.delay).await;
            // Echo whatever input is already queued, like a process reading stdin.
            while let Ok(line) = input.try_recv() {
                if output.send(format!("echo: {}", line)).await.is_err() {
                    break;
                }
            }
        };

        tokio::select! {
            _ = wait => {}
            reason = ctx.done() => {
                tracing::debug!("Execution cancelled: {:?}", reason);
                return Err(RunError::Cancelled(reason));
            }
        }

        tracing::debug!("Execution result: {:?}", self.result);
        self.result.clone()
    }
}
