use std::collections::VecDeque;
use std::os::unix::process::ExitStatusExt;
use std::process::{ExitStatus, Stdio};

use futures::Stream;
use itertools::Itertools;
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader},
    process::{Child, ChildStderr, ChildStdin, ChildStdout, Command},
    sync::mpsc::{Receiver, Sender},
    task::JoinSet,
};
use tokio_stream::StreamExt;

use crate::{
    constants::{
        DIAGNOSTIC_SEND_TIMEOUT, KILL_ATTEMPTS, KILL_RETRY_DELAY, REAP_TIMEOUT, TRANSCRIPT_LINES,
    },
    core::{
        context::RunContext,
        traits::isolation::{RunError, Terminator},
    },
};

/// A started sandbox process with all three pipes attached.
#[derive(Debug)]
pub struct Sandboxed {
    child: Child,
    stdin: ChildStdin,
    stdout: ChildStdout,
    stderr: ChildStderr,
    compile_marker: Option<String>,
}

/// Last lines the output relay forwarded, oldest first.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Transcript {
    lines: VecDeque<String>,
    compile_failed: bool,
}

impl Transcript {
    pub(crate) fn push(&mut self, line: &str) {
        if self.lines.len() == TRANSCRIPT_LINES {
            self.lines.pop_front();
        }
        self.lines.push_back(line.to_string());
    }

    pub fn text(&self) -> String {
        self.lines.iter().join("\n")
    }

    pub(crate) fn mark_compile_failed(&mut self) {
        self.compile_failed = true;
    }

    /// Whether the compile stage reported failure through its marker line.
    pub fn compile_failed(&self) -> bool {
        self.compile_failed
    }
}

/// What a relay task hands back to the supervisor once it is done.
#[derive(Debug)]
enum RelayOutcome {
    Output(Transcript),
    Input,
}

/// How a supervised run ended, before the caller interprets the exit status.
#[derive(Debug)]
pub struct Finished {
    pub status: ExitStatus,
    pub transcript: Transcript,
}

impl Finished {
    pub fn into_result(self) -> Result<(), RunError> {
        if self.status.success() {
            Ok(())
        } else {
            Err(RunError::Exited {
                code: self.status.code(),
                signal: self.status.signal(),
            })
        }
    }
}

impl Sandboxed {
    /// Spawns `command` with piped stdio. Nothing is left running on failure.
    pub fn spawn(mut command: Command) -> Result<Self, RunError> {
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|e| RunError::SpawnFailed {
            msg: e.to_string(),
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or(RunError::PipeUnavailable { pipe: "stdin" })?;
        let stdout = child
            .stdout
            .take()
            .ok_or(RunError::PipeUnavailable { pipe: "stdout" })?;
        let stderr = child
            .stderr
            .take()
            .ok_or(RunError::PipeUnavailable { pipe: "stderr" })?;

        Ok(Self {
            child,
            stdin,
            stdout,
            stderr,
            compile_marker: None,
        })
    }

    /// Output line the compile stage prints when it fails. It is recorded in
    /// the transcript and never forwarded.
    pub fn with_compile_marker(mut self, marker: Option<&str>) -> Self {
        self.compile_marker = marker.map(str::to_string);
        self
    }

    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Relays both pipes until the process exits or `ctx` is done.
    ///
    /// On cancellation the process is killed through `terminator` and the
    /// cancellation reason is returned. On a natural exit `terminator` sweeps up
    /// anything the process left running. Both relay tasks have finished
    /// whenever this returns.
    #[tracing::instrument(skip_all, fields(sandbox = terminator.target()))]
    pub async fn supervise(
        self,
        ctx: &RunContext,
        terminator: &dyn Terminator,
        input: Receiver<String>,
        output: Sender<String>,
    ) -> Result<Finished, RunError> {
        let Sandboxed {
            mut child,
            stdin,
            stdout,
            stderr,
            compile_marker,
        } = self;

        // Stops the stdin relay once the process is gone, even if the caller keeps input open.
        let stdin_stop = ctx.child();

        let mut relays = JoinSet::new();
        relays.spawn(relay_output(
            ctx.clone(),
            stdout,
            stderr,
            output.clone(),
            compile_marker,
        ));
        relays.spawn(relay_input(stdin_stop.clone(), stdin, input, output.clone()));

        tokio::select! {
            status = child.wait() => {
                if let Err(e) = terminator.sweep().await {
                    tracing::debug!(error = %e, "nothing left to sweep");
                }
                stdin_stop.cancel();
                let transcript = join_relays(&mut relays).await?;
                let status = status.map_err(|e| RunError::WaitFailed { msg: e.to_string() })?;
                tracing::debug!(?status, "process exited");
                Ok(Finished { status, transcript })
            }
            reason = ctx.done() => {
                tracing::warn!(%reason, "terminating sandbox");
                let mut killed = terminator.terminate().await;
                reap(&mut child).await;

                // The first kill can miss a sandbox that registers its name late.
                let mut attempts = 1;
                while let Err(e) = &killed {
                    if attempts == KILL_ATTEMPTS {
                        break;
                    }
                    tracing::debug!(error = %e, attempts, "retrying kill");
                    tokio::time::sleep(KILL_RETRY_DELAY).await;
                    killed = terminator.terminate().await;
                    attempts += 1;
                }

                let diagnostic = match killed {
                    Ok(()) => format!("Sandbox {} killed successfully", terminator.target()),
                    Err(e) => {
                        tracing::warn!(error = %e, attempts, "failed to kill sandbox");
                        format!("Failed to kill sandbox {}: {}", terminator.target(), e)
                    }
                };
                send_diagnostic(&output, diagnostic).await;
                join_relays(&mut relays).await?;
                Err(RunError::Cancelled(reason))
            }
        }
    }
}

async fn reap(child: &mut Child) {
    if let Err(e) = child.start_kill() {
        tracing::debug!(error = %e, "process handle already gone");
    }
    match tokio::time::timeout(REAP_TIMEOUT, child.wait()).await {
        Ok(Ok(status)) => tracing::debug!(?status, "process reaped"),
        Ok(Err(e)) => tracing::warn!(error = %e, "failed to reap process"),
        Err(_) => tracing::warn!("process was not reaped in time"),
    }
}

async fn join_relays(relays: &mut JoinSet<RelayOutcome>) -> Result<Transcript, RunError> {
    let mut transcript = Transcript::default();
    let mut failure = None;

    while let Some(joined) = relays.join_next().await {
        match joined {
            Ok(RelayOutcome::Output(lines)) => transcript = lines,
            Ok(RelayOutcome::Input) => {}
            Err(e) => {
                tracing::error!(error = %e, "relay task failed");
                failure = Some(RunError::RelayPanicked { msg: e.to_string() });
            }
        }
    }

    match failure {
        Some(e) => Err(e),
        None => Ok(transcript),
    }
}

async fn send_diagnostic(output: &Sender<String>, line: String) {
    match tokio::time::timeout(DIAGNOSTIC_SEND_TIMEOUT, output.send(line)).await {
        Ok(Ok(())) => {}
        Ok(Err(_)) => tracing::debug!("output receiver dropped, diagnostic discarded"),
        Err(_) => tracing::warn!("output queue full, diagnostic discarded"),
    }
}

/// Lines of `reader` with the terminator stripped. Invalid UTF-8 is replaced.
fn lossy_lines<R>(reader: R) -> impl Stream<Item = std::io::Result<String>> + Send
where
    R: AsyncRead + Unpin + Send + 'static,
{
    futures::stream::unfold(Some(BufReader::new(reader)), |reader| async move {
        let mut reader = reader?;
        let mut buf = Vec::new();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => None,
            Ok(_) => {
                if buf.last() == Some(&b'\n') {
                    buf.pop();
                    if buf.last() == Some(&b'\r') {
                        buf.pop();
                    }
                }
                Some((Ok(String::from_utf8_lossy(&buf).into_owned()), Some(reader)))
            }
            Err(e) => Some((Err(e), None)),
        }
    })
}

async fn relay_output(
    ctx: RunContext,
    stdout: ChildStdout,
    stderr: ChildStderr,
    output: Sender<String>,
    compile_marker: Option<String>,
) -> RelayOutcome {
    let merged = lossy_lines(stdout).merge(lossy_lines(stderr));
    tokio::pin!(merged);
    let mut transcript = Transcript::default();

    loop {
        let next = tokio::select! {
            biased;
            _ = ctx.done() => break,
            next = merged.next() => next,
        };

        let line = match next {
            Some(Ok(line)) => line,
            Some(Err(e)) => {
                tracing::warn!(error = %e, "failed to read process output");
                continue;
            }
            None => break,
        };

        if compile_marker.as_deref() == Some(line.as_str()) {
            transcript.mark_compile_failed();
            continue;
        }
        transcript.push(&line);
        tokio::select! {
            biased;
            _ = ctx.done() => break,
            sent = output.send(line) => {
                if sent.is_err() {
                    tracing::debug!("output receiver dropped");
                    break;
                }
            }
        }
    }

    RelayOutcome::Output(transcript)
}

async fn relay_input(
    stop: RunContext,
    mut stdin: ChildStdin,
    mut input: Receiver<String>,
    output: Sender<String>,
) -> RelayOutcome {
    loop {
        let line = tokio::select! {
            biased;
            _ = stop.done() => break,
            line = input.recv() => line,
        };
        let Some(line) = line else {
            tracing::debug!("input closed");
            break;
        };

        let written = tokio::select! {
            biased;
            _ = stop.done() => break,
            written = write_line(&mut stdin, &line) => written,
        };
        if let Err(e) = written {
            tracing::debug!(error = %e, "failed to write to stdin");
            tokio::select! {
                _ = stop.done() => {}
                _ = output.send(format!("Error writing to stdin: {}", e)) => {}
            }
            break;
        }
    }

    // Dropping stdin delivers EOF to the process.
    drop(stdin);
    RelayOutcome::Input
}

async fn write_line(stdin: &mut ChildStdin, line: &str) -> std::io::Result<()> {
    stdin.write_all(line.as_bytes()).await?;
    stdin.write_all(b"\n").await?;
    stdin.flush().await
}
