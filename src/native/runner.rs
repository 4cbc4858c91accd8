use std::path::{Path, PathBuf};

use tokio::{
    fs,
    process::Command,
    sync::mpsc::{Receiver, Sender},
};

use crate::{
    constants::KILL_TIMEOUT,
    core::{
        commands::build_invocation,
        context::RunContext,
        domain::{ExecutionRequest, InstanceName},
        policy::SANDBOX_POLICY,
        supervisor::Sandboxed,
        traits::isolation::{IsolationRunner, RunError, TerminateError, Terminator},
    },
};

/// Runs each request as a local process group under `sh` with the policy's ulimits.
///
/// There is no network or capability isolation here, so this backend is only
/// meant for development machines and tests.
#[derive(Clone, Debug)]
pub struct NativeRunner {
    scratch_root: PathBuf,
}

impl NativeRunner {
    pub fn new<T>(scratch_root: T) -> Self
    where
        T: AsRef<Path>,
    {
        NativeRunner {
            scratch_root: scratch_root.as_ref().into(),
        }
    }
}

#[async_trait::async_trait]
impl IsolationRunner for NativeRunner {
    #[tracing::instrument(skip_all, fields(language = %request.language))]
    async fn run(
        &self,
        ctx: &RunContext,
        request: &ExecutionRequest,
        input: Receiver<String>,
        output: Sender<String>,
    ) -> Result<(), RunError> {
        let name = InstanceName::generate();
        let invocation = build_invocation(
            request.language,
            &request.code,
            &self.scratch_root.join(&name),
        );

        fs::create_dir_all(&self.scratch_root)
            .await
            .map_err(|e| RunError::Scratch { msg: e.to_string() })?;

        let mut command = Command::new("sh");
        command
            .arg("-c")
            .arg(SANDBOX_POLICY.ulimit_prelude())
            .arg("sh")
            .args(&invocation.argv)
            .current_dir(&self.scratch_root)
            .process_group(0);

        let sandboxed =
            Sandboxed::spawn(command)?.with_compile_marker(invocation.compile_marker.as_deref());
        let pgid = sandboxed.id().ok_or(RunError::SpawnFailed {
            msg: "process exited before its id was read".to_string(),
        })?;

        let terminator = ProcessGroupKill::new(name, pgid);
        let finished = sandboxed.supervise(ctx, &terminator, input, output).await;

        let scratch_dir = &invocation.scratch_dir;
        if fs::try_exists(scratch_dir).await.unwrap_or(false) {
            if let Err(e) = fs::remove_dir_all(scratch_dir).await {
                tracing::warn!(error = %e, dir = %scratch_dir.display(), "failed to remove scratch dir");
            }
        }

        invocation.outcome(finished?)
    }
}

/// Kills the whole process group the sandboxed shell leads.
#[derive(Clone, Debug)]
pub struct ProcessGroupKill {
    name: InstanceName,
    pgid: u32,
}

impl ProcessGroupKill {
    pub fn new(name: InstanceName, pgid: u32) -> Self {
        Self { name, pgid }
    }
}

#[async_trait::async_trait]
impl Terminator for ProcessGroupKill {
    fn target(&self) -> &str {
        self.name.as_str()
    }

    async fn terminate(&self) -> Result<(), TerminateError> {
        // The shell builtin accepts a negative pid as a process group everywhere.
        let kill = Command::new("sh")
            .arg("-c")
            .arg("kill -KILL -\"$1\"")
            .arg("sh")
            .arg(self.pgid.to_string())
            .output();

        let out = tokio::time::timeout(KILL_TIMEOUT, kill)
            .await
            .map_err(|_| TerminateError::TimedOut)?
            .map_err(|e| TerminateError::Launch { msg: e.to_string() })?;

        if !out.status.success() {
            return Err(TerminateError::Rejected {
                status: out.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&out.stderr).trim().to_string(),
            });
        }

        Ok(())
    }

    async fn sweep(&self) -> Result<(), TerminateError> {
        self.terminate().await
    }
}
