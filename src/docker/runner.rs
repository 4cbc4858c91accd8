use std::path::{Path, PathBuf};

use itertools::Itertools;
use tokio::{
    process::Command,
    sync::mpsc::{Receiver, Sender},
};

use crate::{
    constants::KILL_TIMEOUT,
    core::{
        commands::{Invocation, build_invocation},
        context::RunContext,
        domain::{ExecutionRequest, InstanceName},
        policy::SANDBOX_POLICY,
        supervisor::Sandboxed,
        traits::isolation::{IsolationRunner, RunError, TerminateError, Terminator},
    },
};

/// Runs each request in a fresh `docker run --rm` container.
#[derive(Clone, Debug)]
pub struct DockerRunner {
    docker_bin: PathBuf,
    image: String,
    scratch_root: PathBuf,
}

impl DockerRunner {
    pub fn new<T, U>(docker_bin: T, image: &str, scratch_root: U) -> Self
    where
        T: AsRef<Path>,
        U: AsRef<Path>,
    {
        DockerRunner {
            docker_bin: docker_bin.as_ref().into(),
            image: image.to_string(),
            scratch_root: scratch_root.as_ref().into(),
        }
    }

    /// Full `docker` argument list for one sandboxed invocation.
    pub fn run_args(&self, name: &InstanceName, invocation: &Invocation) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "--rm".to_string(),
            "--name".to_string(),
            name.to_string(),
            "-i".to_string(),
        ];
        args.extend(SANDBOX_POLICY.docker_args());
        args.push(self.image.clone());
        args.extend(invocation.argv.iter().cloned());
        args
    }
}

#[async_trait::async_trait]
impl IsolationRunner for DockerRunner {
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
        let args = self.run_args(&name, &invocation);
        tracing::debug!(%name, "docker {}", args.iter().join(" "));

        let mut command = Command::new(&self.docker_bin);
        command.args(&args);
        let sandboxed =
            Sandboxed::spawn(command)?.with_compile_marker(invocation.compile_marker.as_deref());

        let terminator = DockerKill::new(&self.docker_bin, name);
        let finished = sandboxed.supervise(ctx, &terminator, input, output).await?;
        invocation.outcome(finished)
    }
}

/// Kills a container through `docker kill <name>`.
#[derive(Clone, Debug)]
pub struct DockerKill {
    docker_bin: PathBuf,
    name: InstanceName,
}

impl DockerKill {
    pub fn new(docker_bin: &Path, name: InstanceName) -> Self {
        Self {
            docker_bin: docker_bin.to_path_buf(),
            name,
        }
    }
}

#[async_trait::async_trait]
impl Terminator for DockerKill {
    fn target(&self) -> &str {
        self.name.as_str()
    }

    async fn terminate(&self) -> Result<(), TerminateError> {
        let kill = Command::new(&self.docker_bin)
            .arg("kill")
            .arg(self.name.as_str())
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
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::mpsc;

    use super::*;
    use crate::core::{context::Cancellation, domain::Language};

    fn runner() -> DockerRunner {
        DockerRunner::new("docker", "coderunner/repl", "/sandbox/tmp")
    }

    fn docker_image() -> String {
        std::env::var("DOCKER_IMAGE").unwrap_or_else(|_| "coderunner/repl".to_string())
    }

    #[test]
    fn test_run_args_apply_policy_before_image() {
        let name = InstanceName::generate();
        let invocation = build_invocation(Language::Python, "print('hello')", Path::new("/sandbox/tmp/x"));

        let args = runner().run_args(&name, &invocation);

        assert_eq!(&args[..5], &["run", "--rm", "--name", name.as_str(), "-i"]);
        let image_at = args.iter().position(|arg| arg == "coderunner/repl").unwrap();
        for flag in ["--cap-drop=ALL", "--net=none", "--pids-limit=20", "-m"] {
            let at = args.iter().position(|arg| arg == flag).unwrap();
            assert!(at < image_at, "{flag} must precede the image");
        }
        assert_eq!(&args[image_at + 1..], &["python3", "-u", "-c", "print('hello')"]);
    }

    #[test]
    fn test_compiled_languages_use_instance_scratch() {
        let name = InstanceName::generate();
        let scratch = Path::new("/sandbox/tmp").join(&name);
        let invocation = build_invocation(Language::C, "int main(){}", &scratch);

        let args = runner().run_args(&name, &invocation);

        assert!(args.contains(&format!("/sandbox/tmp/{}", name)));
    }

    #[tokio::test]
    async fn test_spawn_failure_when_docker_is_missing() {
        let runner = DockerRunner::new("/nonexistent/docker", "coderunner/repl", "/sandbox/tmp");
        let (_input_tx, input_rx) = mpsc::channel(1);
        let (output_tx, _output_rx) = mpsc::channel(1);
        let request = ExecutionRequest {
            language: Language::Python,
            code: "print('hi')".to_string(),
        };

        let result = runner
            .run(&RunContext::new(), &request, input_rx, output_tx)
            .await;

        assert!(matches!(result, Err(RunError::SpawnFailed { .. })));
    }

    #[tokio::test]
    async fn test_kill_reports_missing_docker_binary() {
        let kill = DockerKill::new(Path::new("/nonexistent/docker"), InstanceName::generate());

        assert!(matches!(
            kill.terminate().await,
            Err(TerminateError::Launch { .. })
        ));
    }

    #[tokio::test]
    #[ignore = "requires docker and the sandbox image"]
    async fn test_python_hello_in_container() {
        let runner = DockerRunner::new("docker", &docker_image(), "/sandbox/tmp");
        let (_input_tx, input_rx) = mpsc::channel(1);
        let (output_tx, mut output_rx) = mpsc::channel(16);
        let request = ExecutionRequest {
            language: Language::Python,
            code: "print('hi')".to_string(),
        };

        let result = runner
            .run(&RunContext::new(), &request, input_rx, output_tx)
            .await;

        assert_eq!(result, Ok(()));
        assert_eq!(output_rx.recv().await, Some("hi".to_string()));
    }

    #[tokio::test]
    #[ignore = "requires docker and the sandbox image"]
    async fn test_infinite_loop_container_is_killed() {
        let runner = DockerRunner::new("docker", &docker_image(), "/sandbox/tmp");
        let (_input_tx, input_rx) = mpsc::channel(1);
        let (output_tx, mut output_rx) = mpsc::channel(16);
        let request = ExecutionRequest {
            language: Language::Python,
            code: "while True: pass".to_string(),
        };
        let ctx = RunContext::new().with_timeout(Duration::from_millis(100));

        let result = runner.run(&ctx, &request, input_rx, output_tx).await;

        assert_eq!(result, Err(RunError::Cancelled(Cancellation::DeadlineExceeded)));
        let mut lines = Vec::new();
        while let Some(line) = output_rx.recv().await {
            lines.push(line);
        }
        assert!(lines.iter().any(|line| line.contains("kill")));
    }

    #[tokio::test]
    #[ignore = "requires docker and the sandbox image"]
    async fn test_c_compilation_error_in_container() {
        let runner = DockerRunner::new("docker", &docker_image(), "/sandbox/tmp");
        let (_input_tx, input_rx) = mpsc::channel(1);
        let (output_tx, _output_rx) = mpsc::channel(64);
        let request = ExecutionRequest {
            language: Language::C,
            code: "int main() { return 0 }".to_string(),
        };

        let result = runner
            .run(&RunContext::new(), &request, input_rx, output_tx)
            .await;

        assert!(matches!(result, Err(RunError::Compilation { .. })));
    }
}
