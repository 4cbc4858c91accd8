use std::time::Duration;

pub const DEFAULT_EXECUTION_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_CONTAINER_IMAGE: &str = "coderunner/repl";
pub const DEFAULT_DOCKER_BIN: &str = "docker";
pub const DEFAULT_CONTAINER_SCRATCH_DIR: &str = "/sandbox/tmp";
pub const DEFAULT_PORT: u16 = 8080;

pub const INPUT_QUEUE_CAPACITY: usize = 5;
pub const OUTPUT_QUEUE_CAPACITY: usize = 5;

/// Exit code the compile-then-run script uses when the compiler rejects the source.
pub const COMPILE_FAILED_EXIT_CODE: i32 = 97;

pub const INSTANCE_NAME_PREFIX: &str = "code-exec";

/// How many trailing output lines a run keeps for error reports.
pub const TRANSCRIPT_LINES: usize = 50;

pub const KILL_TIMEOUT: Duration = Duration::from_secs(10);
pub const KILL_ATTEMPTS: usize = 3;
pub const KILL_RETRY_DELAY: Duration = Duration::from_millis(200);
pub const REAP_TIMEOUT: Duration = Duration::from_secs(5);
pub const DIAGNOSTIC_SEND_TIMEOUT: Duration = Duration::from_secs(1);
