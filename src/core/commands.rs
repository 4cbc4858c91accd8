use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::{
    constants::COMPILE_FAILED_EXIT_CODE,
    core::{
        domain::{InvocationKind, Language},
        supervisor::Finished,
        traits::isolation::RunError,
    },
};

/// What to run inside the sandbox for one request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Invocation {
    pub language: Language,
    pub argv: Vec<String>,
    pub scratch_dir: PathBuf,
    /// Line the compile stage prints right before exiting with the reserved code.
    /// Unique per invocation, so user programs cannot forge it.
    pub compile_marker: Option<String>,
}

impl Invocation {
    pub fn has_compile_stage(&self) -> bool {
        self.compile_marker.is_some()
    }

    /// Interprets how the process ended. Only the reserved exit code together
    /// with the compile marker becomes [`RunError::Compilation`]; a compiled
    /// program exiting with the same code is an ordinary runtime failure.
    pub fn outcome(&self, finished: Finished) -> Result<(), RunError> {
        if self.has_compile_stage()
            && finished.transcript.compile_failed()
            && finished.status.code() == Some(COMPILE_FAILED_EXIT_CODE)
        {
            return Err(RunError::Compilation {
                diagnostics: finished.transcript.text(),
            });
        }
        finished.into_result()
    }
}

/// Maps a language and its source to the command that runs it.
///
/// Compiled languages get a small `sh` script that receives the scratch
/// directory, the source and the compile marker as positional parameters, so
/// the code is never spliced into shell text.
pub fn build_invocation(language: Language, code: &str, scratch_dir: &Path) -> Invocation {
    let (argv, compile_marker) = match language.invocation_kind() {
        InvocationKind::Direct { interpreter, flags } => {
            let mut argv = vec![interpreter.to_string()];
            argv.extend(flags.iter().map(|flag| flag.to_string()));
            argv.push(code.to_string());
            (argv, None)
        }
        InvocationKind::CompileThenRun {
            source_file,
            compile,
            run,
        } => {
            let marker = format!("compile-failed-{}", Uuid::new_v4().simple());
            let argv = vec![
                "sh".to_string(),
                "-c".to_string(),
                compile_then_run_script(source_file, compile, run),
                "sh".to_string(),
                scratch_dir.to_string_lossy().to_string(),
                code.to_string(),
                marker.clone(),
            ];
            (argv, Some(marker))
        }
    };

    Invocation {
        language,
        argv,
        scratch_dir: scratch_dir.to_path_buf(),
        compile_marker,
    }
}

fn compile_then_run_script(source_file: &str, compile: &str, run: &str) -> String {
    format!(
        "mkdir -p \"$1\" && cd \"$1\" && printf '%s' \"$2\" > {source_file} || exit 1\n\
         {compile} 2>&1 || {{ printf '%s\\n' \"$3\"; exit {COMPILE_FAILED_EXIT_CODE}; }}\n\
         exec {run}\n"
    )
}
