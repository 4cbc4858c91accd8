use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::INSTANCE_NAME_PREFIX;

/// Request as it arrives from a caller, before any validation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecRequest {
    pub language: String,
    pub code: String,
}

impl ExecRequest {
    pub fn new(language: &str, code: &str) -> Self {
        Self {
            language: language.to_string(),
            code: code.to_string(),
        }
    }
}

/// A request that passed structural validation and names a supported language.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutionRequest {
    pub language: Language,
    pub code: String,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("language cannot be empty")]
    EmptyLanguage,
    #[error("code cannot be empty")]
    EmptyCode,
    #[error("unsupported language: {language}")]
    UnsupportedLanguage { language: String },
}

impl TryFrom<ExecRequest> for ExecutionRequest {
    type Error = ValidationError;

    fn try_from(req: ExecRequest) -> Result<Self, ValidationError> {
        let language = req.language.trim();
        if language.is_empty() {
            return Err(ValidationError::EmptyLanguage);
        }
        if req.code.trim().is_empty() {
            return Err(ValidationError::EmptyCode);
        }

        Ok(Self {
            language: language.parse()?,
            code: req.code,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Language {
    Python,
    JavaScript,
    Bash,
    C,
    Cpp,
    Java,
}

/// How a language is turned into a running process.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InvocationKind {
    /// `<interpreter> <flag...> <code>`, nothing is written to disk.
    Direct {
        interpreter: &'static str,
        flags: &'static [&'static str],
    },
    /// Source is written to `source_file`, compiled, then the artifact is run.
    CompileThenRun {
        source_file: &'static str,
        compile: &'static str,
        run: &'static str,
    },
}

impl Language {
    pub const ALL: [Language; 6] = [
        Language::Python,
        Language::JavaScript,
        Language::Bash,
        Language::C,
        Language::Cpp,
        Language::Java,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::JavaScript => "javascript",
            Language::Bash => "bash",
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::Java => "java",
        }
    }

    pub fn aliases(&self) -> &'static [&'static str] {
        match self {
            Language::Python => &["python", "python3", "py"],
            Language::JavaScript => &["javascript", "js", "node"],
            Language::Bash => &["bash", "sh", "shell"],
            Language::C => &["c"],
            Language::Cpp => &["cpp", "c++", "cxx"],
            Language::Java => &["java"],
        }
    }

    pub fn invocation_kind(&self) -> InvocationKind {
        match self {
            Language::Python => InvocationKind::Direct {
                interpreter: "python3",
                flags: &["-u", "-c"],
            },
            Language::JavaScript => InvocationKind::Direct {
                interpreter: "node",
                flags: &["-e"],
            },
            Language::Bash => InvocationKind::Direct {
                interpreter: "bash",
                flags: &["-c"],
            },
            Language::C => InvocationKind::CompileThenRun {
                source_file: "main.c",
                compile: "gcc main.c -o main",
                run: "./main",
            },
            Language::Cpp => InvocationKind::CompileThenRun {
                source_file: "main.cpp",
                compile: "g++ main.cpp -o main",
                run: "./main",
            },
            Language::Java => InvocationKind::CompileThenRun {
                source_file: "Main.java",
                compile: "javac Main.java",
                run: "java Main",
            },
        }
    }

    pub fn is_compiled(&self) -> bool {
        matches!(
            self.invocation_kind(),
            InvocationKind::CompileThenRun { .. }
        )
    }
}

impl FromStr for Language {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Language::ALL
            .into_iter()
            .find(|language| language.aliases().contains(&wanted.as_str()))
            .ok_or(ValidationError::UnsupportedLanguage { language: wanted })
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Unique name of one sandboxed process, used to target it for a kill.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct InstanceName(String);

impl InstanceName {
    pub fn generate() -> Self {
        Self(format!(
            "{}-{}",
            INSTANCE_NAME_PREFIX,
            Uuid::new_v4().simple()
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstanceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<std::path::Path> for InstanceName {
    fn as_ref(&self) -> &std::path::Path {
        std::path::Path::new(&self.0)
    }
}
