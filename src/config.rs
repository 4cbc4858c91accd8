use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::constants::{
    DEFAULT_CONTAINER_IMAGE, DEFAULT_CONTAINER_SCRATCH_DIR, DEFAULT_DOCKER_BIN,
    DEFAULT_EXECUTION_TIMEOUT, DEFAULT_PORT,
};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?} ({reason})")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Backend {
    Docker,
    Native,
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "docker" => Ok(Backend::Docker),
            "native" => Ok(Backend::Native),
            other => Err(format!("expected docker or native, got {}", other)),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub port: u16,
    pub backend: Backend,
    pub docker_bin: PathBuf,
    pub image: String,
    pub scratch_dir: PathBuf,
    pub execution_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; unset or blank keys take defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let backend = parse(&get, "RUNNER_BACKEND")?.unwrap_or(Backend::Docker);
        let scratch_dir = get("SCRATCH_DIR").map(PathBuf::from).unwrap_or_else(|| match backend {
            Backend::Docker => PathBuf::from(DEFAULT_CONTAINER_SCRATCH_DIR),
            Backend::Native => std::env::temp_dir().join("coderunner"),
        });
        let execution_timeout = parse::<u64, _>(&get, "EXECUTION_TIMEOUT_MS")?
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_EXECUTION_TIMEOUT);
        if execution_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "EXECUTION_TIMEOUT_MS",
                value: "0".to_string(),
                reason: "timeout must be positive".to_string(),
            });
        }

        Ok(Self {
            port: parse(&get, "PORT")?.unwrap_or(DEFAULT_PORT),
            backend,
            docker_bin: get("DOCKER_BIN")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DOCKER_BIN)),
            image: get("DOCKER_IMAGE").unwrap_or_else(|| DEFAULT_CONTAINER_IMAGE.to_string()),
            scratch_dir,
            execution_timeout,
        })
    }
}

fn parse<T, F>(get: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    get(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|e: T::Err| ConfigError::InvalidValue {
                    key,
                    value: value.clone(),
                    reason: e.to_string(),
                })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.backend, Backend::Docker);
        assert_eq!(config.image, "coderunner/repl");
        assert_eq!(config.docker_bin, PathBuf::from("docker"));
        assert_eq!(config.scratch_dir, PathBuf::from("/sandbox/tmp"));
        assert_eq!(config.execution_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("PORT", "9000"),
            ("RUNNER_BACKEND", "Native"),
            ("DOCKER_IMAGE", "tayebe/repl"),
            ("EXECUTION_TIMEOUT_MS", "2000"),
            ("SCRATCH_DIR", "/var/tmp/runs"),
        ]))
        .unwrap();

        assert_eq!(config.port, 9000);
        assert_eq!(config.backend, Backend::Native);
        assert_eq!(config.image, "tayebe/repl");
        assert_eq!(config.execution_timeout, Duration::from_secs(2));
        assert_eq!(config.scratch_dir, PathBuf::from("/var/tmp/runs"));
    }

    #[test]
    fn test_blank_values_fall_back_to_defaults() {
        let config = Config::from_lookup(lookup(&[("DOCKER_IMAGE", "  ")])).unwrap();

        assert_eq!(config.image, "coderunner/repl");
    }

    #[test]
    fn test_native_backend_scratches_in_temp_dir() {
        let config = Config::from_lookup(lookup(&[("RUNNER_BACKEND", "native")])).unwrap();

        assert_eq!(config.scratch_dir, std::env::temp_dir().join("coderunner"));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(matches!(
            Config::from_lookup(lookup(&[("EXECUTION_TIMEOUT_MS", "soon")])),
            Err(ConfigError::InvalidValue {
                key: "EXECUTION_TIMEOUT_MS",
                ..
            })
        ));
        assert!(matches!(
            Config::from_lookup(lookup(&[("EXECUTION_TIMEOUT_MS", "0")])),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            Config::from_lookup(lookup(&[("RUNNER_BACKEND", "podman")])),
            Err(ConfigError::InvalidValue {
                key: "RUNNER_BACKEND",
                ..
            })
        ));
        assert!(matches!(
            Config::from_lookup(lookup(&[("PORT", "99999")])),
            Err(ConfigError::InvalidValue { key: "PORT", .. })
        ));
    }
}
