//! Error types
//!
//! These never cross the `Sandbox::run` boundary: the supervisor folds every
//! `SandboxError` into a failed `ExecutionResult`. `ConfigError` is only
//! returned while building a sandbox.

use std::path::PathBuf;

use thiserror::Error;

/// Failure while launching or supervising the runtime process
#[derive(Debug, Error)]
pub enum SandboxError {
    /// The child process could not be started at all
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    /// Waiting on the child or draining its pipes failed
    #[error("failed to collect output of `{program}`: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },
    /// The async runtime driving a blocking `run` could not be created
    #[error("failed to start execution runtime: {0}")]
    Runtime(#[source] std::io::Error),
}

/// Invalid sandbox configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("entry script not found: {}", .0.display())]
    EntryScriptMissing(PathBuf),
    #[error("launcher must not be empty")]
    EmptyLauncher,
    #[error("timeout must be greater than zero")]
    ZeroTimeout,
    #[error("invalid value for {name}: {value:?}")]
    InvalidEnv { name: &'static str, value: String },
    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}
