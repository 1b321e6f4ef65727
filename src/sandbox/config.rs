//! Sandbox configuration
//!
//! Where the runtime launcher and its entry script live, and how long one
//! execution may run. Loaded from defaults, a TOML file, or the environment.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::error::ConfigError;

pub const DEFAULT_LAUNCHER: &str = "deno";
pub const DEFAULT_ENTRY_SCRIPT: &str = "core.ts";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

const LAUNCHER_ENV: &str = "SANDBOX_LAUNCHER";
const ENTRY_SCRIPT_ENV: &str = "SANDBOX_ENTRY_SCRIPT";
const TIMEOUT_ENV: &str = "SANDBOX_TIMEOUT_SECS";

/// Sandbox configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxConfig {
    /// Launcher executable (default: `deno`)
    pub launcher: String,
    /// Runtime entry script handed to the launcher (default: `core.ts`)
    pub entry_script: PathBuf,
    /// Wall-clock limit per execution, measured from spawn (default: 30s)
    pub timeout: Duration,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            launcher: DEFAULT_LAUNCHER.to_string(),
            entry_script: PathBuf::from(DEFAULT_ENTRY_SCRIPT),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

/// Raw TOML configuration; every key is optional
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSandboxConfig {
    launcher: Option<String>,
    entry_script: Option<PathBuf>,
    timeout_secs: Option<u64>,
}

impl SandboxConfig {
    pub fn new(launcher: impl Into<String>, entry_script: impl Into<PathBuf>) -> Self {
        Self {
            launcher: launcher.into(),
            entry_script: entry_script.into(),
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Load configuration from environment variables, keeping defaults for unset ones
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().apply_env(|name| std::env::var(name).ok())
    }

    /// Load configuration from a TOML file, then apply environment overrides
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("Loaded sandbox config from {}", path.display());
        config.apply_env(|name| std::env::var(name).ok())
    }

    fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        let raw: RawSandboxConfig = toml::from_str(content)?;
        let mut config = Self::default();
        if let Some(launcher) = raw.launcher {
            config.launcher = launcher;
        }
        if let Some(entry_script) = raw.entry_script {
            config.entry_script = entry_script;
        }
        if let Some(secs) = raw.timeout_secs {
            config.timeout = Duration::from_secs(secs);
        }
        Ok(config)
    }

    fn apply_env(mut self, var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        if let Some(launcher) = var(LAUNCHER_ENV) {
            self.launcher = launcher;
        }
        if let Some(entry_script) = var(ENTRY_SCRIPT_ENV) {
            self.entry_script = PathBuf::from(entry_script);
        }
        if let Some(value) = var(TIMEOUT_ENV) {
            let secs = value
                .trim()
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidEnv {
                    name: TIMEOUT_ENV,
                    value,
                })?;
            self.timeout = Duration::from_secs(secs);
        }
        Ok(self)
    }

    /// Check the configuration can be used to launch executions
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.launcher.trim().is_empty() {
            return Err(ConfigError::EmptyLauncher);
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        if !self.entry_script.is_file() {
            return Err(ConfigError::EntryScriptMissing(self.entry_script.clone()));
        }
        Ok(())
    }
}
