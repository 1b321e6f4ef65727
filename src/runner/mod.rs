//! Runner module - Process execution layer
//!
//! This module launches one child process and reports what it did:
//! - `ProcessRunner`: spawns the launcher, bounds its lifetime, drains its pipes
//!
//! The runner module does NOT:
//! - Know about capabilities or permission flags
//! - Decode the runtime's structured output
//! - Turn failures into `ExecutionResult`s

pub mod process;

use async_trait::async_trait;
use std::time::Duration;

use crate::error::SandboxError;

/// Command specification for execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Program path or name
    pub program: String,
    /// Arguments to the program
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Convert to a vector of strings (program + args)
    pub fn to_vec(&self) -> Vec<String> {
        let mut v = vec![self.program.clone()];
        v.extend(self.args.iter().cloned());
        v
    }
}

/// How the child process ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    /// Program exited normally with given exit code
    Exited(i32),
    /// Killed by signal before the deadline
    Signaled(i32),
    /// Deadline passed; the process group was killed
    TimedOut,
}

impl RunStatus {
    /// Check if execution was successful (exited with code 0)
    pub fn is_success(&self) -> bool {
        matches!(self, RunStatus::Exited(0))
    }
}

/// Outcome of running a program
#[derive(Debug)]
pub struct RunOutcome {
    pub status: RunStatus,
    /// Stdout content (empty when timed out)
    pub stdout: String,
    /// Stderr content (empty when timed out)
    pub stderr: String,
}

impl RunOutcome {
    pub fn timed_out() -> Self {
        Self {
            status: RunStatus::TimedOut,
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    /// Check if execution was successful
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// Runner trait for executing programs
#[async_trait]
pub trait Runner: Send + Sync {
    /// Run a command, killing it once `timeout` has elapsed since spawn
    async fn run(&self, cmd: &CommandSpec, timeout: Duration) -> Result<RunOutcome, SandboxError>;
}

// Re-exports
pub use process::ProcessRunner;
