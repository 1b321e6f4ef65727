//! Run untrusted code in an isolated runtime with per-call network, file-read
//! and environment permissions.
//!
//! ```no_run
//! use sandbox_exec::{CapabilityConfig, ExecutionRequest, Sandbox, SandboxConfig};
//!
//! let sandbox = Sandbox::new(SandboxConfig::new("deno", "core.ts"))?;
//! let request = ExecutionRequest::new("print('Hello, World!')")
//!     .with_capabilities(CapabilityConfig::default().allow_hosts(["api.github.com"]));
//! let result = sandbox.run(&request);
//! if result.success {
//!     println!("{}", result.output);
//! } else {
//!     eprintln!("{}", result.error);
//! }
//! # Ok::<(), sandbox_exec::error::ConfigError>(())
//! ```

pub mod core;
pub mod error;
pub mod runner;
pub mod sandbox;

#[cfg(all(test, unix))]
mod test_support;

pub use crate::core::{ExecutionRequest, ExecutionResult};
pub use crate::sandbox::{CapabilityConfig, NetworkPolicy, Sandbox, SandboxConfig};
