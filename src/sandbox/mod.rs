//! Sandbox module - Permission-scoped execution
//!
//! This module turns an `ExecutionRequest` into one supervised run of the
//! isolated runtime. It handles:
//! - Encoding capabilities into launcher permission flags
//! - Launcher / entry script / timeout configuration
//! - Classifying the child's exit and decoding its output
//!
//! The sandbox module does NOT:
//! - Implement the isolated runtime (it is an external executable)
//! - Inspect or validate the code it is asked to run

pub mod config;
pub mod policy;
pub mod supervisor;

// Re-exports for convenience
pub use config::SandboxConfig;
pub use policy::{encode_flags, CapabilityConfig, NetworkPolicy};
pub use supervisor::Sandbox;
