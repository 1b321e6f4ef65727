pub mod result;

pub use result::{ExecutionRequest, ExecutionResult, TIMEOUT_MESSAGE};
