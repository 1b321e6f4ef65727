//! Execution request and result types, and decoding of the runtime's output

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SandboxError;
use crate::sandbox::CapabilityConfig;

/// Error text reported when the runtime exceeds its deadline
pub const TIMEOUT_MESSAGE: &str = "execution timed out";

/// One piece of code plus the permissions it runs with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    #[serde(flatten)]
    pub capabilities: CapabilityConfig,
    pub code: String,
}

impl ExecutionRequest {
    /// Request with the default (permissive) capabilities
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            capabilities: CapabilityConfig::default(),
            code: code.into(),
        }
    }

    pub fn with_capabilities(mut self, capabilities: CapabilityConfig) -> Self {
        self.capabilities = capabilities;
        self
    }
}

/// Result of one execution. Always well formed: `output` is safe to display
/// and is empty on failure, `error` is empty on success.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub output: String,
    pub error: String,
    pub success: bool,
}

impl ExecutionResult {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            error: String::new(),
            success: true,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            output: String::new(),
            error: error.into(),
            success: false,
        }
    }

    pub fn timed_out() -> Self {
        Self::failure(TIMEOUT_MESSAGE)
    }

    /// Decode what the runtime printed on a clean exit.
    ///
    /// The runtime is expected to print one JSON object with `output`, `error`
    /// and `success`. A missing or mistyped field takes its zero value. Anything
    /// that is not a JSON object is passed through as successful raw output;
    /// the entry script's contract is not enforced here.
    pub fn decode(stdout: &str) -> Self {
        match serde_json::from_str::<Value>(stdout.trim()) {
            Ok(Value::Object(fields)) => Self {
                output: string_field(&fields, "output"),
                error: string_field(&fields, "error"),
                success: fields
                    .get("success")
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
            },
            _ => Self::ok(stdout),
        }
    }
}

fn string_field(fields: &serde_json::Map<String, Value>, key: &str) -> String {
    fields
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

impl From<SandboxError> for ExecutionResult {
    fn from(err: SandboxError) -> Self {
        Self::failure(err.to_string())
    }
}
