//! Runtime tool descriptions and execution results.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::error::ToolError;

/// Boxed async tool implementation: raw JSON arguments in, JSON out.
pub type ToolFn = Arc<
    dyn Fn(Value) -> Pin<Box<dyn Future<Output = Result<Value, ToolError>> + Send>> + Send + Sync,
>;

/// Runtime description of a tool available to agents.
#[derive(Clone)]
pub struct ToolDefinition {
    /// Unique identifier, referenced in prompts and tool calls.
    pub name: String,
    /// Short natural-language description shown to agents.
    pub description: String,
    /// The implementation.
    pub func: ToolFn,
    /// Max wall-clock time for a single execution attempt.
    pub timeout: Duration,
    /// How many times to retry on failure.
    pub max_retries: u32,
    /// Whether this tool is expected to be side-effect-safe.
    pub sandboxed: bool,
    /// Free-form labels (e.g. ["filesystem", "lint"]).
    pub tags: Vec<String>,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>, func: ToolFn) -> Self {
        ToolDefinition {
            name: name.into(),
            description: description.into(),
            func,
            timeout: Duration::from_secs(30),
            max_retries: 0,
            sandboxed: true,
            tags: Vec::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }
}

/// Normalised result of executing a tool.
#[derive(Debug, Clone)]
pub struct ToolExecutionResult {
    /// Whether the tool completed without failing.
    pub success: bool,
    /// Raw value returned by the tool, if any.
    pub output: Option<Value>,
    /// Error message when `success` is false.
    pub error: Option<String>,
    /// How many retry attempts were used.
    pub retries: u32,
    /// Approximate wall-clock time.
    pub duration: Duration,
}

impl ToolExecutionResult {
    pub fn failure(error: impl Into<String>) -> Self {
        ToolExecutionResult {
            success: false,
            output: None,
            error: Some(error.into()),
            retries: 0,
            duration: Duration::ZERO,
        }
    }
}
