//! Tool execution errors.

use thiserror::Error;

/// Errors raised inside tool implementations.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Arguments did not validate against the tool's input shape.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// The requested path escapes the sandbox root.
    #[error("path escapes sandbox root: {0}")]
    PathEscape(String),

    /// Filesystem failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Subprocess failure.
    #[error("subprocess failed: {0}")]
    Subprocess(String),

    /// Anything else a tool wants to report.
    #[error("{0}")]
    Other(String),
}
