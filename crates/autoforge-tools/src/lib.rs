//! Sandboxed tools available to the pipeline's agents.
//!
//! A [`ToolRegistry`] holds [`ToolDefinition`]s; [`execute_tool`] looks a
//! tool up, validates its arguments, and enforces the timeout/retry
//! contract, returning a structured [`ToolExecutionResult`] either way.

pub mod error;
pub mod executor;
pub mod fs;
pub mod lint;
pub mod models;
pub mod registry;

pub use error::ToolError;
pub use executor::execute_tool;
pub use fs::{read_file_tool, safe_join, ReadFileArgs};
pub use lint::{parse_ruff_output, python_lint_tool, LintArgs, LintIssue};
pub use models::{ToolDefinition, ToolExecutionResult, ToolFn};
pub use registry::ToolRegistry;
