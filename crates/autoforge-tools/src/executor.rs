//! Tool execution with timeouts and retries.

use std::time::{Duration, Instant};

use serde_json::Value;

use crate::models::ToolExecutionResult;
use crate::registry::ToolRegistry;

/// Pause between retry attempts for transient failures.
const TOOL_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Executes a tool by name with raw JSON arguments.
///
/// - Unknown tools fail immediately without retries.
/// - Each attempt is bounded by the tool's timeout.
/// - Failed attempts retry up to the tool's `max_retries` with a fixed
///   pause between attempts.
pub async fn execute_tool(
    registry: &ToolRegistry,
    name: &str,
    args: Value,
) -> ToolExecutionResult {
    let Some(tool) = registry.get(name) else {
        return ToolExecutionResult::failure(format!("unknown tool: {name}"));
    };

    let start = Instant::now();
    let mut retries = 0u32;
    let mut last_error;

    loop {
        let attempt = (tool.func)(args.clone());
        let outcome = tokio::time::timeout(tool.timeout, attempt).await;

        match outcome {
            Ok(Ok(output)) => {
                return ToolExecutionResult {
                    success: true,
                    output: Some(output),
                    error: None,
                    retries,
                    duration: start.elapsed(),
                };
            }
            Ok(Err(err)) => last_error = err.to_string(),
            Err(_elapsed) => {
                last_error = format!("timed out after {:?}", tool.timeout);
            }
        }

        if retries >= tool.max_retries {
            return ToolExecutionResult {
                success: false,
                output: None,
                error: Some(format!(
                    "tool {name} failed after {} attempt(s): {last_error}",
                    retries + 1
                )),
                retries,
                duration: start.elapsed(),
            };
        }
        retries += 1;
        tracing::debug!(tool = name, retries, "retrying tool after failure");
        tokio::time::sleep(TOOL_RETRY_DELAY).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ToolDefinition;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn unknown_tool_fails_without_retries() {
        let registry = ToolRegistry::new();
        let result = execute_tool(&registry, "nope", serde_json::json!({})).await;
        assert!(!result.success);
        assert_eq!(result.retries, 0);
        assert!(result.error.unwrap().contains("unknown tool"));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failure_retries_then_succeeds() {
        let registry = ToolRegistry::new();
        let attempts = Arc::new(AtomicU32::new(0));
        let tool_attempts = Arc::clone(&attempts);
        registry.register(
            ToolDefinition::new(
                "flaky",
                "fails twice",
                Arc::new(move |_args| {
                    let attempts = Arc::clone(&tool_attempts);
                    Box::pin(async move {
                        let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                        if n < 3 {
                            Err(crate::ToolError::Other(format!("transient #{n}")))
                        } else {
                            Ok(serde_json::json!({"attempt": n}))
                        }
                    })
                }),
            )
            .with_max_retries(3),
        );

        let result = execute_tool(&registry, "flaky", serde_json::json!({})).await;
        assert!(result.success);
        assert_eq!(result.retries, 2);
        assert_eq!(result.output.unwrap()["attempt"], serde_json::json!(3));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_report_failure() {
        let registry = ToolRegistry::new();
        registry.register(
            ToolDefinition::new(
                "doomed",
                "always fails",
                Arc::new(|_args| {
                    Box::pin(async { Err(crate::ToolError::Other("permanent".to_string())) })
                }),
            )
            .with_max_retries(1),
        );

        let result = execute_tool(&registry, "doomed", serde_json::json!({})).await;
        assert!(!result.success);
        assert_eq!(result.retries, 1);
        assert!(result.error.unwrap().contains("after 2 attempt(s)"));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_tool_times_out() {
        let registry = ToolRegistry::new();
        registry.register(
            ToolDefinition::new(
                "slow",
                "sleeps forever",
                Arc::new(|_args| {
                    Box::pin(async {
                        tokio::time::sleep(Duration::from_secs(3600)).await;
                        Ok(serde_json::json!({}))
                    })
                }),
            )
            .with_timeout(Duration::from_secs(1)),
        );

        let result = execute_tool(&registry, "slow", serde_json::json!({})).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("timed out"));
    }
}
