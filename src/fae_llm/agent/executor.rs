//! Tool executor with timeout and cancellation support.
//!
//! The [`ToolExecutor`] wraps a [`ToolRegistry`] and executes tool calls
//! with per-tool timeouts and cancellation token propagation.

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use super::accumulator::AccumulatedToolCall;
use super::types::ExecutedToolCall;
use super::validation::validate_tool_args;
use crate::fae_llm::config::types::ToolMode;
use crate::fae_llm::error::FaeLlmError;
use crate::fae_llm::observability::spans::*;
use crate::fae_llm::tools::registry::ToolRegistry;

/// Executes tool calls with timeout and cancellation support.
///
/// Wraps a [`ToolRegistry`] and adds:
/// - Per-tool execution timeout
/// - Cancellation token checking between tool calls
/// - Argument validation against tool schemas
/// - Execution timing
pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    tool_timeout_secs: u64,
}

impl ToolExecutor {
    /// Create a new tool executor.
    ///
    /// # Arguments
    ///
    /// * `registry` — The tool registry to look up and execute tools
    /// * `tool_timeout_secs` — Maximum time for each tool execution in seconds
    pub fn new(registry: Arc<ToolRegistry>, tool_timeout_secs: u64) -> Self {
        Self {
            registry,
            tool_timeout_secs,
        }
    }

    /// Execute a single tool call.
    ///
    /// Validates arguments against the tool's schema, executes with timeout,
    /// and returns the result with timing information.
    ///
    /// # Errors
    ///
    /// Returns:
    /// - [`FaeLlmError::ToolValidationError`] when arguments fail schema validation.
    /// - [`FaeLlmError::ToolExecutionError`] when execution fails, is cancelled, or the tool is unavailable.
    /// - [`FaeLlmError::TimeoutError`] when execution exceeds the configured timeout.
    /// - The tool is not found in the registry
    /// - Execution times out
    /// - The operation is cancelled
    pub async fn execute_tool(
        &self,
        call: &AccumulatedToolCall,
        cancel: &CancellationToken,
    ) -> Result<ExecutedToolCall, FaeLlmError> {
        let mode = match self.registry.mode() {
            ToolMode::ReadOnly => "read_only",
            ToolMode::Full => "full",
        };

        let tool_span = tracing::info_span!(
            SPAN_TOOL_EXECUTE,
            { FIELD_TOOL_NAME } = %call.function_name,
            { FIELD_TOOL_MODE } = mode,
        );
        let _tool_enter = tool_span.enter();

        tracing::debug!(tool_name = %call.function_name, mode = mode, "Executing tool");

        // Check cancellation before starting
        if cancel.is_cancelled() {
            tracing::warn!(tool_name = %call.function_name, "Tool execution cancelled before start");
            return Err(FaeLlmError::ToolExecutionError(format!(
                "tool '{}': cancelled before execution",
                call.function_name
            )));
        }

        // Look up tool
        let tool = self.registry.get(&call.function_name).ok_or_else(|| {
            if self.registry.is_blocked_by_mode(&call.function_name) {
                tracing::error!(tool_name = %call.function_name, "Tool blocked by mode");
                FaeLlmError::ToolExecutionError(format!(
                    "tool '{}': blocked by current mode (read-only mode does not allow mutation tools)",
                    call.function_name
                ))
            } else {
                tracing::error!(tool_name = %call.function_name, "Tool not found in registry");
                FaeLlmError::ToolExecutionError(format!(
                    "tool '{}': not found in registry",
                    call.function_name
                ))
            }
        })?;

        // Validate arguments against schema
        tracing::debug!(tool_name = %call.function_name, "Validating tool arguments");
        let args = validate_tool_args(&call.function_name, &call.arguments_json, &tool.schema())?;
        tracing::debug!(tool_name = %call.function_name, "Arguments validated successfully");

        // Execute with timeout
        let start = Instant::now();
        let timeout = tokio::time::Duration::from_secs(self.tool_timeout_secs);

        let tool_clone = Arc::clone(&tool);
        let args_clone = args.clone();

        let result = tokio::select! {
            _ = cancel.cancelled() => {
                tracing::warn!(tool_name = %call.function_name, "Tool execution cancelled during execution");
                return Err(FaeLlmError::ToolExecutionError(format!(
                    "tool '{}': cancelled during execution",
                    call.function_name
                )));
            }
            result = tokio::time::timeout(timeout, tokio::task::spawn_blocking(move || {
                tool_clone.execute(args_clone)
            })) => {
                match result {
                    Ok(Ok(Ok(tool_result))) => tool_result,
                    Ok(Ok(Err(e))) => {
                        tracing::error!(tool_name = %call.function_name, error = %e, "Tool execution failed");
                        return Err(e);
                    }
                    Ok(Err(join_err)) => {
                        tracing::error!(tool_name = %call.function_name, error = %join_err, "Tool execution panicked");
                        return Err(FaeLlmError::ToolExecutionError(format!(
                            "tool '{}': execution panicked: {join_err}",
                            call.function_name
                        )));
                    }
                    Err(_elapsed) => {
                        tracing::error!(tool_name = %call.function_name, timeout_secs = self.tool_timeout_secs, "Tool execution timed out");
                        return Err(FaeLlmError::TimeoutError(format!(
                            "tool '{}': execution timed out after {}s",
                            call.function_name,
                            self.tool_timeout_secs
                        )));
                    }
                }
            }
        };

        let duration_ms = start.elapsed().as_millis() as u64;

        tracing::info!(tool_name = %call.function_name, duration_ms = duration_ms, "Tool execution completed successfully");

        Ok(ExecutedToolCall {
            call_id: call.call_id.clone(),
            function_name: call.function_name.clone(),
            arguments: args,
            result,
            duration_ms,
        })
    }

    /// Execute multiple tool calls sequentially.
    ///
    /// Stops on cancellation. Each call is executed one at a time
    /// (no parallel execution in v1 for safety).
    ///
    /// Returns results in the same order as the input calls.
    /// Individual failures are captured as `Err` entries.
    pub async fn execute_tools(
        &self,
        calls: &[AccumulatedToolCall],
        cancel: &CancellationToken,
    ) -> Vec<Result<ExecutedToolCall, FaeLlmError>> {
        let mut results = Vec::with_capacity(calls.len());

        for call in calls {
            if cancel.is_cancelled() {
                results.push(Err(FaeLlmError::ToolExecutionError(format!(
                    "tool '{}': cancelled before execution",
                    call.function_name
                ))));
                break;
            }

            results.push(self.execute_tool(call, cancel).await);
        }

        results
    }
}
