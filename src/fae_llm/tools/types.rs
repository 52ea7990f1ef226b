//! Core tool types for the fae_llm tool system.
//!
//! Defines the [`Tool`] trait that all tools implement and [`ToolResult`]
//! for capturing bounded execution output.

use crate::fae_llm::config::types::ToolMode;
use crate::fae_llm::error::FaeLlmError;

/// Default maximum output size (100 KB).
pub const DEFAULT_MAX_BYTES: usize = 100 * 1024;

/// Result of a tool execution.
///
/// Contains the output content (bounded to `max_bytes`), success/error status,
/// and a flag indicating whether output was truncated.
#[derive(Debug, Clone)]
pub struct ToolResult {
    /// Whether the tool execution succeeded.
    pub success: bool,
    /// Output content (bounded).
    pub content: String,
    /// Error message if the tool execution failed.
    pub error: Option<String>,
    /// Whether the output was truncated to fit within max_bytes.
    pub truncated: bool,
}

impl ToolResult {
    /// Create a successful tool result.
    pub fn success(content: String) -> Self {
        Self {
            success: true,
            content,
            error: None,
            truncated: false,
        }
    }

    /// Create a failed tool result with an error message.
    pub fn failure(error: String) -> Self {
        Self {
            success: false,
            content: String::new(),
            error: Some(error),
            truncated: false,
        }
    }

    /// Create a successful tool result with truncation applied.
    pub fn success_truncated(content: String) -> Self {
        Self {
            success: true,
            content,
            error: None,
            truncated: true,
        }
    }
}

/// Truncate a string to at most `max_bytes`, respecting UTF-8 boundaries.
///
/// Returns `(truncated_string, was_truncated)`.
pub fn truncate_output(s: &str, max_bytes: usize) -> (String, bool) {
    if s.len() <= max_bytes {
        return (s.to_string(), false);
    }

    // Find the last valid UTF-8 char boundary at or before max_bytes
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }

    let truncated = &s[..end];
    (
        format!("{truncated}\n\n[output truncated at {max_bytes} bytes]"),
        true,
    )
}

/// Core trait for LLM tools.
///
/// All tools must be `Send + Sync` for use in async contexts.
/// The trait provides metadata (name, description, schema) and
/// an execution method that accepts JSON arguments.
pub trait Tool: Send + Sync {
    /// Returns the tool name (e.g. "read", "bash", "edit", "write").
    fn name(&self) -> &str;

    /// Returns a human-readable description of what the tool does.
    fn description(&self) -> &str;

    /// Returns the JSON Schema for the tool's arguments.
    fn schema(&self) -> serde_json::Value;

    /// Execute the tool with the given JSON arguments.
    ///
    /// # Errors
    ///
    /// Returns `FaeLlmError` for validation/execution failures.
    fn execute(&self, args: serde_json::Value) -> Result<ToolResult, FaeLlmError>;

    /// Whether this tool is allowed in the given mode.
    ///
    /// Read-only tools (like `read`) return true for both modes.
    /// Mutation tools (like `bash`, `edit`, `write`) only allow `ToolMode::Full`.
    fn allowed_in_mode(&self, mode: ToolMode) -> bool;
}
