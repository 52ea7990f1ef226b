//! Write tool — creates or overwrites files with path validation.

use crate::fae_llm::config::types::ToolMode;
use crate::fae_llm::error::FaeLlmError;

use super::path_validation::validate_write_path;
use super::types::{DEFAULT_MAX_BYTES, Tool, ToolResult};

/// Tool that creates or overwrites files.
///
/// Arguments (JSON):
/// - `path` (string, required) — file path to write
/// - `content` (string, required) — content to write
///
/// Only available in `ToolMode::Full`.
pub struct WriteTool {
    max_bytes: usize,
}

impl WriteTool {
    /// Create a new WriteTool with the default max content size.
    pub fn new() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_BYTES,
        }
    }

    /// Create a new WriteTool with a custom max content size.
    pub fn with_max_bytes(max_bytes: usize) -> Self {
        Self { max_bytes }
    }
}

impl Default for WriteTool {
    fn default() -> Self {
        Self::new()
    }
}

impl Tool for WriteTool {
    fn name(&self) -> &str {
        "write"
    }

    fn description(&self) -> &str {
        "Create or overwrite a file with the given content"
    }

    fn schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "File path to write"
                },
                "content": {
                    "type": "string",
                    "description": "Content to write to the file"
                }
            },
            "required": ["path", "content"]
        })
    }

    fn execute(&self, args: serde_json::Value) -> Result<ToolResult, FaeLlmError> {
        let path_str = args
            .get("path")
            .and_then(|v| v.as_str())
            .ok_or_else(|| FaeLlmError::ToolError("missing required argument: path".into()))?;

        let content = args
            .get("content")
            .and_then(|v| v.as_str())
            .ok_or_else(|| FaeLlmError::ToolError("missing required argument: content".into()))?;

        let path = validate_write_path(path_str)?;

        // Check content size
        if content.len() > self.max_bytes {
            return Ok(ToolResult::failure(format!(
                "content exceeds max size ({} bytes > {} bytes)",
                content.len(),
                self.max_bytes
            )));
        }

        // Verify parent directory exists
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            return Ok(ToolResult::failure(format!(
                "parent directory does not exist: {}",
                parent.display()
            )));
        }

        // Write file
        if let Err(e) = std::fs::write(&path, content) {
            return Ok(ToolResult::failure(format!(
                "failed to write {}: {e}",
                path.display()
            )));
        }

        Ok(ToolResult::success(format!(
            "wrote {} bytes to {}",
            content.len(),
            path.display()
        )))
    }

    fn allowed_in_mode(&self, mode: ToolMode) -> bool {
        mode == ToolMode::Full
    }
}
