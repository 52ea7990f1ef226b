//! Edit tool — deterministic text edits via find/replace.

use crate::fae_llm::config::types::ToolMode;
use crate::fae_llm::error::FaeLlmError;

use super::path_validation::validate_write_path;
use super::types::{DEFAULT_MAX_BYTES, Tool, ToolResult};

/// Tool that performs deterministic text edits by replacing `old_string`
/// with `new_string` in a file.
///
/// Arguments (JSON):
/// - `path` (string, required) — file path to edit
/// - `old_string` (string, required) — exact text to find (must be unique in file)
/// - `new_string` (string, required) — replacement text
///
/// Only available in `ToolMode::Full`.
pub struct EditTool {
    max_bytes: usize,
}

impl EditTool {
    /// Create a new EditTool with the default max file size.
    pub fn new() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_BYTES,
        }
    }

    /// Create a new EditTool with a custom max file size.
    pub fn with_max_bytes(max_bytes: usize) -> Self {
        Self { max_bytes }
    }
}

impl Default for EditTool {
    fn default() -> Self {
        Self::new()
    }
}

impl Tool for EditTool {
    fn name(&self) -> &str {
        "edit"
    }

    fn description(&self) -> &str {
        "Edit a file by replacing an exact string match"
    }

    fn schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "File path to edit"
                },
                "old_string": {
                    "type": "string",
                    "description": "Exact text to find (must be unique in the file)"
                },
                "new_string": {
                    "type": "string",
                    "description": "Replacement text"
                }
            },
            "required": ["path", "old_string", "new_string"]
        })
    }

    fn execute(&self, args: serde_json::Value) -> Result<ToolResult, FaeLlmError> {
        let path_str = args
            .get("path")
            .and_then(|v| v.as_str())
            .ok_or_else(|| FaeLlmError::ToolError("missing required argument: path".into()))?;

        let old_string = args
            .get("old_string")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                FaeLlmError::ToolError("missing required argument: old_string".into())
            })?;

        let new_string = args
            .get("new_string")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                FaeLlmError::ToolError("missing required argument: new_string".into())
            })?;

        let path = validate_write_path(path_str)?;

        // Read existing file
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) => {
                return Ok(ToolResult::failure(format!(
                    "failed to read {}: {e}",
                    path.display()
                )));
            }
        };

        // Check file size
        if content.len() > self.max_bytes {
            return Ok(ToolResult::failure(format!(
                "file exceeds max size ({} bytes > {} bytes)",
                content.len(),
                self.max_bytes
            )));
        }

        // Check that old_string exists and is unique
        let match_count = content.matches(old_string).count();
        if match_count == 0 {
            return Ok(ToolResult::failure(format!(
                "old_string not found in {}",
                path.display()
            )));
        }
        if match_count > 1 {
            return Ok(ToolResult::failure(format!(
                "old_string has {match_count} matches in {} (must be unique)",
                path.display()
            )));
        }

        // Perform replacement
        let new_content = content.replacen(old_string, new_string, 1);

        // Write back
        if let Err(e) = std::fs::write(&path, &new_content) {
            return Ok(ToolResult::failure(format!(
                "failed to write {}: {e}",
                path.display()
            )));
        }

        Ok(ToolResult::success(format!(
            "edited {}: replaced {} bytes with {} bytes",
            path.display(),
            old_string.len(),
            new_string.len()
        )))
    }

    fn allowed_in_mode(&self, mode: ToolMode) -> bool {
        mode == ToolMode::Full
    }
}
