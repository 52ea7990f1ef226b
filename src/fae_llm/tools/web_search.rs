//! Web search tool — searches the web using multiple engines concurrently.
//!
//! Wraps the [`fae_search`] crate's async search API behind the synchronous
//! [`Tool`] trait interface using `tokio::runtime::Handle::current().block_on()`.

use crate::fae_llm::config::types::ToolMode;
use crate::fae_llm::error::FaeLlmError;

use super::types::{DEFAULT_MAX_BYTES, Tool, ToolResult, truncate_output};

/// Tool that searches the web using multiple search engines concurrently.
///
/// Queries DuckDuckGo, Brave, Google, and Bing in parallel, deduplicates
/// and ranks results, then formats them for LLM consumption.
///
/// This is a **read-only** tool — allowed in all tool modes.
///
/// # Arguments (JSON)
///
/// - `query` (string, required) — the search query
/// - `max_results` (integer, optional) — maximum results to return (default 5)
pub struct WebSearchTool {
    max_bytes: usize,
}

impl WebSearchTool {
    /// Create a new `WebSearchTool` with the default max output size.
    pub fn new() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_BYTES,
        }
    }
}

impl Default for WebSearchTool {
    fn default() -> Self {
        Self::new()
    }
}

impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web using multiple search engines. Returns titles, URLs, and snippets."
    }

    fn schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query"
                },
                "max_results": {
                    "type": "integer",
                    "description": "Maximum number of results to return (default 5)"
                }
            },
            "required": ["query"]
        })
    }

    fn execute(&self, args: serde_json::Value) -> Result<ToolResult, FaeLlmError> {
        let query = args.get("query").and_then(|v| v.as_str()).ok_or_else(|| {
            FaeLlmError::ToolValidationError("missing required argument: query".into())
        })?;

        if query.trim().is_empty() {
            return Err(FaeLlmError::ToolValidationError(
                "query must not be empty".into(),
            ));
        }

        let max_results = args
            .get("max_results")
            .and_then(|v| v.as_u64())
            .map(|v| v as usize)
            .unwrap_or(5);

        let config = fae_search::SearchConfig {
            max_results,
            ..Default::default()
        };

        // Bridge sync Tool::execute to async fae_search::search.
        let handle = tokio::runtime::Handle::current();
        let results = handle
            .block_on(fae_search::search(query, &config))
            .map_err(|e| FaeLlmError::ToolExecutionError(format!("web search failed: {e}")))?;

        if results.is_empty() {
            return Ok(ToolResult::success(format!(
                "No results found for \"{query}\"."
            )));
        }

        // Format results for LLM consumption.
        let mut output = format!("## Search Results for \"{query}\"\n\n");
        for (i, result) in results.iter().enumerate() {
            output.push_str(&format!(
                "{}. **{}**\n   URL: {}\n   {}\n\n",
                i + 1,
                result.title,
                result.url,
                result.snippet,
            ));
        }

        let (truncated_output, was_truncated) = truncate_output(&output, self.max_bytes);
        if was_truncated {
            Ok(ToolResult::success_truncated(truncated_output))
        } else {
            Ok(ToolResult::success(truncated_output))
        }
    }

    fn allowed_in_mode(&self, _mode: ToolMode) -> bool {
        true // web search is read-only, allowed in all modes
    }
}
