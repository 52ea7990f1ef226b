//! List scheduled tasks tool.
//!
//! Read-only tool that lists all scheduled tasks with their status, schedule,
//! and run history. Supports filtering by kind and enabled state.

use crate::fae_llm::config::types::ToolMode;
use crate::fae_llm::error::FaeLlmError;
use crate::scheduler;
use crate::scheduler::tasks::{Schedule, ScheduledTask, TaskKind};

use super::types::{Tool, ToolResult};

/// Tool that lists scheduled tasks.
///
/// Returns a formatted text listing of all tasks matching the optional filter.
/// This is a **read-only** tool — allowed in all tool modes.
///
/// # Arguments (JSON)
///
/// - `filter` (string, optional) — one of `"all"`, `"enabled"`, `"disabled"`,
///   `"user"`, `"builtin"` (default `"all"`)
pub struct SchedulerListTool;

impl SchedulerListTool {
    /// Create a new `SchedulerListTool`.
    pub fn new() -> Self {
        Self
    }
}

impl Default for SchedulerListTool {
    fn default() -> Self {
        Self::new()
    }
}

impl Tool for SchedulerListTool {
    fn name(&self) -> &str {
        "list_scheduled_tasks"
    }

    fn description(&self) -> &str {
        "List all scheduled tasks with their status, schedule, and last run time. \
         Supports filtering by kind (user/builtin) or enabled state."
    }

    fn schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "filter": {
                    "type": "string",
                    "description": "Filter tasks: 'all', 'enabled', 'disabled', 'user', or 'builtin' (default: 'all')",
                    "enum": ["all", "enabled", "disabled", "user", "builtin"]
                }
            }
        })
    }

    fn execute(&self, args: serde_json::Value) -> Result<ToolResult, FaeLlmError> {
        let filter = args.get("filter").and_then(|v| v.as_str()).unwrap_or("all");

        let snapshot = scheduler::load_persisted_snapshot().map_err(|e| {
            FaeLlmError::ToolExecutionError(format!("failed to load scheduler state: {e}"))
        })?;

        let filtered: Vec<&ScheduledTask> = snapshot
            .tasks
            .iter()
            .filter(|t| match filter {
                "enabled" => t.enabled,
                "disabled" => !t.enabled,
                "user" => t.kind == TaskKind::User,
                "builtin" => t.kind == TaskKind::Builtin,
                _ => true, // "all" or unrecognised
            })
            .collect();

        if filtered.is_empty() {
            return Ok(ToolResult::success(format!(
                "No scheduled tasks found (filter: {filter})."
            )));
        }

        let mut lines = Vec::with_capacity(filtered.len() + 2);
        lines.push(format!("Scheduled tasks ({} total):\n", filtered.len()));

        for task in &filtered {
            let status = if task.enabled { "enabled" } else { "disabled" };
            let kind = match task.kind {
                TaskKind::Builtin => "builtin",
                TaskKind::User => "user",
            };
            let schedule_desc = task.schedule.to_string();
            let last_run = task
                .last_run
                .map_or_else(|| "never".to_owned(), format_time_ago);
            let failure_info = if task.failure_streak > 0 {
                format!(" | failures: {}", task.failure_streak)
            } else {
                String::new()
            };

            lines.push(format!(
                "- [{id}] {name} ({kind})\n  Schedule: {schedule_desc}\n  Status: {status} | Last run: {last_run}{failure_info}",
                id = task.id,
                name = task.name,
            ));
        }

        Ok(ToolResult::success(lines.join("\n")))
    }

    fn allowed_in_mode(&self, _mode: ToolMode) -> bool {
        true // read-only
    }
}

/// Format an epoch timestamp as a human-readable relative time string.
fn format_time_ago(epoch_secs: u64) -> String {
    let now = crate::scheduler::tasks::now_epoch_secs();
    if epoch_secs > now {
        return "in the future".to_owned();
    }
    let diff = now - epoch_secs;

    if diff < 60 {
        "just now".to_owned()
    } else if diff < 3600 {
        format!("{} minutes ago", diff / 60)
    } else if diff < 86400 {
        format!("{} hours ago", diff / 3600)
    } else {
        format!("{} days ago", diff / 86400)
    }
}

/// Format a schedule as a human-readable description.
///
/// Delegates to the `Display` impl on `Schedule`, but exposed as a free
/// function for tests that need to verify formatting without a full task.
pub fn format_schedule(schedule: &Schedule) -> String {
    schedule.to_string()
}
