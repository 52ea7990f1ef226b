//! Tool system for the fae_llm module.
//!
//! Provides a registry-based tool architecture with mode gating,
//! JSON Schema validation, and bounded output.
//!
//! # Tools
//!
//! - **read** — Read file contents with pagination
//! - **bash** — Execute shell commands with timeout
//! - **edit** — Deterministic text edits (find/replace)
//! - **write** — Create or overwrite files
//! - **web_search** — Search the web via embedded multi-engine scraper
//! - **fetch_url** — Fetch and extract web page content
//! - **desktop** — Desktop automation (screenshots, clicks, typing, windows)
//! - **apple** — Apple ecosystem tools (Contacts, Calendar) — macOS only
//!
//! # Mode Gating
//!
//! Tools respect [`ToolMode`](crate::fae_llm::config::types::ToolMode):
//! - `ReadOnly` — Only read-only tools are available (read, web_search, fetch_url)
//! - `Full` — All tools are available

pub mod apple;
pub mod bash;
pub mod desktop;
pub mod edit;
pub mod fetch_url;
pub mod input_sanitize;
pub mod path_validation;
pub mod python_skill;
pub mod read;
pub mod registry;
pub mod sanitize;
pub mod scheduler_create;
pub mod scheduler_delete;
pub mod scheduler_list;
pub mod scheduler_trigger;
pub mod scheduler_update;
pub mod types;
pub mod web_search;
pub mod write;

pub use bash::BashTool;
pub use desktop::DesktopTool;
pub use edit::EditTool;
pub use fetch_url::FetchUrlTool;
pub use input_sanitize::{SanitizedInput, sanitize_command_input, sanitize_content_input};
pub use path_validation::{validate_read_path, validate_write_path};
pub use python_skill::PythonSkillTool;
pub use read::ReadTool;
pub use registry::ToolRegistry;
pub use sanitize::{SanitizedOutput, sanitize_tool_output};
pub use scheduler_create::SchedulerCreateTool;
pub use scheduler_delete::SchedulerDeleteTool;
pub use scheduler_list::SchedulerListTool;
pub use scheduler_trigger::SchedulerTriggerTool;
pub use scheduler_update::SchedulerUpdateTool;
pub use types::{Tool, ToolResult, truncate_output};
pub use web_search::WebSearchTool;
pub use write::WriteTool;


#[cfg(test)]
mod scheduler_integration_tests;
