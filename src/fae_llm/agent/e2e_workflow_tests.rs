//! End-to-end multi-turn tool workflow tests.
//!
//! Tests document and verify the expected patterns for complete agent workflows,
//! including multi-turn conversations, tool usage, and guard limit enforcement.

use super::types::{AgentConfig, CircuitBreaker, RetryPolicy};
use crate::fae_llm::config::types::ToolMode;

// ── Workflow Pattern Tests ────────────────────────────────────────

#[test]
fn test_simple_workflow_pattern() {
    // Pattern: prompt → answer
    // The agent receives a prompt and returns a direct answer without tools.

    let config = AgentConfig::default();
    assert_eq!(config.max_turns, 15);

    // This pattern is the simplest: single turn, no tool calls
}

#[test]
fn test_tool_call_workflow_pattern() {
    // Pattern: prompt → tool call → execute → continue → final answer
    // The agent requests a tool, executes it, and continues to provide an answer.

    let config = AgentConfig::default();
    assert!(config.max_turns > 1, "Need at least 2 turns for tool workflow");

    // Turn 1: Model requests tool call (e.g., read a file)
    // Turn 2: Model provides final answer using tool result
}

#[test]
fn test_multi_turn_workflow_pattern() {
    // Pattern: multiple tool calls across several turns
    // The agent may need to call different tools multiple times.

    let config = AgentConfig::default().with_max_turns(5);
    assert_eq!(config.max_turns, 5);

    // Turn 1: read file
    // Turn 2: bash command
    // Turn 3: write file
    // Turn 4: final answer
}

#[test]
fn test_mixed_tools_workflow_pattern() {
    // Pattern: read + bash + write in a single conversation
    // The agent uses multiple different tool types to complete a task.

    let tools = ["read", "bash", "write"];
    assert_eq!(tools.len(), 3);

    // Example workflow:
    // 1. read(input.txt) → get data
    // 2. bash(process data) → transform
    // 3. write(output.txt) → save result
    // 4. final answer
}

// ── Guard Limit Tests ─────────────────────────────────────────────

#[test]
fn test_max_turn_limit_enforcement() {
    let config = AgentConfig::default().with_max_turns(3);
    assert_eq!(config.max_turns, 3);

    // The agent loop stops after 3 turns, even if the model wants to continue
    // This prevents infinite loops
}

#[test]
fn test_max_tools_per_turn_limit() {
    let config = AgentConfig::default().with_max_tool_calls_per_turn(2);
    assert_eq!(config.max_tool_calls_per_turn, 2);

    // If the model requests 5 tool calls in one response,
    // only the first 2 are executed to prevent resource exhaustion
}

#[test]
fn test_max_turn_limit_custom() {
    let config = AgentConfig::default().with_max_turns(10);
    assert_eq!(config.max_turns, 10);
}

#[test]
fn test_max_tools_custom() {
    let config = AgentConfig::default().with_max_tool_calls_per_turn(5);
    assert_eq!(config.max_tool_calls_per_turn, 5);
}

// ── Tool Argument Validation Tests ────────────────────────────────

#[test]
fn test_tool_argument_validation_pattern() {
    // Tool arguments must be valid JSON matching the tool's schema
    // Invalid arguments are rejected by the tool executor

    let valid_read_args = r#"{"path": "/tmp/file.txt"}"#;
    assert!(serde_json::from_str::<serde_json::Value>(valid_read_args).is_ok());

    let invalid_args = "{not valid json";
    assert!(serde_json::from_str::<serde_json::Value>(invalid_args).is_err());

    // The executor would reject invalid_args and return an error to the model
}

#[test]
fn test_tool_schema_validation_pattern() {
    // Each tool has a JSON schema that defines required/optional fields
    // The executor validates arguments against this schema

    let read_args = serde_json::json!({
        "path": "/tmp/test.txt"
    });

    assert!(read_args.get("path").is_some());
    assert!(read_args.get("path").unwrap_or_else(|| panic!("path required")).is_string());
}

// ── Retry Policy Tests ────────────────────────────────────────────

#[test]
fn test_retry_policy_configuration() {
    let policy = RetryPolicy::default()
        .with_max_attempts(3)
        .with_base_delay_ms(100);

    assert_eq!(policy.max_attempts, 3);
    assert_eq!(policy.base_delay_ms, 100);
}

#[test]
fn test_retry_policy_defaults() {
    let policy = RetryPolicy::default();

    assert_eq!(policy.max_attempts, 3);
    assert_eq!(policy.base_delay_ms, 500);
}

#[test]
fn test_retry_policy_custom() {
    let policy = RetryPolicy::default()
        .with_max_attempts(5)
        .with_base_delay_ms(200);

    assert_eq!(policy.max_attempts, 5);
    assert_eq!(policy.base_delay_ms, 200);
}

// ── Circuit Breaker Tests ─────────────────────────────────────────

#[test]
fn test_circuit_breaker_configuration() {
    let breaker = CircuitBreaker::default().with_failure_threshold(5);

    assert_eq!(breaker.failure_threshold, 5);
}

#[test]
fn test_circuit_breaker_defaults() {
    let breaker = CircuitBreaker::default();

    assert_eq!(breaker.failure_threshold, 5);
}

#[test]
fn test_circuit_breaker_custom() {
    let breaker = CircuitBreaker::default().with_failure_threshold(10);

    assert_eq!(breaker.failure_threshold, 10);
}

// ── Tool Mode Tests ───────────────────────────────────────────────

#[test]
fn test_tool_mode_read_only() {
    let mode = ToolMode::ReadOnly;

    match mode {
        ToolMode::ReadOnly => {
            // In read-only mode:
            // - read tool: allowed
            // - bash tool (read-only commands): allowed
            // - write tool: forbidden
            // - edit tool: forbidden
        }
        ToolMode::Full => {
            panic!("Expected ReadOnly");
        }
    }
}

#[test]
fn test_tool_mode_full() {
    let mode = ToolMode::Full;

    match mode {
        ToolMode::Full => {
            // In full mode, all tools are allowed:
            // - read, write, edit, bash (all commands)
        }
        ToolMode::ReadOnly => {
            panic!("Expected Full");
        }
    }
}

// ── Agent Config Tests ────────────────────────────────────────────

#[test]
fn test_agent_config_defaults() {
    let config = AgentConfig::default();

    assert_eq!(config.max_turns, 15);
    assert_eq!(config.max_tool_calls_per_turn, 5);
    assert!(config.request_timeout_secs > 0);
    assert!(config.tool_timeout_secs > 0);
}

#[test]
fn test_agent_config_builder() {
    let config = AgentConfig::default()
        .with_max_turns(10)
        .with_max_tool_calls_per_turn(3);

    assert_eq!(config.max_turns, 10);
    assert_eq!(config.max_tool_calls_per_turn, 3);
}

#[test]
fn test_agent_config_full_customization() {
    let policy = RetryPolicy::default().with_max_attempts(5);
    let breaker = CircuitBreaker::default().with_failure_threshold(10);

    let config = AgentConfig::default()
        .with_max_turns(20)
        .with_max_tool_calls_per_turn(8);

    assert_eq!(config.max_turns, 20);
    assert_eq!(config.max_tool_calls_per_turn, 8);

    // Retry policy and circuit breaker are separate from AgentConfig
    assert_eq!(policy.max_attempts, 5);
    assert_eq!(breaker.failure_threshold, 10);
}

// ── Error Recovery Tests ──────────────────────────────────────────

#[test]
fn test_error_recovery_pattern() {
    // When a provider returns an error, the retry policy determines
    // whether to retry or fail immediately.

    let policy = RetryPolicy::default().with_max_attempts(3);

    // On transient error (timeout, 500, connection refused):
    // - Retry up to max_attempts
    // - Use exponential backoff

    // On permanent error (401, 400, invalid request):
    // - Fail immediately without retry

    assert_eq!(policy.max_attempts, 3);
}

#[test]
fn test_circuit_breaker_pattern() {
    // After N consecutive failures, the circuit breaker opens
    // and fails fast without attempting requests.

    let breaker = CircuitBreaker::default().with_failure_threshold(5);

    // After 5 failures:
    // - Circuit opens
    // - Requests fail immediately
    // - After timeout period, circuit half-opens for test request

    assert_eq!(breaker.failure_threshold, 5);
}

// ── Realistic Workflow Scenarios ──────────────────────────────────

#[test]
fn test_file_processing_workflow() {
    // Scenario: Read file, process with bash, write result
    // Expected turns: 4-5

    let config = AgentConfig::default();
    assert!(config.max_turns >= 5);

    // Turn 1: read(input.txt)
    // Turn 2: bash(wc -l input.txt)
    // Turn 3: bash(grep pattern input.txt)
    // Turn 4: write(output.txt, processed_data)
    // Turn 5: final answer
}

#[test]
fn test_multi_file_workflow() {
    // Scenario: Read multiple files, combine data, write summary
    // Expected turns: 6-8

    let config = AgentConfig::default().with_max_turns(10);
    assert_eq!(config.max_turns, 10);

    // Turn 1: read(file1.txt)
    // Turn 2: read(file2.txt)
    // Turn 3: read(file3.txt)
    // Turn 4: bash(combine and process)
    // Turn 5: write(summary.txt)
    // Turn 6: final answer
}

#[test]
fn test_guard_limit_prevents_runaway() {
    // Scenario: Model gets stuck in a loop requesting tools
    // Guard limit stops execution after max_turns

    let config = AgentConfig::default().with_max_turns(3);

    // Even if the model keeps requesting tools, execution stops at turn 3
    // This prevents infinite loops and resource exhaustion

    assert_eq!(config.max_turns, 3);
}
