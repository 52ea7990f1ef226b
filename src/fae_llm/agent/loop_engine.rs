//! Core agent loop engine.
//!
//! Implements the agentic loop: prompt -> stream -> tool calls -> execute
//! -> continue. The [`AgentLoop`] struct ties together a provider adapter,
//! tool registry, and configuration to drive multi-turn LLM interactions.

use std::sync::Arc;

use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;

use super::accumulator::StreamAccumulator;
use super::executor::ToolExecutor;
use super::types::{AgentConfig, AgentLoopResult, ExecutedToolCall, StopReason, TurnResult};
use crate::fae_llm::error::FaeLlmError;
use crate::fae_llm::events::FinishReason;
use crate::fae_llm::observability::metrics::{MetricsCollector, NoopMetrics};
use crate::fae_llm::observability::spans::*;
use crate::fae_llm::provider::{ProviderAdapter, ToolDefinition};
use crate::fae_llm::providers::message::{AssistantToolCall, Message};
use crate::fae_llm::tools::registry::ToolRegistry;
use crate::fae_llm::tools::sanitize::sanitize_tool_output;
use crate::fae_llm::tools::types::DEFAULT_MAX_BYTES;
use crate::fae_llm::types::RequestOptions;
use crate::fae_llm::usage::TokenUsage;

/// Lower temperature improves tool-calling judgment on smaller local models.
const TOOL_JUDGMENT_TEMPERATURE: f64 = 0.2;

/// The core agent loop engine.
///
/// Drives multi-turn LLM interactions with tool calling. Each iteration
/// sends the conversation to the provider, streams the response, and
/// if the model requests tool calls, executes them and continues.
///
/// # Safety Guards
///
/// - **Max turns**: Stops after [`AgentConfig::max_turns`] provider round-trips
/// - **Max tool calls per turn**: Stops if a single response has too many tool calls
/// - **Request timeout**: Each provider request has a deadline
/// - **Tool timeout**: Each tool execution has a deadline
/// - **Cancellation**: Can be aborted via [`cancel()`](Self::cancel)
pub struct AgentLoop {
    config: AgentConfig,
    provider: Arc<dyn ProviderAdapter>,
    tool_executor: ToolExecutor,
    tool_definitions: Vec<ToolDefinition>,
    cancel: CancellationToken,
    metrics: Arc<dyn MetricsCollector>,
}

impl AgentLoop {
    /// Create a new agent loop.
    ///
    /// # Arguments
    ///
    /// * `config` — Loop configuration (limits, timeouts, system prompt)
    /// * `provider` — The LLM provider adapter
    /// * `registry` — The tool registry (tools available to the model)
    pub fn new(
        config: AgentConfig,
        provider: Arc<dyn ProviderAdapter>,
        registry: Arc<ToolRegistry>,
    ) -> Self {
        Self::with_metrics(config, provider, registry, Arc::new(NoopMetrics))
    }

    /// Create a new agent loop with a custom metrics collector.
    ///
    /// # Arguments
    ///
    /// * `config` — Loop configuration (limits, timeouts, system prompt)
    /// * `provider` — The LLM provider adapter
    /// * `registry` — The tool registry (tools available to the model)
    /// * `metrics` — Metrics collector for observability
    pub fn with_metrics(
        config: AgentConfig,
        provider: Arc<dyn ProviderAdapter>,
        registry: Arc<ToolRegistry>,
        metrics: Arc<dyn MetricsCollector>,
    ) -> Self {
        // Build tool definitions from registry for the provider
        let tool_definitions: Vec<ToolDefinition> = registry
            .schemas_for_api()
            .into_iter()
            .filter_map(|schema| {
                let name = schema.get("name")?.as_str()?.to_string();
                let description = schema.get("description")?.as_str()?.to_string();
                let parameters = schema.get("parameters")?.clone();
                Some(ToolDefinition::new(name, description, parameters))
            })
            .collect();

        let tool_executor = ToolExecutor::with_parallelism(
            registry,
            config.tool_timeout_secs,
            config.parallel_tool_calls,
            config.max_parallel_tool_calls,
        );

        Self {
            config,
            provider,
            tool_executor,
            tool_definitions,
            cancel: CancellationToken::new(),
            metrics,
        }
    }

    /// Cancel the agent loop.
    ///
    /// This signals cancellation to the current and all future operations.
    /// The loop will stop at the next cancellation check point.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Returns the cancellation token for external cancellation control.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the agent loop with a user message.
    ///
    /// Builds the initial conversation (system prompt + user message)
    /// and runs the loop until completion or a stop condition.
    ///
    /// # Errors
    ///
    /// Returns [`FaeLlmError`] if the initial provider request fails.
    /// Tool and stream errors are captured in the result rather than
    /// propagated as top-level errors.
    pub async fn run(&self, user_message: &str) -> Result<AgentLoopResult, FaeLlmError> {
        let mut messages = Vec::new();

        // Add system prompt if configured
        if let Some(ref system_prompt) = self.config.system_prompt {
            messages.push(Message::system(system_prompt.as_str()));
        }

        messages.push(Message::user(user_message));

        self.run_loop(messages).await
    }

    /// Run the agent loop with pre-existing messages.
    ///
    /// Use this for continuing a conversation or providing
    /// custom message history.
    ///
    /// # Errors
    ///
    /// Returns [`FaeLlmError`] if the initial provider request fails.
    pub async fn run_with_messages(
        &self,
        messages: Vec<Message>,
    ) -> Result<AgentLoopResult, FaeLlmError> {
        self.run_loop(messages).await
    }

    /// Continue a conversation from a previous agent loop result.
    ///
    /// Reconstructs the message history from the previous result,
    /// appends the new user message, and runs the loop.
    ///
    /// # Arguments
    ///
    /// * `previous` — The result of a previous agent loop run
    /// * `user_message` — The new user message to continue with
    ///
    /// # Errors
    ///
    /// Returns [`FaeLlmError`] if the provider request fails.
    pub async fn run_continuation(
        &self,
        previous: &AgentLoopResult,
        user_message: &str,
    ) -> Result<AgentLoopResult, FaeLlmError> {
        let mut messages =
            build_messages_from_result(previous, self.config.system_prompt.as_deref());
        messages.push(Message::user(user_message));
        self.run_loop(messages).await
    }

    /// The main agent loop implementation.
    async fn run_loop(&self, mut messages: Vec<Message>) -> Result<AgentLoopResult, FaeLlmError> {
        let mut turns = Vec::new();
        let total_usage = TokenUsage::default();
        let request_timeout = tokio::time::Duration::from_secs(self.config.request_timeout_secs);
        let mut options = RequestOptions::new().with_stream(true);
        if !self.tool_definitions.is_empty() {
            options = options.with_temperature(TOOL_JUDGMENT_TEMPERATURE);
        }
        let loop_start = std::time::Instant::now();
        let mut circuit_breaker = self.config.circuit_breaker.clone();

        for _turn_idx in 0..self.config.max_turns {
            let turn_number = _turn_idx + 1;
            let turn_start = std::time::Instant::now();

            let turn_span = tracing::info_span!(
                SPAN_AGENT_TURN,
                { FIELD_TURN_NUMBER } = turn_number,
                { FIELD_MAX_TURNS } = self.config.max_turns,
            );
            let _turn_enter = turn_span.enter();

            tracing::debug!(
                turn_number = turn_number,
                max_turns = self.config.max_turns,
                "Starting agent turn"
            );

            // Check cancellation
            if self.cancel.is_cancelled() {
                tracing::info!("Agent loop cancelled");
                return Ok(AgentLoopResult {
                    final_text: last_text(&turns),
                    turns,
                    total_usage,
                    stop_reason: StopReason::Cancelled,
                });
            }

            // Send to provider with retry/circuit-breaker protection.
            if self.cancel.is_cancelled() {
                return Ok(AgentLoopResult {
                    final_text: last_text(&turns),
                    turns,
                    total_usage,
                    stop_reason: StopReason::Cancelled,
                });
            }

            let stream = match self
                .send_with_retry(&messages, &options, request_timeout, &mut circuit_breaker)
                .await
            {
                Ok(stream) => stream,
                Err(e) => {
                    return Ok(AgentLoopResult {
                        final_text: last_text(&turns),
                        turns,
                        total_usage,
                        stop_reason: StopReason::Error(format!("{e}")),
                    });
                }
            };

            // Consume stream and accumulate events
            let mut acc = StreamAccumulator::new();
            let mut stream = stream;

            loop {
                if self.cancel.is_cancelled() {
                    let turn = acc.finish();
                    turns.push(TurnResult {
                        text: turn.text,
                        thinking: turn.thinking,
                        tool_calls: Vec::new(),
                        finish_reason: FinishReason::Cancelled,
                        usage: None,
                    });
                    return Ok(AgentLoopResult {
                        final_text: last_text(&turns),
                        turns,
                        total_usage,
                        stop_reason: StopReason::Cancelled,
                    });
                }

                match tokio::time::timeout(tokio::time::Duration::from_millis(25), stream.next())
                    .await
                {
                    Ok(Some(event)) => acc.push(event),
                    Ok(None) => break,
                    Err(_) => continue,
                }
            }

            let accumulated = acc.finish();

            // Check for stream error
            if let Some(ref error) = accumulated.error {
                turns.push(TurnResult {
                    text: accumulated.text,
                    thinking: accumulated.thinking,
                    tool_calls: Vec::new(),
                    finish_reason: accumulated.finish_reason,
                    usage: None,
                });
                return Ok(AgentLoopResult {
                    final_text: last_text(&turns),
                    turns,
                    total_usage,
                    stop_reason: StopReason::Error(error.clone()),
                });
            }

            // If the model wants to call tools
            if accumulated.finish_reason == FinishReason::ToolCalls
                && !accumulated.tool_calls.is_empty()
            {
                tracing::info!(
                    "model requested {} tool calls: {:?}",
                    accumulated.tool_calls.len(),
                    accumulated
                        .tool_calls
                        .iter()
                        .map(|t| &t.function_name)
                        .collect::<Vec<_>>()
                );

                // Check max tool calls per turn
                if accumulated.tool_calls.len() as u32 > self.config.max_tool_calls_per_turn {
                    turns.push(TurnResult {
                        text: accumulated.text,
                        thinking: accumulated.thinking,
                        tool_calls: Vec::new(),
                        finish_reason: accumulated.finish_reason,
                        usage: None,
                    });
                    return Ok(AgentLoopResult {
                        final_text: last_text(&turns),
                        turns,
                        total_usage,
                        stop_reason: StopReason::MaxToolCalls,
                    });
                }

                // Execute tools
                let tool_results = self
                    .tool_executor
                    .execute_tools(&accumulated.tool_calls, &self.cancel)
                    .await;

                // Build executed tool calls and messages
                let mut executed_calls = Vec::new();
                let mut assistant_tool_calls = Vec::new();

                for (i, result) in tool_results.into_iter().enumerate() {
                    let acc_call = &accumulated.tool_calls[i];
                    match result {
                        Ok(exec) => {
                            // Record metrics for tool execution
                            self.metrics
                                .record_tool_latency_ms(&exec.function_name, exec.duration_ms);
                            self.metrics
                                .count_tool_result(&exec.function_name, exec.result.success);

                            assistant_tool_calls.push(AssistantToolCall {
                                call_id: exec.call_id.clone(),
                                function_name: exec.function_name.clone(),
                                arguments: exec.arguments.to_string(),
                            });

                            // Add tool result message
                            let content = if exec.result.success {
                                exec.result.content.clone()
                            } else {
                                exec.result
                                    .error
                                    .clone()
                                    .unwrap_or_else(|| "tool execution failed".to_string())
                            };
                            let sanitized = sanitize_tool_output(&content, DEFAULT_MAX_BYTES);
                            messages.push(Message::tool_result(&exec.call_id, sanitized.content));

                            executed_calls.push(exec);
                        }
                        Err(e) => {
                            // Tool failed — include error as tool result
                            let call_id = acc_call.call_id.clone();
                            let error_msg = format!("Error: {e}");
                            self.metrics
                                .count_tool_result(&acc_call.function_name, false);

                            assistant_tool_calls.push(AssistantToolCall {
                                call_id: call_id.clone(),
                                function_name: acc_call.function_name.clone(),
                                arguments: acc_call.arguments_json.clone(),
                            });
                            let sanitized = sanitize_tool_output(&error_msg, DEFAULT_MAX_BYTES);
                            messages.push(Message::tool_result(&call_id, sanitized.content));

                            executed_calls.push(ExecutedToolCall {
                                call_id,
                                function_name: acc_call.function_name.clone(),
                                arguments: serde_json::Value::Null,
                                result: crate::fae_llm::tools::types::ToolResult::failure(
                                    error_msg,
                                ),
                                duration_ms: 0,
                            });
                        }
                    }
                }

                // Add the assistant message with tool calls to conversation
                // Insert BEFORE the tool result messages
                let insert_pos = messages.len() - executed_calls.len();
                messages.insert(
                    insert_pos,
                    Message::assistant_with_tool_calls(
                        if accumulated.text.is_empty() {
                            None
                        } else {
                            Some(accumulated.text.clone())
                        },
                        assistant_tool_calls,
                    ),
                );

                let turn_duration_ms = turn_start.elapsed().as_millis() as u64;
                self.metrics
                    .record_turn_latency_ms(turn_number, turn_duration_ms);

                turns.push(TurnResult {
                    text: accumulated.text,
                    thinking: accumulated.thinking,
                    tool_calls: executed_calls,
                    finish_reason: accumulated.finish_reason,
                    usage: None,
                });

                // Continue the loop for the next turn
                continue;
            }

            // No tool calls — the model is done
            let turn_duration_ms = turn_start.elapsed().as_millis() as u64;
            self.metrics
                .record_turn_latency_ms(turn_number, turn_duration_ms);

            turns.push(TurnResult {
                text: accumulated.text,
                thinking: accumulated.thinking,
                tool_calls: Vec::new(),
                finish_reason: accumulated.finish_reason,
                usage: None,
            });

            let total_latency_ms = loop_start.elapsed().as_millis() as u64;
            let provider_name = self.provider.name();
            // Model name not directly accessible from provider trait - use "unknown" for now
            self.metrics
                .record_request_latency_ms(provider_name, "unknown", total_latency_ms);

            return Ok(AgentLoopResult {
                final_text: last_text(&turns),
                turns,
                total_usage,
                stop_reason: StopReason::Complete,
            });
        }

        // Max turns reached
        let total_latency_ms = loop_start.elapsed().as_millis() as u64;
        let provider_name = self.provider.name();
        // Model name not directly accessible from provider trait - use "unknown" for now
        self.metrics
            .record_request_latency_ms(provider_name, "unknown", total_latency_ms);

        Ok(AgentLoopResult {
            final_text: last_text(&turns),
            turns,
            total_usage,
            stop_reason: StopReason::MaxTurns,
        })
    }

    async fn send_with_retry(
        &self,
        messages: &[Message],
        options: &RequestOptions,
        request_timeout: tokio::time::Duration,
        circuit_breaker: &mut crate::fae_llm::agent::types::CircuitBreaker,
    ) -> Result<crate::fae_llm::provider::LlmEventStream, FaeLlmError> {
        let mut retry_attempt = 0u32;

        loop {
            if self.cancel.is_cancelled() {
                return Err(FaeLlmError::RequestError(
                    "request cancelled before provider send".to_string(),
                ));
            }

            if !circuit_breaker.is_request_allowed() {
                return Err(FaeLlmError::ProviderError(format!(
                    "circuit breaker open: {}",
                    circuit_breaker.state
                )));
            }

            let provider_result = tokio::time::timeout(
                request_timeout,
                self.provider
                    .send(messages, options, &self.tool_definitions),
            )
            .await;

            match provider_result {
                Ok(Ok(stream)) => {
                    circuit_breaker.record_success();
                    return Ok(stream);
                }
                Ok(Err(error)) => {
                    circuit_breaker.record_failure();
                    let retryable = error.is_retryable();

                    if !retryable
                        || retry_attempt >= self.config.retry_policy.max_attempts
                        || !circuit_breaker.is_request_allowed()
                    {
                        return Err(error);
                    }
                }
                Err(_) => {
                    let error = FaeLlmError::TimeoutError(format!(
                        "request timed out after {}s",
                        self.config.request_timeout_secs
                    ));
                    circuit_breaker.record_failure();

                    if retry_attempt >= self.config.retry_policy.max_attempts
                        || !circuit_breaker.is_request_allowed()
                    {
                        return Err(error);
                    }
                }
            }

            retry_attempt = retry_attempt.saturating_add(1);
            let delay = self.config.retry_policy.delay_for_attempt(retry_attempt);
            tokio::time::sleep(delay).await;
            if self.cancel.is_cancelled() {
                return Err(FaeLlmError::RequestError(
                    "request cancelled during retry backoff".to_string(),
                ));
            }
        }
    }
}

/// Extract the text from the last turn, or empty if no turns.
fn last_text(turns: &[TurnResult]) -> String {
    turns.last().map_or_else(String::new, |t| t.text.clone())
}

/// Build a conversation message list from an [`AgentLoopResult`].
///
/// Reconstructs the message history from the turns, including
/// tool calls and tool results, suitable for continuing the conversation.
pub fn build_messages_from_result(
    result: &AgentLoopResult,
    system_prompt: Option<&str>,
) -> Vec<Message> {
    let mut messages = Vec::new();

    if let Some(prompt) = system_prompt {
        messages.push(Message::system(prompt));
    }

    for turn in &result.turns {
        if !turn.tool_calls.is_empty() {
            // Assistant message with tool calls
            let tool_calls: Vec<AssistantToolCall> = turn
                .tool_calls
                .iter()
                .map(|tc| AssistantToolCall {
                    call_id: tc.call_id.clone(),
                    function_name: tc.function_name.clone(),
                    arguments: tc.arguments.to_string(),
                })
                .collect();

            messages.push(Message::assistant_with_tool_calls(
                if turn.text.is_empty() {
                    None
                } else {
                    Some(turn.text.clone())
                },
                tool_calls,
            ));

            // Tool results
            for tc in &turn.tool_calls {
                let content = if tc.result.success {
                    tc.result.content.clone()
                } else {
                    tc.result
                        .error
                        .clone()
                        .unwrap_or_else(|| "tool execution failed".to_string())
                };
                let sanitized = sanitize_tool_output(&content, DEFAULT_MAX_BYTES);
                messages.push(Message::tool_result(&tc.call_id, sanitized.content));
            }
        } else if !turn.text.is_empty() {
            // Text-only assistant message
            messages.push(Message::assistant(&turn.text));
        }
    }

    messages
}
