//! Pipeline-to-canvas bridge.
//!
//! Subscribes to [`RuntimeEvent`]s and converts them into
//! [`CanvasMessage`]s pushed to a [`CanvasBackend`].

use std::collections::HashMap;

use tracing::info;

use crate::pipeline::messages::ControlEvent;
use crate::runtime::RuntimeEvent;

use super::backend::CanvasBackend;
use super::session::CanvasSession;
use super::types::{CanvasMessage, MessageRole};

/// Bridges fae's pipeline events to the canvas scene graph.
pub struct CanvasBridge {
    session: Box<dyn CanvasBackend>,
    /// Accumulates assistant sentence chunks into a single message.
    pending_assistant_text: String,
    /// Whether the assistant is currently generating a response.
    generating: bool,
    /// Last message role pushed (for grouping tracking).
    last_role: Option<MessageRole>,
    /// Consecutive same-role message count.
    group_count: usize,
    /// Monotonic timestamp counter (ms) for message ordering.
    next_ts: u64,
    /// Pending tool inputs keyed by tool call ID (captured on ToolCall,
    /// consumed on ToolResult).
    pending_tool_inputs: HashMap<String, String>,
}

impl CanvasBridge {
    /// Create a new bridge with a local canvas session.
    pub fn new(session_id: impl Into<String>, width: f32, height: f32) -> Self {
        Self::with_backend(Box::new(CanvasSession::new(session_id, width, height)))
    }

    /// Create a new bridge with an arbitrary backend.
    pub fn with_backend(backend: Box<dyn CanvasBackend>) -> Self {
        Self {
            session: backend,
            pending_assistant_text: String::new(),
            generating: false,
            last_role: None,
            group_count: 0,
            next_ts: 0,
            pending_tool_inputs: HashMap::new(),
        }
    }

    /// Reference to the underlying canvas backend.
    pub fn backend(&self) -> &dyn CanvasBackend {
        &*self.session
    }

    /// Mutable reference to the underlying canvas backend.
    pub fn backend_mut(&mut self) -> &mut dyn CanvasBackend {
        &mut *self.session
    }

    /// Reference to the underlying canvas session (backward compatibility).
    pub fn session(&self) -> &dyn CanvasBackend {
        &*self.session
    }

    /// Mutable reference to the underlying canvas session (backward compatibility).
    pub fn session_mut(&mut self) -> &mut dyn CanvasBackend {
        &mut *self.session
    }

    /// Number of consecutive messages with the same role.
    pub fn group_count(&self) -> usize {
        self.group_count
    }

    /// Process a pipeline runtime event, updating the canvas session.
    pub fn on_event(&mut self, event: &RuntimeEvent) {
        match event {
            RuntimeEvent::Transcription(t) if t.is_final => {
                self.push(MessageRole::User, &t.text);
            }

            RuntimeEvent::AssistantSentence(chunk) => {
                if !self.pending_assistant_text.is_empty() {
                    self.pending_assistant_text.push(' ');
                }
                self.pending_assistant_text.push_str(&chunk.text);

                if chunk.is_final {
                    self.flush_assistant();
                }
            }

            RuntimeEvent::AssistantGenerating { active } => {
                self.generating = *active;
                if !active && !self.pending_assistant_text.is_empty() {
                    // Generation ended — flush any remaining text.
                    self.flush_assistant();
                }
            }

            RuntimeEvent::ToolCall {
                id,
                name,
                input_json,
            } => {
                // If this is a canvas_render call, parse the input and render
                // the element directly into the bridge's session so it appears
                // in the canvas window.
                if name == "canvas_render" {
                    self.try_render_tool_element(input_json);
                }

                // Store the input for attachment to the ToolResult message.
                self.pending_tool_inputs
                    .insert(id.clone(), input_json.clone());
                let text = format!("{name} called");
                self.push_tool(name, &text);
            }

            RuntimeEvent::ToolResult {
                id,
                name,
                success,
                output_text,
            } => {
                let status = if *success { "success" } else { "failed" };
                let text = format!("{name} \u{2192} {status}");
                let tool_input = self.pending_tool_inputs.remove(id);
                let details = output_text.clone().or_else(|| Some(status.to_owned()));
                self.push_tool_with_details(name, &text, tool_input, details);
            }

            RuntimeEvent::Control(ControlEvent::UserSpeechStart { .. }) => {
                if self.generating {
                    // Barge-in: flush pending with interrupted suffix.
                    if !self.pending_assistant_text.is_empty() {
                        self.pending_assistant_text.push_str(" [interrupted]");
                        self.flush_assistant();
                    }
                    self.push(MessageRole::System, "interrupted");
                    self.generating = false;
                }
            }

            // Control events, audio levels, and model selection events don't
            // produce canvas messages (model selection is handled elsewhere).
            RuntimeEvent::Control(_)
            | RuntimeEvent::AssistantAudioLevel { .. }
            | RuntimeEvent::Transcription(_)
            | RuntimeEvent::ModelSelectionPrompt { .. }
            | RuntimeEvent::ModelSelected { .. } => {}
        }
    }

    /// Try to parse a `canvas_render` tool input and add the element to the
    /// bridge's session so it appears in the canvas window.
    fn try_render_tool_element(&mut self, input_json: &str) {
        use canvas_mcp::tools::RenderParams;

        // Try full RenderParams first (has session_id + content + position).
        let params: Option<RenderParams> = serde_json::from_str(input_json).ok();
        if let Some(params) = params {
            let element = crate::canvas::tools::render::render_content_to_element(&params);
            self.session.add_element(element);
            info!("bridge: rendered canvas_render element from ToolCall");
            return;
        }

        // Fallback: try parsing just as RenderContent (the content field only).
        use canvas_mcp::tools::{Position, RenderContent};
        let content: Option<RenderContent> = serde_json::from_str(input_json).ok();
        if let Some(content) = content {
            let params = RenderParams {
                session_id: "gui".to_owned(),
                content,
                position: Some(Position {
                    x: 0.0,
                    y: 0.0,
                    width: Some(600.0),
                    height: Some(400.0),
                }),
            };
            let element = crate::canvas::tools::render::render_content_to_element(&params);
            self.session.add_element(element);
            info!("bridge: rendered canvas_render element from RenderContent fallback");
        }
    }

    /// Flush accumulated assistant text as a single message.
    fn flush_assistant(&mut self) {
        if self.pending_assistant_text.is_empty() {
            return;
        }
        let text = std::mem::take(&mut self.pending_assistant_text);
        self.push(MessageRole::Assistant, &text);
    }

    /// Push a message and update grouping state.
    fn push(&mut self, role: MessageRole, text: &str) {
        let ts = self.next_ts;
        self.next_ts += 1;

        if self.last_role == Some(role) {
            self.group_count += 1;
        } else {
            self.last_role = Some(role);
            self.group_count = 1;
        }

        let msg = CanvasMessage::new(role, text, ts);
        self.session.push_message(&msg);
    }

    /// Push a tool message.
    fn push_tool(&mut self, name: &str, text: &str) {
        let ts = self.next_ts;
        self.next_ts += 1;

        let role = MessageRole::Tool;
        if self.last_role == Some(role) {
            self.group_count += 1;
        } else {
            self.last_role = Some(role);
            self.group_count = 1;
        }

        let msg = CanvasMessage::tool(name, text, ts);
        self.session.push_message(&msg);
    }

    /// Push a tool message with input/result details.
    fn push_tool_with_details(
        &mut self,
        name: &str,
        text: &str,
        tool_input: Option<String>,
        tool_result_text: Option<String>,
    ) {
        let ts = self.next_ts;
        self.next_ts += 1;

        let role = MessageRole::Tool;
        if self.last_role == Some(role) {
            self.group_count += 1;
        } else {
            self.last_role = Some(role);
            self.group_count = 1;
        }

        let msg = CanvasMessage::tool_with_details(name, text, ts, tool_input, tool_result_text);
        self.session.push_message(&msg);
    }
}
