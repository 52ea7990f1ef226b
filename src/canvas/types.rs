//! Canvas message types bridging fae's pipeline to canvas-core elements.

use canvas_core::{Element, ElementKind, Transform};

/// Roles for message attribution and styling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRole {
    User,
    Assistant,
    System,
    Tool,
}

impl MessageRole {
    /// CSS class name for this role (used in HTML rendering).
    pub fn css_class(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
            Self::Tool => "tool",
        }
    }

    /// Default text color (hex) for this role.
    pub fn color(self) -> &'static str {
        match self {
            Self::User => "#3B82F6",
            Self::Assistant => "#10B981",
            Self::System => "#6B7280",
            Self::Tool => "#F59E0B",
        }
    }
}

/// A pipeline event translated into a canvas-renderable message.
#[derive(Debug, Clone)]
pub struct CanvasMessage {
    pub role: MessageRole,
    pub text: String,
    pub timestamp_ms: u64,
    /// For tool messages: the tool name.
    pub tool_name: Option<String>,
    /// For tool messages: the JSON input to the tool call.
    pub tool_input: Option<String>,
    /// For tool messages: the result text from the tool execution.
    pub tool_result_text: Option<String>,
}

impl CanvasMessage {
    /// Create a new message.
    pub fn new(role: MessageRole, text: impl Into<String>, timestamp_ms: u64) -> Self {
        Self {
            role,
            text: text.into(),
            timestamp_ms,
            tool_name: None,
            tool_input: None,
            tool_result_text: None,
        }
    }

    /// Create a tool message with the tool name.
    pub fn tool(name: impl Into<String>, text: impl Into<String>, timestamp_ms: u64) -> Self {
        Self {
            role: MessageRole::Tool,
            text: text.into(),
            timestamp_ms,
            tool_name: Some(name.into()),
            tool_input: None,
            tool_result_text: None,
        }
    }

    /// Create a tool message with full details including input and result.
    pub fn tool_with_details(
        name: impl Into<String>,
        text: impl Into<String>,
        timestamp_ms: u64,
        tool_input: Option<String>,
        tool_result_text: Option<String>,
    ) -> Self {
        Self {
            role: MessageRole::Tool,
            text: text.into(),
            timestamp_ms,
            tool_name: Some(name.into()),
            tool_input,
            tool_result_text,
        }
    }

    /// Convert this message into a canvas-core `Element`.
    ///
    /// The element uses `ElementKind::Text` with role-based coloring.
    /// The caller is responsible for setting the transform (position/size).
    pub fn to_element(&self) -> Element {
        let content = match self.role {
            MessageRole::Tool => {
                let name = self.tool_name.as_deref().unwrap_or("tool");
                format!("[{name}] {}", self.text)
            }
            _ => self.text.clone(),
        };

        Element::new(ElementKind::Text {
            content,
            font_size: 14.0,
            color: self.role.color().to_string(),
        })
    }

    /// Convert this message into a positioned `Element` with the given transform.
    pub fn to_element_at(&self, transform: Transform) -> Element {
        self.to_element().with_transform(transform)
    }

    /// Format the timestamp as `"HH:MM"` (UTC).
    ///
    /// The timestamp is treated as milliseconds since an arbitrary epoch
    /// (typically session start). For display, only hours and minutes matter.
    pub fn formatted_time(&self) -> String {
        let total_secs = self.timestamp_ms / 1000;
        let hours = (total_secs / 3600) % 24;
        let minutes = (total_secs / 60) % 60;
        format!("{hours:02}:{minutes:02}")
    }
}
