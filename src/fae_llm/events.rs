//! Normalized streaming event model for LLM providers.
//!
//! All LLM providers normalize their streaming output to [`LlmEvent`],
//! providing a consistent interface regardless of the underlying API.
//!
//! # Event Stream Lifecycle
//!
//! A typical stream flows:
//! ```text
//! StreamStart → TextDelta* → StreamEnd
//! ```
//!
//! With reasoning:
//! ```text
//! StreamStart → ThinkingStart → ThinkingDelta* → ThinkingEnd → TextDelta* → StreamEnd
//! ```
//!
//! With tool calls:
//! ```text
//! StreamStart → ToolCallStart → ToolCallArgsDelta* → ToolCallEnd → StreamEnd
//! ```
//!
//! # Examples
//!
//! ```
//! use fae::fae_llm::events::{LlmEvent, FinishReason};
//! use fae::fae_llm::types::ModelRef;
//!
//! let start = LlmEvent::StreamStart {
//!     request_id: "req-001".into(),
//!     model: ModelRef::new("gpt-4o"),
//! };
//!
//! let delta = LlmEvent::TextDelta {
//!     text: "Hello".into(),
//! };
//!
//! let end = LlmEvent::StreamEnd {
//!     finish_reason: FinishReason::Stop,
//! };
//! ```

use super::types::ModelRef;

/// A normalized streaming event from any LLM provider.
///
/// Events arrive in temporal order during streaming. Each event
/// represents a discrete unit of the model's output.
#[derive(Debug, Clone, PartialEq)]
pub enum LlmEvent {
    /// Stream has started. First event in every stream.
    StreamStart {
        /// Unique identifier for this request.
        request_id: String,
        /// The model being used.
        model: ModelRef,
    },

    /// A chunk of generated text.
    TextDelta {
        /// The text fragment.
        text: String,
    },

    /// The model has started a thinking/reasoning block.
    ThinkingStart,

    /// A chunk of thinking/reasoning text.
    ThinkingDelta {
        /// The thinking text fragment.
        text: String,
    },

    /// The model has finished its thinking/reasoning block.
    ThinkingEnd,

    /// A tool call has started.
    ToolCallStart {
        /// Unique identifier linking all events for this tool call.
        call_id: String,
        /// The name of the function being called.
        function_name: String,
    },

    /// A chunk of tool call arguments (streaming JSON).
    ToolCallArgsDelta {
        /// Identifier linking this delta to its [`ToolCallStart`](LlmEvent::ToolCallStart).
        call_id: String,
        /// A fragment of the JSON arguments string.
        args_fragment: String,
    },

    /// A tool call's arguments are complete.
    ToolCallEnd {
        /// Identifier linking this end to its [`ToolCallStart`](LlmEvent::ToolCallStart).
        call_id: String,
    },

    /// Stream has ended normally.
    StreamEnd {
        /// Why the model stopped generating.
        finish_reason: FinishReason,
    },

    /// Stream encountered an error.
    StreamError {
        /// Description of what went wrong.
        error: String,
    },
}

/// The reason the model stopped generating output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Natural stop (end of response).
    Stop,
    /// Hit the max token limit.
    Length,
    /// Model wants to call one or more tools.
    ToolCalls,
    /// Content was filtered by safety systems.
    ContentFilter,
    /// Request was cancelled by the caller.
    Cancelled,
    /// Provider-specific or unknown reason.
    Other,
}

impl std::fmt::Display for FinishReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stop => write!(f, "stop"),
            Self::Length => write!(f, "length"),
            Self::ToolCalls => write!(f, "tool_calls"),
            Self::ContentFilter => write!(f, "content_filter"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Other => write!(f, "other"),
        }
    }
}
