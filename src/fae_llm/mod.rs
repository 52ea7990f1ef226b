//! FAE LLM module — embedded local LLM integration.
//!
//! This module provides the foundational types for interacting with
//! locally downloaded embedded models through a normalized interface.
//!
//! # Submodules
//!
//! - [`error`] — Error types with stable error codes
//! - [`types`] — Core domain types (endpoints, models, request options)
//! - [`events`] — Normalized streaming event model
//! - [`usage`] — Token usage and cost tracking
//! - [`metadata`] — Request/response metadata
//! - [`config`] — Configuration schema and persistence
//! - [`provider`] — Provider adapter trait
//! - [`providers`] — Local provider implementations (embedded GGUF inference)
//! - [`agent`] — Agent loop engine with tool calling
//! - [`session`] — Session persistence, validation, and conversation context
//! - [`observability`] — Structured tracing, metrics, and secret redaction
//!
//! # Event Model
//!
//! All providers normalize their streaming output to [`events::LlmEvent`],
//! providing a consistent interface regardless of the underlying model.
//!
//! # Error Codes
//!
//! All errors carry a stable code (e.g. `CONFIG_INVALID`, `AUTH_FAILED`)
//! that is safe to match on programmatically.

pub mod agent;
pub mod config;
pub mod error;
pub mod events;
pub mod metadata;
pub mod observability;
pub mod provider;
pub mod providers;
pub mod session;
pub mod tools;
pub mod types;
pub mod usage;

pub use agent::{
    AccumulatedToolCall, AccumulatedTurn, AgentConfig, AgentLoop, AgentLoopResult,
    ExecutedToolCall, StopReason, StreamAccumulator, ToolExecutor, TurnResult,
    build_messages_from_result, validate_tool_args,
};
pub use config::{
    ConfigEditor, ConfigService, DefaultsConfig, FaeLlmConfig, ModelConfig, ModelTier, ModelUpdate,
    ProviderConfig, ProviderUpdate, RuntimeConfig, SecretRef, ToolConfig, ToolMode, backup_config,
    default_config, ensure_config_exists, read_config, validate_config, write_config_atomic,
};
pub use error::FaeLlmError;
pub use events::{AssistantEvent, FinishReason, LlmEvent};
pub use metadata::{RequestMeta, ResponseMeta};
pub use provider::{
    AssistantEventStream, ConversationContext as ProviderConversationContext, LlmError,
    LlmEventStream, ProviderAdapter, ToolDefinition,
};
pub use providers::message::{AssistantToolCall, Message, MessageContent, Role};
pub use session::{
    ConversationContext, FsSessionStore, MemorySessionStore, Session, SessionId, SessionMeta,
    SessionResumeError, SessionStore, validate_message_sequence, validate_session,
};
pub use tools::{BashTool, EditTool, ReadTool, Tool, ToolRegistry, ToolResult, WriteTool};
pub use types::{EndpointType, ModelRef, ReasoningLevel, RequestOptions};
pub use usage::{CostEstimate, TokenPricing, TokenUsage};
