//! Provider adapter trait for LLM backends.
//!
//! Defines the [`ProviderAdapter`] trait that all LLM provider implementations
//! must satisfy. Adapters convert provider-specific APIs into the shared
//! [`LlmEvent`](super::events::LlmEvent) streaming model.
//!
//! # Examples
//!
//! ```rust,no_run
//! use fae::fae_llm::provider::{ProviderAdapter, ToolDefinition};
//! use fae::fae_llm::providers::message::{Message, Role};
//! use fae::fae_llm::types::RequestOptions;
//!
//! async fn example(adapter: &dyn ProviderAdapter) {
//!     let messages = vec![
//!         Message::text(Role::User, "Hello"),
//!     ];
//!     let options = RequestOptions::new();
//!     let stream = adapter.send(&messages, &options, &[]).await;
//! }
//! ```

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;
use serde::{Deserialize, Serialize};

use super::error::FaeLlmError;
use super::events::LlmEvent;
use super::types::RequestOptions;
use crate::fae_llm::providers::message::Message;

/// A tool definition provided to the LLM for function calling.
///
/// Contains the metadata the model needs to decide when and how to
/// invoke a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name (e.g. `"read"`, `"bash"`).
    pub name: String,
    /// Human-readable description of the tool's purpose.
    pub description: String,
    /// JSON Schema describing the tool's parameters.
    pub parameters: serde_json::Value,
}

impl ToolDefinition {
    /// Create a new tool definition.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// A boxed stream of LLM events.
pub type LlmEventStream = Pin<Box<dyn Stream<Item = LlmEvent> + Send>>;

/// Trait for LLM provider adapters.
///
/// Each provider (OpenAI, Anthropic, local endpoints) implements this trait
/// to normalize its streaming API into the shared [`LlmEvent`] model.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Returns the provider name (e.g. `"openai"`, `"anthropic"`).
    fn name(&self) -> &str;

    /// Send a request to the LLM and return a stream of normalized events.
    ///
    /// # Arguments
    ///
    /// * `messages` - The conversation history
    /// * `options` - Generation parameters (temperature, max_tokens, etc.)
    /// * `tools` - Available tools the model may call
    ///
    /// # Errors
    ///
    /// Returns `FaeLlmError` if the request cannot be initiated (auth, network, etc.).
    /// Stream-level errors are delivered as [`LlmEvent::StreamError`].
    async fn send(
        &self,
        messages: &[Message],
        options: &RequestOptions,
        tools: &[ToolDefinition],
    ) -> Result<LlmEventStream, FaeLlmError>;
}
