//! Fallback provider adapter.
//!
//! Wraps a primary (remote) provider with a local fallback. When the primary
//! provider returns a retryable error (network failure, timeout, rate limit),
//! the request is transparently retried against the local model.

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::fae_llm::LlmEventStream;
use crate::fae_llm::error::FaeLlmError;
use crate::fae_llm::provider::{ProviderAdapter, ToolDefinition};
use crate::fae_llm::providers::message::Message;
use crate::fae_llm::types::{EndpointType, RequestOptions};

/// A provider adapter that falls back to a local model on retryable errors.
///
/// The adapter tries the primary provider first. If the primary returns a
/// retryable error (network, timeout, rate-limit), the same request is
/// forwarded to the fallback (local) provider. Non-retryable errors
/// (auth, config) are propagated immediately.
pub struct FallbackProvider {
    primary: Arc<dyn ProviderAdapter>,
    fallback: Arc<dyn ProviderAdapter>,
    /// Count of fallback activations (for observability).
    fallback_count: AtomicU32,
}

impl FallbackProvider {
    /// Create a new fallback-enabled provider.
    ///
    /// - `primary`: the preferred provider (typically a remote API).
    /// - `fallback`: the backup provider (typically local mistralrs).
    pub fn new(primary: Arc<dyn ProviderAdapter>, fallback: Arc<dyn ProviderAdapter>) -> Self {
        Self {
            primary,
            fallback,
            fallback_count: AtomicU32::new(0),
        }
    }

    /// Number of times the fallback provider has been activated.
    pub fn fallback_count(&self) -> u32 {
        self.fallback_count.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for FallbackProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackProvider")
            .field("primary", &self.primary.name())
            .field("fallback", &self.fallback.name())
            .field("fallback_count", &self.fallback_count())
            .finish()
    }
}

#[async_trait]
impl ProviderAdapter for FallbackProvider {
    fn name(&self) -> &str {
        "fallback"
    }

    fn endpoint_type(&self) -> EndpointType {
        self.primary.endpoint_type()
    }

    async fn send(
        &self,
        messages: &[Message],
        options: &RequestOptions,
        tools: &[ToolDefinition],
    ) -> std::result::Result<LlmEventStream, FaeLlmError> {
        match self.primary.send(messages, options, tools).await {
            Ok(stream) => Ok(stream),
            Err(e) if e.is_retryable() => {
                self.fallback_count.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    primary = self.primary.name(),
                    fallback = self.fallback.name(),
                    error = %e,
                    "primary provider failed with retryable error, falling back to local model"
                );
                self.fallback.send(messages, options, tools).await
            }
            Err(e) => Err(e),
        }
    }
}
