//! Request and response metadata for LLM interactions.
//!
//! Provides types for tracking request context and response details
//! that are useful for logging, debugging, and observability.
//!
//! # Examples
//!
//! ```
//! use fae::fae_llm::metadata::RequestMeta;
//! use fae::fae_llm::types::ModelRef;
//!
//! let meta = RequestMeta::new("req-001", ModelRef::new("gpt-4o"));
//! assert_eq!(meta.request_id, "req-001");
//! ```

use super::events::FinishReason;
use super::types::ModelRef;
use super::usage::TokenUsage;
use serde::{Deserialize, Serialize};

/// Metadata about an outgoing LLM request.
///
/// Created before sending the request, used to correlate
/// responses and track latency.
#[derive(Debug, Clone)]
pub struct RequestMeta {
    /// Unique identifier for this request.
    pub request_id: String,
    /// The model being called.
    pub model: ModelRef,
    /// When the request was created.
    pub created_at: std::time::Instant,
}

impl RequestMeta {
    /// Create metadata for a new request.
    pub fn new(request_id: impl Into<String>, model: ModelRef) -> Self {
        Self {
            request_id: request_id.into(),
            model,
            created_at: std::time::Instant::now(),
        }
    }

    /// Milliseconds elapsed since this request was created.
    pub fn elapsed_ms(&self) -> u64 {
        self.created_at.elapsed().as_millis() as u64
    }
}

/// Metadata about a completed LLM response.
///
/// Collected after the stream finishes, contains usage statistics
/// and timing information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseMeta {
    /// The request ID this response corresponds to.
    pub request_id: String,
    /// The model that generated this response (provider-reported).
    pub model_id: String,
    /// Token usage statistics (if reported by the provider).
    pub usage: Option<TokenUsage>,
    /// End-to-end latency in milliseconds.
    pub latency_ms: u64,
    /// Why the model stopped generating.
    pub finish_reason: FinishReason,
}

impl ResponseMeta {
    /// Create response metadata.
    pub fn new(
        request_id: impl Into<String>,
        model_id: impl Into<String>,
        finish_reason: FinishReason,
        latency_ms: u64,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            model_id: model_id.into(),
            usage: None,
            latency_ms,
            finish_reason,
        }
    }

    /// Attach token usage to this response.
    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }
}
