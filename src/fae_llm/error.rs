//! Error types for the fae_llm module.
//!
//! Each error variant carries a stable error code (SCREAMING_SNAKE_CASE)
//! that is included in the Display output and accessible via [`FaeLlmError::code()`].
//! Codes are part of the public API contract and will not change.

/// Errors produced by the fae_llm module.
///
/// Each variant includes a stable error code accessible via [`FaeLlmError::code()`].
/// The Display impl formats as `[CODE] message`.
#[derive(Debug, thiserror::Error)]
pub enum FaeLlmError {
    /// Invalid or missing configuration.
    #[error("[CONFIG_INVALID] {0}")]
    ConfigError(String),

    /// Authentication failed (invalid/missing API key).
    #[error("[AUTH_FAILED] {0}")]
    AuthError(String),

    /// Request to the LLM provider failed.
    #[error("[REQUEST_FAILED] {0}")]
    RequestError(String),

    /// Streaming response encountered an error.
    #[error("[STREAM_FAILED] {0}")]
    StreamError(String),

    /// Tool execution failed.
    #[error("[TOOL_FAILED] {0}")]
    ToolError(String),

    /// Request or operation timed out.
    #[error("[TIMEOUT] {0}")]
    Timeout(String),

    /// Provider-specific error not covered by other variants.
    #[error("[PROVIDER_ERROR] {0}")]
    ProviderError(String),
}

impl FaeLlmError {
    /// Returns the stable error code for this error.
    ///
    /// Codes are SCREAMING_SNAKE_CASE strings that remain stable across releases.
    /// Use these for programmatic error handling rather than parsing Display output.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigError(_) => "CONFIG_INVALID",
            Self::AuthError(_) => "AUTH_FAILED",
            Self::RequestError(_) => "REQUEST_FAILED",
            Self::StreamError(_) => "STREAM_FAILED",
            Self::ToolError(_) => "TOOL_FAILED",
            Self::Timeout(_) => "TIMEOUT",
            Self::ProviderError(_) => "PROVIDER_ERROR",
        }
    }

    /// Returns the inner message without the code prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::ConfigError(m)
            | Self::AuthError(m)
            | Self::RequestError(m)
            | Self::StreamError(m)
            | Self::ToolError(m)
            | Self::Timeout(m)
            | Self::ProviderError(m) => m,
        }
    }
}

/// Convenience alias for fae_llm results.
pub type Result<T> = std::result::Result<T, FaeLlmError>;
