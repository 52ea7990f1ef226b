//! Core domain types for the fae_llm module.
//!
//! Provides fundamental types used across the module:
//! - [`EndpointType`] — identifies the kind of LLM endpoint
//! - [`ModelRef`] — references a specific model with optional version
//! - [`ReasoningLevel`] — controls thinking/reasoning output
//! - [`RequestOptions`] — configures generation parameters

use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of LLM endpoint being targeted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointType {
    /// OpenAI API (or compatible).
    OpenAI,
    /// Anthropic Messages API.
    Anthropic,
    /// Local inference endpoint (Ollama, llama.cpp, vLLM, etc.).
    Local,
    /// Custom endpoint with provider-specific handling.
    Custom,
}

impl fmt::Display for EndpointType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OpenAI => write!(f, "openai"),
            Self::Anthropic => write!(f, "anthropic"),
            Self::Local => write!(f, "local"),
            Self::Custom => write!(f, "custom"),
        }
    }
}

/// A reference to a specific LLM model.
///
/// # Examples
///
/// ```
/// use fae::fae_llm::types::ModelRef;
///
/// let model = ModelRef::new("gpt-4o");
/// assert_eq!(model.full_name(), "gpt-4o");
///
/// let versioned = ModelRef::new("claude-opus-4").with_version("2025-04-14");
/// assert_eq!(versioned.full_name(), "claude-opus-4@2025-04-14");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelRef {
    /// Provider-specific model ID (e.g. `"gpt-4o"`, `"claude-opus-4"`).
    pub model_id: String,
    /// Optional version or snapshot identifier.
    pub version: Option<String>,
}

impl ModelRef {
    /// Create a new model reference with just a model ID.
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            version: None,
        }
    }

    /// Attach a version to this model reference.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Returns `"model_id"` or `"model_id@version"` when a version is set.
    pub fn full_name(&self) -> String {
        match &self.version {
            Some(v) => format!("{}@{}", self.model_id, v),
            None => self.model_id.clone(),
        }
    }
}

impl fmt::Display for ModelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.full_name())
    }
}

/// Controls the level of thinking/reasoning output from the model.
///
/// Not all providers support reasoning. When unsupported, this is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningLevel {
    /// No thinking/reasoning blocks.
    #[default]
    Off,
    /// Minimal reasoning (budget mode).
    Low,
    /// Balanced reasoning.
    Medium,
    /// Extended reasoning for high accuracy.
    High,
}

impl fmt::Display for ReasoningLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Off => write!(f, "off"),
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

/// Options controlling LLM generation behavior.
///
/// # Examples
///
/// ```
/// use fae::fae_llm::types::{RequestOptions, ReasoningLevel};
///
/// let opts = RequestOptions::new()
///     .with_max_tokens(4096)
///     .with_temperature(0.3)
///     .with_reasoning(ReasoningLevel::High);
///
/// assert_eq!(opts.max_tokens, Some(4096));
/// assert_eq!(opts.reasoning_level, ReasoningLevel::High);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestOptions {
    /// Maximum tokens to generate. `None` means use provider default.
    pub max_tokens: Option<usize>,
    /// Sampling temperature (0.0 = deterministic, 2.0 = max randomness).
    pub temperature: Option<f64>,
    /// Nucleus sampling threshold.
    pub top_p: Option<f64>,
    /// Level of thinking/reasoning output.
    pub reasoning_level: ReasoningLevel,
    /// Whether to stream the response.
    pub stream: bool,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            max_tokens: Some(2048),
            temperature: Some(0.7),
            top_p: Some(0.9),
            reasoning_level: ReasoningLevel::Off,
            stream: true,
        }
    }
}

impl RequestOptions {
    /// Create request options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of tokens to generate.
    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set the sampling temperature.
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the nucleus sampling threshold.
    pub fn with_top_p(mut self, top_p: f64) -> Self {
        self.top_p = Some(top_p);
        self
    }

    /// Set the reasoning level.
    pub fn with_reasoning(mut self, level: ReasoningLevel) -> Self {
        self.reasoning_level = level;
        self
    }

    /// Set whether to stream the response.
    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }
}
