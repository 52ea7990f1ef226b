//! Local endpoint probe service.
//!
//! Provides [`LocalProbeService`] for health-checking and model discovery
//! against local LLM endpoints (Ollama, llama.cpp, vLLM, etc.).
//!
//! This is a **read-only diagnostic service** — it never starts, stops,
//! or manages model processes. A future `RuntimeManager` may extend this.
//!
//! # Status Model
//!
//! A probe returns a [`ProbeStatus`] indicating the endpoint state:
//!
//! - [`Available`](ProbeStatus::Available) — endpoint responds and lists models
//! - [`NotRunning`](ProbeStatus::NotRunning) — connection refused / unreachable
//! - [`Timeout`](ProbeStatus::Timeout) — no response within deadline
//! - [`Unhealthy`](ProbeStatus::Unhealthy) — responds with an error status code
//! - [`IncompatibleResponse`](ProbeStatus::IncompatibleResponse) — responds but
//!   payload is not a recognized LLM API format

use serde::{Deserialize, Serialize};
use std::fmt;

// ── Types ──────────────────────────────────────────────────────

/// A model advertised by a local LLM endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalModel {
    /// Provider-specific model identifier (e.g. `"llama3:8b"`).
    pub id: String,
    /// Optional human-readable display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl LocalModel {
    /// Create a new local model with just an id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
        }
    }

    /// Attach a display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Returns the display name if set, otherwise the id.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

impl fmt::Display for LocalModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Status of a local LLM endpoint after probing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProbeStatus {
    /// Endpoint is running and lists available models.
    Available {
        /// Models discovered at this endpoint.
        models: Vec<LocalModel>,
        /// The endpoint URL that was probed.
        endpoint_url: String,
        /// Round-trip latency in milliseconds.
        latency_ms: u64,
    },
    /// Endpoint is not running (connection refused / unreachable).
    NotRunning,
    /// Probe timed out waiting for a response.
    Timeout,
    /// Endpoint responded with an HTTP error status.
    Unhealthy {
        /// HTTP status code.
        status_code: u16,
        /// Human-readable error message from the response body.
        message: String,
    },
    /// Endpoint responded but the payload is not a recognized LLM API format.
    IncompatibleResponse {
        /// Description of why the response is incompatible.
        detail: String,
    },
}

impl ProbeStatus {
    /// Returns `true` if the endpoint is available and serving models.
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available { .. })
    }

    /// Returns the discovered models, or an empty slice if unavailable.
    pub fn models(&self) -> &[LocalModel] {
        match self {
            Self::Available { models, .. } => models,
            _ => &[],
        }
    }

    /// Returns the endpoint URL if available, or `None`.
    pub fn endpoint_url(&self) -> Option<&str> {
        match self {
            Self::Available { endpoint_url, .. } => Some(endpoint_url),
            _ => None,
        }
    }
}

impl fmt::Display for ProbeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Available {
                models,
                endpoint_url,
                latency_ms,
            } => {
                write!(
                    f,
                    "Available at {endpoint_url} ({latency_ms}ms) — {} model(s)",
                    models.len()
                )
            }
            Self::NotRunning => write!(f, "Not running (connection refused)"),
            Self::Timeout => write!(f, "Timeout (no response)"),
            Self::Unhealthy {
                status_code,
                message,
            } => {
                write!(f, "Unhealthy (HTTP {status_code}): {message}")
            }
            Self::IncompatibleResponse { detail } => {
                write!(f, "Incompatible response: {detail}")
            }
        }
    }
}

/// Errors that can occur during endpoint probing.
///
/// Unlike [`ProbeStatus`] which describes the *state* of the endpoint,
/// `ProbeError` represents failures in the probing machinery itself.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProbeError {
    /// The probe URL is malformed or invalid.
    #[error("invalid endpoint URL: {0}")]
    InvalidUrl(String),

    /// An unexpected I/O or transport error occurred.
    #[error("transport error: {0}")]
    TransportError(String),
}

/// Result of a probe operation.
pub type ProbeResult = Result<ProbeStatus, ProbeError>;

/// Configuration for the local probe service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Base URL of the local endpoint to probe.
    pub endpoint_url: String,
    /// Maximum time in seconds to wait for a response.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Number of retries on transient failures (NotRunning, Timeout).
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    /// Initial delay between retries in milliseconds.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

fn default_timeout_secs() -> u64 {
    5
}

fn default_retry_count() -> u32 {
    2
}

fn default_retry_delay_ms() -> u64 {
    500
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            endpoint_url: "http://localhost:11434".to_string(),
            timeout_secs: default_timeout_secs(),
            retry_count: default_retry_count(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl ProbeConfig {
    /// Create a probe config for a specific endpoint URL.
    pub fn new(endpoint_url: impl Into<String>) -> Self {
        Self {
            endpoint_url: endpoint_url.into(),
            ..Default::default()
        }
    }

    /// Set the timeout in seconds.
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Set the retry count.
    pub fn with_retry_count(mut self, count: u32) -> Self {
        self.retry_count = count;
        self
    }

    /// Set the initial retry delay in milliseconds.
    pub fn with_retry_delay_ms(mut self, ms: u64) -> Self {
        self.retry_delay_ms = ms;
        self
    }
}

/// Service for probing local LLM endpoints.
///
/// Checks endpoint health, discovers available models, and reports
/// diagnostic status for app-menu display and provider selection.
///
/// # Example
///
/// ```rust,no_run
/// use fae::fae_llm::providers::local_probe::{LocalProbeService, ProbeConfig};
///
/// # async fn example() {
/// let service = LocalProbeService::with_defaults();
/// let status = service.probe().await;
/// match status {
///     Ok(s) if s.is_available() => {
///         println!("Models: {:?}", s.models());
///     }
///     Ok(s) => println!("Endpoint status: {s}"),
///     Err(e) => eprintln!("Probe error: {e}"),
/// }
/// # }
/// ```
pub struct LocalProbeService {
    /// Probe configuration.
    config: ProbeConfig,
    /// Shared HTTP client.
    client: reqwest::Client,
}

impl LocalProbeService {
    /// Create a new probe service with the given configuration.
    pub fn new(config: ProbeConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();
        Self { config, client }
    }

    /// Create a probe service with default configuration (Ollama at localhost:11434).
    pub fn with_defaults() -> Self {
        Self::new(ProbeConfig::default())
    }

    /// Returns a reference to the probe configuration.
    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// Check if the endpoint is reachable.
    ///
    /// Sends a GET request to the root URL. Maps transport errors to
    /// `ProbeStatus::NotRunning` or `ProbeStatus::Timeout`.
    pub async fn check_health(&self) -> ProbeResult {
        let url = format!("{}/", self.config.endpoint_url.trim_end_matches('/'));

        let start = std::time::Instant::now();
        match self.client.get(&url).send().await {
            Ok(resp) => {
                let latency_ms = start.elapsed().as_millis() as u64;
                let status_code = resp.status().as_u16();

                if resp.status().is_success() {
                    Ok(ProbeStatus::Available {
                        models: Vec::new(),
                        endpoint_url: self.config.endpoint_url.clone(),
                        latency_ms,
                    })
                } else {
                    let body = resp.text().await.unwrap_or_default();
                    let message = if body.is_empty() {
                        format!("HTTP {status_code}")
                    } else {
                        body.chars().take(500).collect()
                    };
                    Ok(ProbeStatus::Unhealthy {
                        status_code,
                        message,
                    })
                }
            }
            Err(e) => Ok(classify_reqwest_error(&e)),
        }
    }

    /// Discover models by querying the `/v1/models` endpoint.
    ///
    /// Falls back to `/api/tags` (Ollama format) if `/v1/models` fails.
    pub async fn discover_models(&self) -> ProbeResult {
        let base = self.config.endpoint_url.trim_end_matches('/');

        // Try OpenAI-compatible /v1/models first
        let start = std::time::Instant::now();
        let v1_url = format!("{base}/v1/models");
        match self.client.get(&v1_url).send().await {
            Ok(resp) if resp.status().is_success() => {
                let latency_ms = start.elapsed().as_millis() as u64;
                let body = resp.text().await.unwrap_or_default();
                match parse_openai_models_response(&body) {
                    Some(models) => {
                        return Ok(ProbeStatus::Available {
                            models,
                            endpoint_url: self.config.endpoint_url.clone(),
                            latency_ms,
                        });
                    }
                    None => {
                        // Fall through to try Ollama format
                    }
                }
            }
            Ok(_) | Err(_) => {
                // Fall through to try Ollama format
            }
        }

        // Try Ollama /api/tags
        let start = std::time::Instant::now();
        let tags_url = format!("{base}/api/tags");
        match self.client.get(&tags_url).send().await {
            Ok(resp) if resp.status().is_success() => {
                let latency_ms = start.elapsed().as_millis() as u64;
                let body = resp.text().await.unwrap_or_default();
                match parse_ollama_tags_response(&body) {
                    Some(models) => Ok(ProbeStatus::Available {
                        models,
                        endpoint_url: self.config.endpoint_url.clone(),
                        latency_ms,
                    }),
                    None => Ok(ProbeStatus::IncompatibleResponse {
                        detail: "neither /v1/models nor /api/tags returned valid model list"
                            .to_string(),
                    }),
                }
            }
            Ok(resp) => {
                let status_code = resp.status().as_u16();
                let body = resp.text().await.unwrap_or_default();
                Ok(ProbeStatus::Unhealthy {
                    status_code,
                    message: body.chars().take(500).collect(),
                })
            }
            Err(e) => Ok(classify_reqwest_error(&e)),
        }
    }

    /// Probe with bounded exponential backoff retry.
    ///
    /// Retries only on `NotRunning` and `Timeout` statuses.
    /// `Unhealthy` and `IncompatibleResponse` are returned immediately.
    pub async fn probe_with_retry(&self) -> ProbeResult {
        let max_attempts = self.config.retry_count.saturating_add(1);
        let mut last_status = ProbeStatus::NotRunning;

        for attempt in 0..max_attempts {
            // Health check first
            match self.check_health().await? {
                ProbeStatus::Available { .. } => {
                    // Endpoint is reachable, try model discovery
                    return self.discover_models().await;
                }
                status @ (ProbeStatus::Unhealthy { .. }
                | ProbeStatus::IncompatibleResponse { .. }) => {
                    // Non-transient failure, return immediately
                    return Ok(status);
                }
                status @ (ProbeStatus::NotRunning | ProbeStatus::Timeout) => {
                    last_status = status;
                    // Transient failure, retry if we have attempts left
                    if attempt + 1 < max_attempts {
                        let shift = attempt.min(63);
                        let multiplier = 1u64.checked_shl(shift).unwrap_or(u64::MAX);
                        let delay_ms = self.config.retry_delay_ms.saturating_mul(multiplier);
                        let max_delay_ms = self.config.timeout_secs.saturating_mul(1000);
                        let capped_delay = delay_ms.min(max_delay_ms);
                        tokio::time::sleep(std::time::Duration::from_millis(capped_delay)).await;
                    }
                }
            }
        }

        Ok(last_status)
    }

    /// Probe the configured endpoint.
    ///
    /// This is the main entry point. It performs a health check, discovers
    /// models, and retries on transient failures according to the config.
    pub async fn probe(&self) -> ProbeResult {
        self.probe_with_retry().await
    }
}

// ── Helpers ────────────────────────────────────────────────────

/// Classify a reqwest error into a ProbeStatus.
fn classify_reqwest_error(err: &reqwest::Error) -> ProbeStatus {
    if err.is_timeout() {
        ProbeStatus::Timeout
    } else if err.is_connect() {
        ProbeStatus::NotRunning
    } else {
        ProbeStatus::IncompatibleResponse {
            detail: format!("transport error: {err}"),
        }
    }
}

/// Parse an OpenAI-compatible `/v1/models` response.
///
/// Expected format: `{"data": [{"id": "model-name", ...}, ...]}`
fn parse_openai_models_response(body: &str) -> Option<Vec<LocalModel>> {
    let json: serde_json::Value = serde_json::from_str(body).ok()?;
    let data = json.get("data")?.as_array()?;
    let models: Vec<LocalModel> = data
        .iter()
        .filter_map(|entry| {
            let id = entry.get("id")?.as_str()?;
            Some(LocalModel::new(id))
        })
        .collect();
    Some(models)
}

/// Parse an Ollama `/api/tags` response.
///
/// Expected format: `{"models": [{"name": "llama3:8b", ...}, ...]}`
fn parse_ollama_tags_response(body: &str) -> Option<Vec<LocalModel>> {
    let json: serde_json::Value = serde_json::from_str(body).ok()?;
    let models_arr = json.get("models")?.as_array()?;
    let models: Vec<LocalModel> = models_arr
        .iter()
        .filter_map(|entry| {
            let name = entry.get("name")?.as_str()?;
            Some(LocalModel::new(name))
        })
        .collect();
    Some(models)
}
