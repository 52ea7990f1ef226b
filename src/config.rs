//! Configuration types for the voice assistant runtime.
//!
//! Load order (lowest to highest precedence): compiled struct defaults,
//! an optional TOML file, then environment variable overrides. A missing
//! or partial file is not an error — every nested config implements
//! `Default` and `#[serde(default)]` so unset fields simply keep their
//! default value.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Top-level configuration for the voice assistant.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Audio capture/playback settings.
    pub audio: AudioConfig,
    /// Voice activity detection settings.
    pub vad: VadConfig,
    /// Barge-in (interrupt) behavior while the assistant is speaking.
    pub barge_in: BargeInConfig,
    /// Conversation / follow-up gate settings.
    pub voice: VoiceConfig,
    /// Language model conversation history settings.
    pub llm: LlmConfig,
    /// Intent router settings.
    pub intent: IntentConfig,
    /// Wake word identification.
    pub wake: WakeConfig,
    /// Telemetry store and dashboard settings.
    pub telemetry: TelemetryConfig,
    /// Wake acknowledgement prompt cache settings.
    pub prompt_cache: PromptCacheConfig,
}

/// Audio I/O configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Capture/playback sample rate in Hz.
    pub sample_rate: u32,
    /// Chunk duration in milliseconds for streamed capture.
    pub chunk_ms: u32,
    /// Input device name (None = system default).
    pub input_device: Option<String>,
    /// Output device name (None = system default).
    pub output_device: Option<String>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            chunk_ms: 80,
            input_device: None,
            output_device: None,
        }
    }
}

/// Voice activity detection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VadConfig {
    /// Whether C3 drives capture instead of a fixed-duration recording.
    pub enabled: bool,
    /// RMS energy threshold for speech detection.
    pub silence_threshold: f32,
    /// Contiguous below-threshold time required to end capture, in seconds.
    pub silence_duration_s: f32,
    /// Minimum capture duration in seconds.
    pub min_duration_s: f32,
    /// Maximum capture duration in seconds (hard stop).
    pub max_duration_s: f32,
    /// Consecutive above-threshold chunks required to mark speech started.
    pub speech_chunks_required: u32,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            silence_threshold: 500.0,
            silence_duration_s: 1.5,
            min_duration_s: 0.5,
            max_duration_s: 15.0,
            speech_chunks_required: 3,
        }
    }
}

/// Barge-in configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BargeInConfig {
    /// Whether barge-in monitoring during playback is enabled.
    pub enabled: bool,
    /// Chunks to skip after playback starts before monitoring for barge-in.
    pub debounce_chunks: u32,
}

impl Default for BargeInConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            debounce_chunks: 15,
        }
    }
}

/// Conversation / follow-up gate configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    /// Fixed capture duration in seconds, used only when VAD is disabled.
    pub record_duration_s: u64,
    /// Whether to play an acknowledgement clip on wake and between follow-ups.
    pub wake_feedback: bool,
    /// Maximum consecutive follow-up exchanges within one session.
    pub max_follow_ups: u32,
    /// Maximum consecutive pipeline errors before the orchestrator gives up.
    pub max_consecutive_errors: u32,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            record_duration_s: 5,
            wake_feedback: true,
            max_follow_ups: 10,
            max_consecutive_errors: 3,
        }
    }
}

/// Language model configuration (history retention only — provider details
/// are out of scope for the core).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Maximum number of (user, assistant) pairs retained in history.
    pub max_history: usize,
    /// History entry time-to-live in seconds; `<= 0` disables TTL expiry.
    pub history_ttl_s: i64,
    /// Token cap requested for `parse_intent` calls.
    pub intent_max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            max_history: 20,
            history_ttl_s: 1800,
            intent_max_tokens: 256,
        }
    }
}

/// Intent router configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IntentConfig {
    /// Whether the recovery (`classify_intent`) stage is enabled.
    pub recovery_enabled: bool,
}

impl Default for IntentConfig {
    fn default() -> Self {
        Self {
            recovery_enabled: true,
        }
    }
}

/// Wake word identification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WakeConfig {
    /// Identifier for the active wake model, recorded in telemetry.
    pub model: String,
}

impl Default for WakeConfig {
    fn default() -> Self {
        Self {
            model: "reference-energy-v1".to_owned(),
        }
    }
}

/// Telemetry store and dashboard configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Path to the embedded relational store file.
    pub db_path: PathBuf,
    /// Pruning threshold in bytes; exceeding it prunes the oldest 10% of sessions.
    pub max_size_bytes: u64,
    /// Dashboard bind host.
    pub web_host: String,
    /// Dashboard bind port.
    pub web_port: u16,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            db_path: default_data_dir().join("telemetry.db"),
            max_size_bytes: 64 * 1024 * 1024,
            web_host: "0.0.0.0".to_owned(),
            web_port: 8080,
        }
    }
}

/// Wake acknowledgement prompt cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptCacheConfig {
    /// Whether to pre-synthesize acknowledgement phrases at startup.
    pub enabled: bool,
    /// Candidate phrases; one is chosen at random on each wake.
    pub phrases: Vec<String>,
}

impl Default for PromptCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            phrases: vec![
                "Yes?".to_owned(),
                "I'm listening.".to_owned(),
                "Go ahead.".to_owned(),
                "What can I do?".to_owned(),
            ],
        }
    }
}

fn default_data_dir() -> PathBuf {
    if let Some(home) = std::env::var_os("HOME") {
        PathBuf::from(home).join(".hearthvox")
    } else {
        PathBuf::from("/tmp").join(".hearthvox")
    }
}

impl RuntimeConfig {
    /// Load configuration: defaults, overlaid by an optional TOML file at
    /// `path` (if `Some` and it exists), overlaid by environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a file at an explicitly given `path` cannot be
    /// read or fails to parse. A missing default path is not an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) if p.exists() => Self::from_file(p)?,
            Some(p) => {
                return Err(crate::error::Error::Config(format!(
                    "config file not found: {}",
                    p.display()
                )));
            }
            None => {
                let default_path = Self::default_config_path();
                if default_path.exists() {
                    Self::from_file(&default_path)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `$XDG_CONFIG_HOME/hearthvox/config.toml`.
    pub fn default_config_path() -> PathBuf {
        if let Some(config) = std::env::var_os("XDG_CONFIG_HOME") {
            PathBuf::from(config).join("hearthvox").join("config.toml")
        } else if let Some(home) = std::env::var_os("HOME") {
            PathBuf::from(home)
                .join(".config")
                .join("hearthvox")
                .join("config.toml")
        } else {
            PathBuf::from("/tmp/hearthvox-config/config.toml")
        }
    }

    /// Overlay `HEARTHVOX_<SECTION>_<FIELD>` environment variables onto the
    /// current values. Malformed values are logged and left unchanged
    /// rather than aborting.
    pub fn apply_env_overrides(&mut self) {
        env_u32("HEARTHVOX_AUDIO_SAMPLE_RATE", &mut self.audio.sample_rate);
        env_u32("HEARTHVOX_AUDIO_CHUNK_MS", &mut self.audio.chunk_ms);
        env_opt_string("HEARTHVOX_AUDIO_INPUT_DEVICE", &mut self.audio.input_device);
        env_opt_string(
            "HEARTHVOX_AUDIO_OUTPUT_DEVICE",
            &mut self.audio.output_device,
        );

        env_bool("HEARTHVOX_VAD_ENABLED", &mut self.vad.enabled);
        env_f32(
            "HEARTHVOX_VAD_SILENCE_THRESHOLD",
            &mut self.vad.silence_threshold,
        );
        env_f32(
            "HEARTHVOX_VAD_SILENCE_DURATION_S",
            &mut self.vad.silence_duration_s,
        );
        env_f32("HEARTHVOX_VAD_MIN_DURATION_S", &mut self.vad.min_duration_s);
        env_f32("HEARTHVOX_VAD_MAX_DURATION_S", &mut self.vad.max_duration_s);
        env_u32(
            "HEARTHVOX_VAD_SPEECH_CHUNKS_REQUIRED",
            &mut self.vad.speech_chunks_required,
        );

        env_bool("HEARTHVOX_BARGE_IN_ENABLED", &mut self.barge_in.enabled);
        env_u32(
            "HEARTHVOX_BARGE_IN_DEBOUNCE_CHUNKS",
            &mut self.barge_in.debounce_chunks,
        );

        env_u64(
            "HEARTHVOX_VOICE_RECORD_DURATION_S",
            &mut self.voice.record_duration_s,
        );
        env_bool("HEARTHVOX_VOICE_WAKE_FEEDBACK", &mut self.voice.wake_feedback);
        env_u32(
            "HEARTHVOX_VOICE_MAX_FOLLOW_UPS",
            &mut self.voice.max_follow_ups,
        );
        env_u32(
            "HEARTHVOX_VOICE_MAX_CONSECUTIVE_ERRORS",
            &mut self.voice.max_consecutive_errors,
        );

        if let Some(v) = parse_env::<usize>("HEARTHVOX_LLM_MAX_HISTORY") {
            self.llm.max_history = v;
        }
        if let Some(v) = parse_env::<i64>("HEARTHVOX_LLM_HISTORY_TTL_S") {
            self.llm.history_ttl_s = v;
        }
        env_u32(
            "HEARTHVOX_LLM_INTENT_MAX_TOKENS",
            &mut self.llm.intent_max_tokens,
        );

        env_bool(
            "HEARTHVOX_INTENT_RECOVERY_ENABLED",
            &mut self.intent.recovery_enabled,
        );

        if let Ok(v) = std::env::var("HEARTHVOX_WAKE_MODEL") {
            self.wake.model = v;
        }

        if let Ok(v) = std::env::var("HEARTHVOX_TELEMETRY_DB_PATH") {
            self.telemetry.db_path = PathBuf::from(v);
        }
        if let Some(v) = parse_env::<u64>("HEARTHVOX_TELEMETRY_MAX_SIZE_BYTES") {
            self.telemetry.max_size_bytes = v;
        }
        if let Ok(v) = std::env::var("HEARTHVOX_TELEMETRY_WEB_HOST") {
            self.telemetry.web_host = v;
        }
        env_u16("HEARTHVOX_TELEMETRY_WEB_PORT", &mut self.telemetry.web_port);

        env_bool("HEARTHVOX_PROMPT_CACHE_ENABLED", &mut self.prompt_cache.enabled);
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    match std::env::var(key) {
        Ok(raw) => match raw.parse() {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!("ignoring malformed {key} override: {raw:?}");
                None
            }
        },
        Err(_) => None,
    }
}

fn env_u32(key: &str, field: &mut u32) {
    if let Some(v) = parse_env(key) {
        *field = v;
    }
}

fn env_u16(key: &str, field: &mut u16) {
    if let Some(v) = parse_env(key) {
        *field = v;
    }
}

fn env_u64(key: &str, field: &mut u64) {
    if let Some(v) = parse_env(key) {
        *field = v;
    }
}

fn env_f32(key: &str, field: &mut f32) {
    if let Some(v) = parse_env(key) {
        *field = v;
    }
}

fn env_bool(key: &str, field: &mut bool) {
    if let Some(v) = parse_env(key) {
        *field = v;
    }
}

fn env_opt_string(key: &str, field: &mut Option<String>) {
    if let Ok(v) = std::env::var(key) {
        *field = Some(v);
    }
}
