//! Error types for the voice assistant runtime.

/// Top-level error type for the voice assistant system.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Audio device or stream error (capture/playback unavailable).
    #[error("audio error: {0}")]
    Audio(String),

    /// Wake word detector error.
    #[error("wake detector error: {0}")]
    Wake(String),

    /// Voice activity detection error.
    #[error("VAD error: {0}")]
    Vad(String),

    /// Speech-to-text transcription error.
    #[error("STT error: {0}")]
    Stt(String),

    /// Text-to-speech synthesis error.
    #[error("TTS error: {0}")]
    Tts(String),

    /// Language model inference error.
    #[error("LLM error: {0}")]
    Llm(String),

    /// Feature execute/handle error.
    #[error("feature error: {0}")]
    Feature(String),

    /// Intent routing error.
    #[error("routing error: {0}")]
    Router(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Telemetry store/web error.
    #[error("telemetry error: {0}")]
    Telemetry(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Channel send/receive error.
    #[error("channel error: {0}")]
    Channel(String),
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::Telemetry(e.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Config(e.to_string())
    }
}

impl From<toml::ser::Error> for Error {
    fn from(e: toml::ser::Error) -> Self {
        Error::Config(e.to_string())
    }
}

/// Convenience result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
