//! Hearthvox: a local, wake-word-gated voice assistant runtime.
//!
//! The pipeline is a synchronous loop driven by one orchestrator thread:
//!
//! ```text
//! wake detect → VAD capture → STT → intent routing → TTS → playback
//! ```
//!
//! Every stage sits behind a narrow trait ([`audio::AudioPort`],
//! [`wake::WakeDetector`], [`stt::Stt`], [`tts::Tts`], [`llm::Llm`],
//! [`feature::Feature`]) so the orchestrator in [`pipeline`] is
//! exercisable end to end against deterministic fixtures without real
//! hardware or a model backend. [`telemetry`] persists every session to
//! an embedded store and serves a small read-only dashboard over HTTP.

pub mod audio;
pub mod config;
pub mod error;
pub mod feature;
pub mod features;
pub mod llm;
pub mod pipeline;
pub mod prompt_cache;
pub mod router;
pub mod stt;
pub mod telemetry;
pub mod tts;
pub mod vad;
pub mod wake;

pub use config::RuntimeConfig;
pub use error::{Error, Result};
pub use pipeline::Orchestrator;
