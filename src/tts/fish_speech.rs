//! Fish Speech voice cloning TTS backend.
//!
//! Uses a reference audio file to clone a voice for synthesis.
//! This module requires the `fish-speech` Cargo feature.

use crate::config::TtsConfig;
use crate::error::{Result, SpeechError};
use tracing::info;

/// Output sample rate for Fish Speech (matches Kokoro for pipeline compatibility).
const SAMPLE_RATE: u32 = 24_000;

/// Fish Speech TTS engine with voice cloning.
///
/// Synthesises speech using a cloned voice derived from a reference audio file.
/// Currently a scaffold — full integration pending the `fish-speech.rs` crate.
#[derive(Debug)]
pub struct FishSpeechTts {
    /// Retained configuration (used for logging / diagnostics).
    _config: TtsConfig,
}

impl FishSpeechTts {
    /// Create a new Fish Speech TTS instance.
    ///
    /// # Arguments
    ///
    /// * `config` - TTS configuration including the `voice_reference` path.
    ///
    /// # Errors
    ///
    /// Returns an error if `voice_reference` is not set or the file does not exist.
    pub fn new(config: &TtsConfig) -> Result<Self> {
        let reference_path = config.voice_reference.as_ref().ok_or_else(|| {
            SpeechError::Tts("voice_reference path required for Fish Speech backend".into())
        })?;

        if !reference_path.exists() {
            return Err(SpeechError::Tts(format!(
                "voice reference file not found: {}",
                reference_path.display()
            )));
        }

        info!("loading Fish Speech model");
        info!(
            "extracting voice embedding from: {}",
            reference_path.display()
        );

        // TODO: Initialise fish-speech model and extract speaker embedding.
        // Blocked on fish-speech.rs crate availability.

        info!("Fish Speech TTS ready (scaffold mode)");

        Ok(Self {
            _config: config.clone(),
        })
    }

    /// Synthesise text to 24 kHz mono f32 audio using the cloned voice.
    ///
    /// # Errors
    ///
    /// Returns an error if synthesis fails.
    pub async fn synthesize(&mut self, text: &str) -> Result<Vec<f32>> {
        if text.is_empty() {
            return Ok(Vec::new());
        }

        info!("Fish Speech synthesize (scaffold): \"{text}\"");

        // Scaffold: return silence proportional to text length.
        // Real implementation will call fish-speech inference.
        let duration_samples = (text.len() as f32 * 0.1 * SAMPLE_RATE as f32) as usize;
        Ok(vec![0.0f32; duration_samples])
    }

    /// Output sample rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }
}
