//! STT Port (C4): bytes→text.

use crate::error::Result;

/// Transcribe PCM int16 mono audio at the pipeline's capture rate into
/// text. An empty or whitespace-only result is allowed and is the
/// orchestrator's signal to skip routing for that exchange.
pub trait Stt: Send {
    /// Transcribe `pcm` into text.
    ///
    /// # Errors
    ///
    /// Returns an error if transcription fails outright (not to be
    /// confused with a successful empty-string result).
    fn transcribe(&mut self, pcm: &[i16]) -> Result<String>;
}

/// A deterministic, table-driven STT fixture for exercising the
/// orchestrator and router without a real transcription model.
pub struct ScriptedStt {
    responses: std::collections::VecDeque<String>,
}

impl ScriptedStt {
    /// Build a fixture that returns each entry of `responses` in order,
    /// falling back to an empty string once exhausted.
    pub fn new(responses: Vec<String>) -> Self {
        Self {
            responses: responses.into(),
        }
    }
}

impl Stt for ScriptedStt {
    fn transcribe(&mut self, _pcm: &[i16]) -> Result<String> {
        Ok(self.responses.pop_front().unwrap_or_default())
    }
}
