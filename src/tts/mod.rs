//! TTS Port (C4): text→bytes, text→lazy PCM chunk stream.

use crate::audio::{ChunkStream, VecChunkStream};
use crate::error::Result;

/// Short silence clip duration returned for empty input, in milliseconds.
pub const EMPTY_INPUT_SILENCE_MS: u32 = 100;

/// Synthesize text into PCM int16 mono audio at the pipeline's playback
/// rate. Empty input returns a short silence clip rather than an error.
pub trait Tts: Send {
    /// Synthesize `text` into a single PCM blob.
    ///
    /// # Errors
    ///
    /// Returns an error if synthesis fails.
    fn synthesize(&mut self, text: &str) -> Result<Vec<i16>>;

    /// Synthesize `text` as a lazy PCM chunk stream. The default
    /// implementation wraps `synthesize` as a single-chunk stream; a
    /// backend only needs to implement `synthesize` to satisfy the
    /// contract, and may override this for true incremental streaming.
    ///
    /// # Errors
    ///
    /// Returns an error if synthesis fails.
    fn synthesize_stream(&mut self, text: &str) -> Result<Box<dyn ChunkStream>> {
        let pcm = self.synthesize(text)?;
        Ok(Box::new(VecChunkStream::new(vec![pcm])))
    }

    /// Sample rate of the audio this port produces.
    fn sample_rate(&self) -> u32;
}

/// A deterministic TTS fixture: returns a silence clip sized to the
/// input length so tests can assert on durations without a real model.
pub struct SilentTts {
    sample_rate: u32,
}

impl SilentTts {
    /// Build a fixture producing silence at `sample_rate`.
    pub fn new(sample_rate: u32) -> Self {
        Self { sample_rate }
    }

    fn silence(&self, ms: u32) -> Vec<i16> {
        let samples = (self.sample_rate as u64 * ms as u64 / 1000) as usize;
        vec![0; samples]
    }
}

impl Tts for SilentTts {
    fn synthesize(&mut self, text: &str) -> Result<Vec<i16>> {
        if text.trim().is_empty() {
            return Ok(self.silence(EMPTY_INPUT_SILENCE_MS));
        }
        // One "chunk" of silence per word, just enough to give tests a
        // non-trivial, input-dependent length to assert on.
        let words = text.split_whitespace().count().max(1) as u32;
        Ok(self.silence(EMPTY_INPUT_SILENCE_MS * words))
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}
