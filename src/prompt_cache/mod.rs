//! Wake acknowledgement prompt cache (C11).
//!
//! Synthesizes a small pool of acknowledgement phrases once at startup so
//! the orchestrator can play an immediate "I'm listening" clip on wake
//! without incurring synthesis latency mid-exchange. Per-phrase synthesis
//! failures are skipped with a warning; if every phrase fails, `pick()`
//! falls back to a short silence clip rather than failing the caller.

use rand::seq::SliceRandom;
use tracing::warn;

use crate::config::PromptCacheConfig;
use crate::tts::Tts;

const FALLBACK_SILENCE_MS: u32 = 150;

/// Pre-synthesized pool of wake acknowledgement clips.
pub struct PromptCache {
    sample_rate: u32,
    clips: Vec<Vec<i16>>,
}

impl PromptCache {
    /// Synthesize every configured phrase via `tts`, skipping failures.
    pub fn build(config: &PromptCacheConfig, tts: &mut dyn Tts) -> Self {
        let sample_rate = tts.sample_rate();
        let mut clips = Vec::new();
        if config.enabled {
            for phrase in &config.phrases {
                match tts.synthesize(phrase) {
                    Ok(pcm) => clips.push(pcm),
                    Err(e) => warn!("prompt cache: failed to synthesize {phrase:?}: {e}"),
                }
            }
        }
        Self { sample_rate, clips }
    }

    /// Number of cached clips.
    pub fn len(&self) -> usize {
        self.clips.len()
    }

    /// Whether the cache has no usable clips.
    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }

    /// Pick a clip uniformly at random. Returns a short silence clip if
    /// the cache is empty.
    pub fn pick(&self) -> Vec<i16> {
        self.clips
            .choose(&mut rand::thread_rng())
            .cloned()
            .unwrap_or_else(|| vec![0i16; (self.sample_rate / 1000 * FALLBACK_SILENCE_MS) as usize])
    }
}
