//! VAD Recorder (C3): consume a PCM chunk stream, emit one PCM blob
//! bounded by speech/silence/min/max rules.

use crate::audio::ChunkStream;
use crate::config::VadConfig;
use crate::error::Result;

/// Energy-based voice activity detector that turns a chunk stream into a
/// single bounded PCM recording.
pub struct VadRecorder {
    silence_threshold: f32,
    silence_duration_s: f32,
    min_duration_s: f32,
    max_duration_s: f32,
    speech_chunks_required: u32,
}

impl VadRecorder {
    /// Build a recorder from configuration.
    pub fn new(config: &VadConfig) -> Self {
        Self {
            silence_threshold: config.silence_threshold,
            silence_duration_s: config.silence_duration_s,
            min_duration_s: config.min_duration_s,
            max_duration_s: config.max_duration_s,
            speech_chunks_required: config.speech_chunks_required,
        }
    }

    /// Compute RMS energy of a PCM int16 chunk, widening to `f64` to avoid
    /// overflow when squaring.
    pub fn rms(chunk: &[i16]) -> f32 {
        if chunk.is_empty() {
            return 0.0;
        }
        let sum_sq: f64 = chunk.iter().map(|&s| (s as f64) * (s as f64)).sum();
        (sum_sq / chunk.len() as f64).sqrt() as f32
    }

    /// Consume `stream`, whose chunks are each `chunk_ms` milliseconds
    /// long, and return the concatenated PCM recorded until the
    /// stop condition fires. Always closes `stream` on exit, including
    /// on an I/O error from the stream itself.
    ///
    /// Stop conditions, checked in this order on every chunk:
    /// 1. Unconditional stop once elapsed time reaches `max_duration_s`
    ///    (the triggering chunk is included).
    /// 2. Once speech has started (`speech_chunks_required` consecutive
    ///    above-threshold chunks observed), stop once a contiguous
    ///    below-threshold span reaches `silence_duration_s` AND elapsed
    ///    time has reached `min_duration_s`.
    ///
    /// The silence timer resets on any above-threshold chunk, even after
    /// speech has started.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying stream yields one.
    pub fn record_until_silence(
        &self,
        stream: &mut dyn ChunkStream,
        chunk_ms: u32,
    ) -> Result<Vec<i16>> {
        let chunk_dur_s = chunk_ms as f32 / 1000.0;
        let mut collected: Vec<i16> = Vec::new();
        let mut elapsed_s: f32 = 0.0;
        let mut above_streak: u32 = 0;
        let mut speech_started = self.speech_chunks_required == 0;
        let mut silence_elapsed_s: f32 = 0.0;
        let mut in_silence = false;

        let result = loop {
            match stream.next_chunk() {
                Some(Ok(chunk)) => {
                    collected.extend_from_slice(&chunk);
                    elapsed_s += chunk_dur_s;

                    if elapsed_s >= self.max_duration_s {
                        break Ok(collected);
                    }

                    let rms = Self::rms(&chunk);
                    if rms >= self.silence_threshold {
                        above_streak += 1;
                        if !speech_started && above_streak >= self.speech_chunks_required {
                            speech_started = true;
                        }
                        in_silence = false;
                        silence_elapsed_s = 0.0;
                    } else {
                        above_streak = 0;
                        if speech_started {
                            if !in_silence {
                                in_silence = true;
                                silence_elapsed_s = 0.0;
                            }
                            silence_elapsed_s += chunk_dur_s;
                            if silence_elapsed_s >= self.silence_duration_s
                                && elapsed_s >= self.min_duration_s
                            {
                                break Ok(collected);
                            }
                        }
                    }
                }
                Some(Err(e)) => break Err(e),
                None => break Ok(collected),
            }
        };

        stream.close();
        result
    }
}
