//! Acoustic Echo Cancellation (AEC) using FDAF adaptive filtering.
//!
//! Removes speaker output (echo) from the microphone signal so the VAD/STT
//! pipeline only sees the user's voice. This enables proper barge-in without
//! flag-based echo suppression.
//!
//! # Architecture
//!
//! ```text
//! Capture (16kHz) → [AecProcessor] → VAD → STT → LLM → TTS → Playback (24kHz)
//!                        ↑                                         │
//!                        └── ReferenceBuffer (24kHz→16kHz) ────────┘
//! ```

use crate::config::AecConfig;
use crate::pipeline::messages::AudioChunk;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Shared ring buffer holding resampled reference audio from the playback stage.
///
/// The playback stage pushes 24kHz samples via [`ReferenceHandle::push`],
/// which are downsampled to the capture rate (16kHz) on the fly. The AEC stage
/// drains frames of the same size as the microphone chunks.
pub struct ReferenceBuffer {
    inner: Arc<Mutex<VecDeque<f32>>>,
    playback_rate: u32,
    capture_rate: u32,
}

impl ReferenceBuffer {
    /// Create a new reference buffer.
    ///
    /// `playback_rate` is the speaker output rate (e.g. 24kHz).
    /// `capture_rate` is the microphone input rate (e.g. 16kHz).
    /// The internal ring buffer holds up to 2 seconds at the capture rate.
    pub fn new(playback_rate: u32, capture_rate: u32) -> Self {
        let capacity = (capture_rate as usize) * 2; // 2s
        Self {
            inner: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            playback_rate,
            capture_rate,
        }
    }

    /// Clone the shared `Arc` handle for passing to another stage.
    pub fn handle(&self) -> ReferenceHandle {
        ReferenceHandle {
            inner: Arc::clone(&self.inner),
            playback_rate: self.playback_rate,
            capture_rate: self.capture_rate,
        }
    }

    /// Drain exactly `n` samples from the buffer.
    ///
    /// If fewer than `n` samples are available, the remainder is zero-filled.
    pub fn drain_frame(&self, n: usize) -> Vec<f32> {
        let Ok(mut buf) = self.inner.lock() else {
            return vec![0.0; n];
        };
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            out.push(buf.pop_front().unwrap_or(0.0));
        }
        out
    }

    /// Clear all buffered reference audio (e.g. on barge-in stop).
    pub fn clear(&self) {
        if let Ok(mut buf) = self.inner.lock() {
            buf.clear();
        }
    }
}

/// A clonable handle to the reference buffer, used by the playback stage.
pub struct ReferenceHandle {
    inner: Arc<Mutex<VecDeque<f32>>>,
    playback_rate: u32,
    capture_rate: u32,
}

impl ReferenceHandle {
    /// Push playback samples into the reference buffer.
    ///
    /// Samples are downsampled from the playback rate to the capture rate
    /// via linear interpolation before being appended.
    pub fn push(&self, samples: &[f32]) {
        if samples.is_empty() {
            return;
        }
        let resampled = if self.playback_rate != self.capture_rate {
            downsample_linear(samples, self.playback_rate, self.capture_rate)
        } else {
            samples.to_vec()
        };
        let Ok(mut buf) = self.inner.lock() else {
            return;
        };
        // Cap at 2 seconds of capture-rate audio to prevent unbounded growth.
        let cap = (self.capture_rate as usize) * 2;

        // If the new data alone exceeds the cap, keep only the tail.
        let data = if resampled.len() > cap {
            &resampled[resampled.len() - cap..]
        } else {
            &resampled
        };

        let needed = data.len().saturating_sub(cap.saturating_sub(buf.len()));
        for _ in 0..needed {
            buf.pop_front();
        }
        buf.extend(data.iter());
    }

    /// Clear all buffered reference audio.
    pub fn clear(&self) {
        if let Ok(mut buf) = self.inner.lock() {
            buf.clear();
        }
    }
}

/// Wraps [`fdaf_aec::FdafAec`] for frame-by-frame echo cancellation.
pub struct AecProcessor {
    filter: fdaf_aec::FdafAec,
    reference: ReferenceBuffer,
    frame_size: usize,
}

impl AecProcessor {
    /// Create a new AEC processor.
    ///
    /// # Errors
    ///
    /// Returns an error if `fft_size` is not a power of two or is zero.
    pub fn new(config: &AecConfig, reference: ReferenceBuffer) -> crate::error::Result<Self> {
        if config.fft_size == 0 || !config.fft_size.is_power_of_two() {
            return Err(crate::error::SpeechError::Audio(format!(
                "AEC fft_size must be a non-zero power of two, got {}",
                config.fft_size
            )));
        }
        let filter = fdaf_aec::FdafAec::new(config.fft_size, config.step_size);
        let frame_size = config.fft_size / 2;
        Ok(Self {
            filter,
            reference,
            frame_size,
        })
    }

    /// Process a microphone audio chunk through the adaptive filter.
    ///
    /// Drains a matching reference frame and returns the echo-cancelled chunk.
    /// Sub-frame remainders (when the chunk length is not a multiple of
    /// `frame_size`) are passed through unprocessed.
    pub fn process(&mut self, chunk: AudioChunk) -> AudioChunk {
        let mic = &chunk.samples;
        if mic.is_empty() {
            return chunk;
        }

        let mut output = Vec::with_capacity(mic.len());
        let mut offset = 0;

        while offset + self.frame_size <= mic.len() {
            let mic_frame = &mic[offset..offset + self.frame_size];
            let ref_frame = self.reference.drain_frame(self.frame_size);
            let cleaned = self.filter.process(&ref_frame, mic_frame);
            output.extend_from_slice(&cleaned);
            offset += self.frame_size;
        }

        // Pass through any remaining samples that don't fill a complete frame.
        if offset < mic.len() {
            output.extend_from_slice(&mic[offset..]);
        }

        AudioChunk {
            samples: output,
            sample_rate: chunk.sample_rate,
            captured_at: chunk.captured_at,
        }
    }
}

/// Linear-interpolation downsampler (same algorithm as capture.rs).
fn downsample_linear(samples: &[f32], src_rate: u32, dst_rate: u32) -> Vec<f32> {
    if src_rate == dst_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = src_rate as f64 / dst_rate as f64;
    let out_len = (samples.len() as f64 / ratio) as usize;
    let mut output = Vec::with_capacity(out_len);

    for i in 0..out_len {
        let src_pos = i as f64 * ratio;
        let idx = src_pos as usize;
        let frac = src_pos - idx as f64;

        let sample = if idx + 1 < samples.len() {
            samples[idx] as f64 * (1.0 - frac) + samples[idx + 1] as f64 * frac
        } else {
            samples[idx.min(samples.len() - 1)] as f64
        };

        output.push(sample as f32);
    }

    output
}
