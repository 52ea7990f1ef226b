//! Wake Detector (C2): consume PCM chunks, emit a boolean "detected";
//! resettable state.
//!
//! The concrete keyword-spotting model is out of scope for the core (see
//! the specification's scope note). [`EnergyWakeDetector`] is a reference
//! fixture — a simple energy-ratio gate, not a production spotter — that
//! satisfies the [`WakeDetector`] contract so the orchestrator is
//! exercisable without a real model.

use crate::error::Result;

/// Consume PCM chunks, emit a boolean "detected"; resettable state.
///
/// Detection is monotonic within an unreset window: once `detect` returns
/// `true`, it keeps returning `true` until `reset()` is called. `reset()`
/// MUST be invoked after a positive detection, after TTS playback starts,
/// and after barge-in.
pub trait WakeDetector: Send {
    /// Feed one PCM chunk; returns whether the wake word has been
    /// detected since the last `reset()`.
    ///
    /// # Errors
    ///
    /// Returns an error if the detector's internal analysis fails.
    fn detect(&mut self, chunk: &[i16]) -> Result<bool>;

    /// Clear accumulated detection state.
    fn reset(&mut self);

    /// Identifier for the active wake model, recorded in telemetry.
    fn model_id(&self) -> &str;
}

/// Reference wake detector: a short rolling RMS window that fires once
/// energy stays above a ratio of the recent noise floor for several
/// consecutive chunks. Not a real keyword spotter — any sufficiently
/// loud, sustained sound triggers it — but it implements the contract
/// faithfully (monotonic until reset, per-chunk boolean) for exercising
/// the orchestrator end to end.
pub struct EnergyWakeDetector {
    model_id: String,
    noise_floor: f32,
    trigger_ratio: f32,
    chunks_required: u32,
    above_streak: u32,
    detected: bool,
}

impl EnergyWakeDetector {
    /// Build a detector that fires after `chunks_required` consecutive
    /// chunks whose RMS exceeds `trigger_ratio * noise_floor`.
    pub fn new(model_id: impl Into<String>, noise_floor: f32, trigger_ratio: f32, chunks_required: u32) -> Self {
        Self {
            model_id: model_id.into(),
            noise_floor: noise_floor.max(1.0),
            trigger_ratio,
            chunks_required: chunks_required.max(1),
            above_streak: 0,
            detected: false,
        }
    }

    fn rms(chunk: &[i16]) -> f32 {
        if chunk.is_empty() {
            return 0.0;
        }
        let sum_sq: f64 = chunk.iter().map(|&s| (s as f64) * (s as f64)).sum();
        ((sum_sq / chunk.len() as f64).sqrt()) as f32
    }
}

impl WakeDetector for EnergyWakeDetector {
    fn detect(&mut self, chunk: &[i16]) -> Result<bool> {
        if self.detected {
            return Ok(true);
        }
        let rms = Self::rms(chunk);
        if rms >= self.noise_floor * self.trigger_ratio {
            self.above_streak += 1;
        } else {
            self.above_streak = 0;
        }
        if self.above_streak >= self.chunks_required {
            self.detected = true;
        }
        Ok(self.detected)
    }

    fn reset(&mut self) {
        self.above_streak = 0;
        self.detected = false;
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loud_chunk() -> Vec<i16> {
        vec![20_000; 160]
    }

    fn quiet_chunk() -> Vec<i16> {
        vec![10; 160]
    }

    #[test]
    fn fires_after_required_consecutive_loud_chunks() {
        let mut d = EnergyWakeDetector::new("test", 500.0, 3.0, 3);
        assert!(!d.detect(&loud_chunk()).unwrap());
        assert!(!d.detect(&loud_chunk()).unwrap());
        assert!(d.detect(&loud_chunk()).unwrap());
    }

    #[test]
    fn detection_is_monotonic_until_reset() {
        let mut d = EnergyWakeDetector::new("test", 500.0, 3.0, 1);
        assert!(d.detect(&loud_chunk()).unwrap());
        assert!(d.detect(&quiet_chunk()).unwrap());
        d.reset();
        assert!(!d.detect(&quiet_chunk()).unwrap());
    }

    #[test]
    fn quiet_streak_never_triggers() {
        let mut d = EnergyWakeDetector::new("test", 500.0, 3.0, 2);
        for _ in 0..10 {
            assert!(!d.detect(&quiet_chunk()).unwrap());
        }
    }

    #[test]
    fn non_consecutive_loud_chunks_do_not_trigger() {
        let mut d = EnergyWakeDetector::new("test", 500.0, 3.0, 2);
        assert!(!d.detect(&loud_chunk()).unwrap());
        assert!(!d.detect(&quiet_chunk()).unwrap());
        assert!(!d.detect(&loud_chunk()).unwrap());
    }

    #[test]
    fn exposes_model_id() {
        let d = EnergyWakeDetector::new("energy-v1", 500.0, 3.0, 3);
        assert_eq!(d.model_id(), "energy-v1");
    }
}
