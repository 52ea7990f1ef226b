//! Audio Port (C1): capture PCM chunks as a lazy stream, play PCM (sync,
//! async, streamed), report playback state, stop playback.
//!
//! The core depends only on the [`AudioPort`] and [`ChunkStream`] traits.
//! A `cpal`-backed reference adapter lives in [`cpal_port`] for real
//! hardware; it is a plain implementor of these traits, not part of the
//! specified core.

pub mod cpal_port;

use crate::error::Result;

/// A lazy, finite-or-infinite sequence of PCM frames with an explicit
/// close operation that releases the underlying capture resource.
///
/// Closing before exhaustion is well-defined and must not leak device
/// handles — implementations guarantee this via their `Drop` impl in
/// addition to the explicit `close()`, so the device is released on
/// every exit path including an unwinding panic.
pub trait ChunkStream: Send {
    /// Pull the next PCM frame, or `None` once the stream is exhausted
    /// or has been closed.
    fn next_chunk(&mut self) -> Option<Result<Vec<i16>>>;

    /// Release the underlying capture resource. Idempotent: calling this
    /// more than once, or after exhaustion, is a no-op.
    fn close(&mut self);
}

/// Capture PCM chunks as a lazy stream; play PCM (sync, async, streamed);
/// report playback state; stop playback.
///
/// Multiple concurrent streams are not required; implementations may
/// serialize access to the underlying device.
pub trait AudioPort: Send {
    /// Open a capture stream yielding PCM frames of `chunk_ms` duration.
    ///
    /// # Errors
    ///
    /// Returns an error if the capture device is unavailable.
    fn stream(&mut self, chunk_ms: u32) -> Result<Box<dyn ChunkStream>>;

    /// Blocking capture of exactly `duration_s` seconds of audio.
    ///
    /// # Errors
    ///
    /// Returns an error if the capture device is unavailable.
    fn record(&mut self, duration_s: u64) -> Result<Vec<i16>>;

    /// Play PCM samples, blocking until playback ends.
    ///
    /// # Errors
    ///
    /// Returns an error if the playback device is unavailable.
    fn play(&mut self, pcm: &[i16]) -> Result<()>;

    /// Begin playback and return immediately. `is_playing()` reports
    /// state; `stop_playback()` halts it.
    ///
    /// # Errors
    ///
    /// Returns an error if the playback device is unavailable.
    fn play_async(&mut self, pcm: Vec<i16>) -> Result<()>;

    /// Consume a lazy PCM sequence, playing chunks as they arrive.
    /// Preemptible via `stop_playback`.
    ///
    /// # Errors
    ///
    /// Returns an error if the playback device is unavailable.
    fn play_streamed(&mut self, chunks: Box<dyn ChunkStream>) -> Result<()>;

    /// Whether playback started by `play_async` or `play_streamed` is
    /// still in progress.
    fn is_playing(&self) -> bool;

    /// Halt any playback started by `play_async` or `play_streamed`.
    fn stop_playback(&self);

    /// Release all resources held by this port.
    fn close(&mut self);
}

/// An in-memory [`ChunkStream`] over pre-recorded frames, used by the
/// reference fixtures and by tests that need a deterministic capture
/// source without real hardware.
pub struct VecChunkStream {
    frames: std::collections::VecDeque<Vec<i16>>,
    closed: bool,
}

impl VecChunkStream {
    /// Build a stream that yields `frames` in order, then ends.
    pub fn new(frames: Vec<Vec<i16>>) -> Self {
        Self {
            frames: frames.into(),
            closed: false,
        }
    }
}

impl ChunkStream for VecChunkStream {
    fn next_chunk(&mut self) -> Option<Result<Vec<i16>>> {
        if self.closed {
            return None;
        }
        self.frames.pop_front().map(Ok)
    }

    fn close(&mut self) {
        self.closed = true;
        self.frames.clear();
    }
}

impl Drop for VecChunkStream {
    fn drop(&mut self) {
        self.close();
    }
}
