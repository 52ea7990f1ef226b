//! Reference `cpal`-backed implementation of the [`AudioPort`] trait.
//!
//! Capture chunks are pushed into a bounded channel from the cpal input
//! callback; a full channel drops the newest chunk with a rate-limited
//! warning rather than blocking the audio thread. Playback runs on a
//! dedicated OS thread so `play_async`/`play_streamed` can return
//! immediately while `is_playing`/`stop_playback` observe shared atomics.

use crate::audio::{AudioPort, ChunkStream};
use crate::config::AudioConfig;
use crate::error::{Error, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::StreamConfig;
use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};

/// `cpal`-backed audio port: one input device, one output device.
pub struct CpalAudioPort {
    input_device: cpal::Device,
    output_device: cpal::Device,
    sample_rate: u32,
    playing: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
    playback_thread: Option<std::thread::JoinHandle<()>>,
}

impl CpalAudioPort {
    /// Resolve input/output devices per `config`, falling back to the
    /// system default and logging a warning on a named-device miss.
    ///
    /// # Errors
    ///
    /// Returns an error if no input or output device is available.
    pub fn new(config: &AudioConfig) -> Result<Self> {
        let host = cpal::default_host();

        let input_device = resolve_input_device(&host, config.input_device.as_deref())?;
        let output_device = resolve_output_device(&host, config.output_device.as_deref())?;

        Ok(Self {
            input_device,
            output_device,
            sample_rate: config.sample_rate,
            playing: Arc::new(AtomicBool::new(false)),
            stop: Arc::new(AtomicBool::new(false)),
            playback_thread: None,
        })
    }

    fn stream_config(&self) -> StreamConfig {
        StreamConfig {
            channels: 1,
            sample_rate: cpal::SampleRate(self.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        }
    }
}

fn resolve_input_device(host: &cpal::Host, name: Option<&str>) -> Result<cpal::Device> {
    if let Some(name) = name {
        if let Ok(mut devices) = host.input_devices() {
            if let Some(device) = devices.find(|d| d.name().map(|n| n == name).unwrap_or(false)) {
                return Ok(device);
            }
        }
        warn!("input device '{name}' not found, falling back to default");
    }
    host.default_input_device()
        .ok_or_else(|| Error::Audio("no default input device".into()))
}

fn resolve_output_device(host: &cpal::Host, name: Option<&str>) -> Result<cpal::Device> {
    if let Some(name) = name {
        if let Ok(mut devices) = host.output_devices() {
            if let Some(device) = devices.find(|d| d.name().map(|n| n == name).unwrap_or(false)) {
                return Ok(device);
            }
        }
        warn!("output device '{name}' not found, falling back to default");
    }
    host.default_output_device()
        .ok_or_else(|| Error::Audio("no default output device".into()))
}

/// Chunk stream backed by a cpal input stream; dropping or calling
/// `close()` stops and drops the underlying cpal stream, releasing the
/// device.
struct CpalChunkStream {
    rx: Receiver<Vec<i16>>,
    _stream: cpal::Stream,
    closed: bool,
}

impl ChunkStream for CpalChunkStream {
    fn next_chunk(&mut self) -> Option<Result<Vec<i16>>> {
        if self.closed {
            return None;
        }
        self.rx.recv().ok().map(Ok)
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

impl Drop for CpalChunkStream {
    fn drop(&mut self) {
        self.close();
    }
}

impl AudioPort for CpalAudioPort {
    fn stream(&mut self, chunk_ms: u32) -> Result<Box<dyn ChunkStream>> {
        let chunk_samples = (self.sample_rate as u64 * chunk_ms as u64 / 1000) as usize;
        let (tx, rx): (Sender<Vec<i16>>, Receiver<Vec<i16>>) = bounded(32);
        let config = self.stream_config();

        let mut pending: Vec<i16> = Vec::with_capacity(chunk_samples);
        let stream = self
            .input_device
            .build_input_stream(
                &config,
                move |data: &[f32], _| {
                    for &sample in data {
                        pending.push((sample * i16::MAX as f32) as i16);
                        if pending.len() >= chunk_samples {
                            let chunk = std::mem::replace(&mut pending, Vec::with_capacity(chunk_samples));
                            if tx.try_send(chunk).is_err() {
                                debug!("capture channel full or closed, dropping chunk");
                            }
                        }
                    }
                },
                |err| error!("audio input stream error: {err}"),
                None,
            )
            .map_err(|e| Error::Audio(format!("failed to build input stream: {e}")))?;

        stream
            .play()
            .map_err(|e| Error::Audio(format!("failed to start input stream: {e}")))?;

        Ok(Box::new(CpalChunkStream {
            rx,
            _stream: stream,
            closed: false,
        }))
    }

    fn record(&mut self, duration_s: u64) -> Result<Vec<i16>> {
        let chunk_ms = 80;
        let mut stream = self.stream(chunk_ms)?;
        let target_samples = self.sample_rate as u64 * duration_s;
        let mut out = Vec::with_capacity(target_samples as usize);
        while (out.len() as u64) < target_samples {
            match stream.next_chunk() {
                Some(Ok(chunk)) => out.extend(chunk),
                Some(Err(e)) => return Err(e),
                None => break,
            }
        }
        stream.close();
        out.truncate(target_samples as usize);
        Ok(out)
    }

    fn play(&mut self, pcm: &[i16]) -> Result<()> {
        let buffer = Arc::new(Mutex::new(PlaybackBuffer {
            samples: pcm.to_vec(),
            position: 0,
            finished: false,
        }));
        let buffer_clone = Arc::clone(&buffer);
        let config = self.stream_config();

        let stream = self
            .output_device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let Ok(mut buf) = buffer_clone.lock() else {
                        return;
                    };
                    for sample in data.iter_mut() {
                        if buf.position < buf.samples.len() {
                            *sample = buf.samples[buf.position] as f32 / i16::MAX as f32;
                            buf.position += 1;
                        } else {
                            *sample = 0.0;
                            buf.finished = true;
                        }
                    }
                },
                |err| error!("audio output stream error: {err}"),
                None,
            )
            .map_err(|e| Error::Audio(format!("failed to build output stream: {e}")))?;

        stream
            .play()
            .map_err(|e| Error::Audio(format!("failed to start output stream: {e}")))?;

        loop {
            std::thread::sleep(std::time::Duration::from_millis(10));
            let finished = buffer
                .lock()
                .map_err(|_| Error::Audio("playback buffer lock poisoned".into()))?
                .finished;
            if finished {
                break;
            }
        }
        drop(stream);
        Ok(())
    }

    fn play_async(&mut self, pcm: Vec<i16>) -> Result<()> {
        self.stop.store(false, Ordering::SeqCst);
        self.playing.store(true, Ordering::SeqCst);

        let output_device = self.output_device.clone();
        let config = self.stream_config();
        let playing = Arc::clone(&self.playing);
        let stop = Arc::clone(&self.stop);

        let handle = std::thread::spawn(move || {
            let buffer = Arc::new(Mutex::new(PlaybackBuffer {
                samples: pcm,
                position: 0,
                finished: false,
            }));
            let buffer_clone = Arc::clone(&buffer);

            let stream = match output_device.build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let Ok(mut buf) = buffer_clone.lock() else {
                        return;
                    };
                    for sample in data.iter_mut() {
                        if buf.position < buf.samples.len() {
                            *sample = buf.samples[buf.position] as f32 / i16::MAX as f32;
                            buf.position += 1;
                        } else {
                            *sample = 0.0;
                            buf.finished = true;
                        }
                    }
                },
                |err| error!("audio output stream error: {err}"),
                None,
            ) {
                Ok(s) => s,
                Err(e) => {
                    error!("failed to build async output stream: {e}");
                    playing.store(false, Ordering::SeqCst);
                    return;
                }
            };

            if let Err(e) = stream.play() {
                error!("failed to start async output stream: {e}");
                playing.store(false, Ordering::SeqCst);
                return;
            }

            loop {
                if stop.load(Ordering::SeqCst) {
                    break;
                }
                let finished = buffer.lock().map(|b| b.finished).unwrap_or(true);
                if finished {
                    break;
                }
                std::thread::sleep(std::time::Duration::from_millis(10));
            }
            playing.store(false, Ordering::SeqCst);
        });

        self.playback_thread = Some(handle);
        Ok(())
    }

    fn play_streamed(&mut self, mut chunks: Box<dyn ChunkStream>) -> Result<()> {
        self.stop.store(false, Ordering::SeqCst);
        self.playing.store(true, Ordering::SeqCst);
        while !self.stop.load(Ordering::SeqCst) {
            match chunks.next_chunk() {
                Some(Ok(chunk)) => self.play(&chunk)?,
                Some(Err(e)) => {
                    self.playing.store(false, Ordering::SeqCst);
                    return Err(e);
                }
                None => break,
            }
        }
        chunks.close();
        self.playing.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    fn stop_playback(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    fn close(&mut self) {
        self.stop_playback();
        if let Some(handle) = self.playback_thread.take() {
            let _ = handle.join();
        }
        info!("audio port closed");
    }
}

impl Drop for CpalAudioPort {
    fn drop(&mut self) {
        self.close();
    }
}

struct PlaybackBuffer {
    samples: Vec<i16>,
    position: usize,
    finished: bool,
}

/// List available input device names.
///
/// # Errors
///
/// Returns an error if devices cannot be enumerated.
pub fn list_input_devices() -> Result<Vec<String>> {
    let host = cpal::default_host();
    let devices = host
        .input_devices()
        .map_err(|e| Error::Audio(format!("cannot enumerate devices: {e}")))?;
    Ok(devices.filter_map(|d| d.name().ok()).collect())
}

/// List available output device names.
///
/// # Errors
///
/// Returns an error if devices cannot be enumerated.
pub fn list_output_devices() -> Result<Vec<String>> {
    let host = cpal::default_host();
    let devices = host
        .output_devices()
        .map_err(|e| Error::Audio(format!("cannot enumerate devices: {e}")))?;
    Ok(devices.filter_map(|d| d.name().ok()).collect())
}
