//! Voice pipeline orchestrator (C8): the central
//! LISTENING → CAPTURING → TRANSCRIBING → ROUTING → SYNTHESIZING →
//! PLAYING state machine, plus barge-in monitoring, follow-up
//! continuation, phase timing, and bounded-retry error recovery.
//!
//! Grounded in the teacher's `PipelineCoordinator`: a builder-style
//! constructor (`new` + `with_*`), a shared `Arc<AtomicBool>` signal
//! consulted between stages in place of the teacher's
//! `CancellationToken`, and a single `run` entry point. The teacher's
//! pipeline is async end-to-end; this one runs entirely on blocking
//! calls on one OS thread, per the synchronous core.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::audio::AudioPort;
use crate::config::{AudioConfig, BargeInConfig, RuntimeConfig, VoiceConfig};
use crate::error::Result;
use crate::feature::FeatureRegistry;
use crate::llm::Llm;
use crate::prompt_cache::PromptCache;
use crate::router::IntentRouter;
use crate::stt::Stt;
use crate::telemetry::{Exchange, LlmCallRecord, Session, TelemetryStore};
use crate::tts::Tts;
use crate::vad::VadRecorder;
use crate::wake::WakeDetector;

/// Whether the orchestrator should capture another exchange within the
/// same session, or return to the listening state.
enum Continuation {
    End,
    Continue,
}

/// Orchestrates one wake-to-listening cycle at a time, persisting each
/// completed session to telemetry.
pub struct Orchestrator {
    audio: Box<dyn AudioPort>,
    wake: Box<dyn WakeDetector>,
    vad: VadRecorder,
    vad_enabled: bool,
    stt: Box<dyn Stt>,
    tts: Box<dyn Tts>,
    llm: Box<dyn Llm>,
    features: FeatureRegistry,
    router: IntentRouter,
    store: Arc<TelemetryStore>,
    prompt_cache: Option<PromptCache>,
    audio_cfg: AudioConfig,
    voice_cfg: VoiceConfig,
    barge_in_cfg: BargeInConfig,
    wake_model: String,
    running: Arc<AtomicBool>,
}

impl Orchestrator {
    /// Build an orchestrator from its adapters, registry, router,
    /// telemetry store, and the shared shutdown signal.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: &RuntimeConfig,
        audio: Box<dyn AudioPort>,
        wake: Box<dyn WakeDetector>,
        stt: Box<dyn Stt>,
        tts: Box<dyn Tts>,
        llm: Box<dyn Llm>,
        features: FeatureRegistry,
        store: Arc<TelemetryStore>,
        running: Arc<AtomicBool>,
    ) -> Self {
        Self {
            audio,
            wake,
            vad: VadRecorder::new(&config.vad),
            vad_enabled: config.vad.enabled,
            stt,
            tts,
            llm,
            features,
            router: IntentRouter::new(config.intent.clone()),
            store,
            prompt_cache: None,
            audio_cfg: config.audio.clone(),
            voice_cfg: config.voice.clone(),
            barge_in_cfg: config.barge_in.clone(),
            wake_model: config.wake.model.clone(),
            running,
        }
    }

    /// Attach a prompt cache for wake/follow-up acknowledgement clips.
    pub fn with_prompt_cache(mut self, cache: PromptCache) -> Self {
        self.prompt_cache = Some(cache);
        self
    }

    /// Run wake-to-listening cycles until the shared `running` signal is
    /// cleared. Bounded retry: consecutive session failures back off
    /// `min(2^n, 30)s`; after `voice.max_consecutive_errors` in a row,
    /// logs and returns.
    pub fn run(&mut self) -> Result<()> {
        let mut consecutive_errors: u32 = 0;
        while self.running.load(Ordering::SeqCst) {
            match self.run_one_session() {
                Ok(()) => consecutive_errors = 0,
                Err(e) => {
                    error!("pipeline session ended with error: {e}");
                    consecutive_errors += 1;
                    if consecutive_errors >= self.voice_cfg.max_consecutive_errors {
                        error!("giving up after {consecutive_errors} consecutive errors");
                        break;
                    }
                    let backoff_s = 2u64.saturating_pow(consecutive_errors).min(30);
                    std::thread::sleep(Duration::from_secs(backoff_s));
                }
            }
        }
        self.close();
        Ok(())
    }

    /// Release adapter resources. Idempotent.
    pub fn close(&mut self) {
        self.router.close(&mut self.features, self.llm.as_mut());
        self.audio.close();
    }

    /// Run exactly one wake-to-listening cycle: block until the wake word
    /// fires (or `running` is cleared), then drive exchanges until the
    /// session ends, persisting it to telemetry. Returns immediately with
    /// `Ok(())` if `running` was already cleared before any wake chunk
    /// arrived. Exposed publicly for single-session integration tests and
    /// tools that want one cycle without the retry/backoff loop in `run`.
    pub fn run_one_session(&mut self) -> Result<()> {
        if !self.wait_for_wake()? {
            return Ok(());
        }

        let mut session = Session::new(self.wake_model.clone());
        info!("wake detected, session {} started", session.id);

        if self.voice_cfg.wake_feedback {
            self.play_ack_clip();
        }

        let mut follow_ups: u32 = 0;
        loop {
            if !self.running.load(Ordering::SeqCst) {
                break;
            }

            if follow_ups > 0 && self.voice_cfg.wake_feedback && self.features.active_context().is_none() {
                self.play_ack_clip();
            }

            match self.run_exchange(&mut session) {
                Ok(Continuation::End) => break,
                Ok(Continuation::Continue) => {
                    follow_ups += 1;
                    if follow_ups > self.voice_cfg.max_follow_ups {
                        warn!("follow-up cap of {} reached, ending session", self.voice_cfg.max_follow_ups);
                        break;
                    }
                }
                Err(e) => {
                    session.finish();
                    self.save_session(&session);
                    return Err(e);
                }
            }
        }

        session.finish();
        self.save_session(&session);
        Ok(())
    }

    /// Listen until the wake word fires or `running` is cleared.
    fn wait_for_wake(&mut self) -> Result<bool> {
        let mut stream = self.audio.stream(self.audio_cfg.chunk_ms)?;
        let mut detected = false;

        while self.running.load(Ordering::SeqCst) {
            match stream.next_chunk() {
                Some(Ok(chunk)) => {
                    if self.wake.detect(&chunk)? {
                        detected = true;
                        break;
                    }
                }
                Some(Err(e)) => {
                    stream.close();
                    return Err(e);
                }
                None => break,
            }
        }

        stream.close();
        if detected {
            self.wake.reset();
        }
        Ok(detected)
    }

    fn run_exchange(&mut self, session: &mut Session) -> Result<Continuation> {
        let idx = session.exchange_count();
        let is_follow_up = idx > 0;
        session.create_exchange(is_follow_up);

        match self.drive_exchange(session, idx) {
            Ok(continuation) => Ok(continuation),
            Err(e) => {
                if let Some(exchange) = session.exchanges.get_mut(idx) {
                    exchange.error = Some(e.to_string());
                }
                Err(e)
            }
        }
    }

    fn drive_exchange(&mut self, session: &mut Session, idx: usize) -> Result<Continuation> {
        session.exchanges[idx].start_phase("recording");
        let pcm_result = self.capture(&mut session.exchanges[idx]);
        session.exchanges[idx].end_phase("recording");
        let pcm = pcm_result?;

        session.exchanges[idx].start_phase("stt");
        let text_result = self.stt.transcribe(&pcm);
        session.exchanges[idx].end_phase("stt");
        let text = text_result?;

        if text.trim().is_empty() {
            info!("empty transcription, discarding exchange and returning to listening");
            session.exchanges.remove(idx);
            return Ok(Continuation::End);
        }
        session.exchanges[idx].transcription = Some(text.clone());

        session.exchanges[idx].start_phase("routing");
        let response = self.router.route(&text, &mut self.features, self.llm.as_mut());
        session.exchanges[idx].end_phase("routing");

        session.exchanges[idx].response_text = Some(response.clone());
        if let Some(info) = self.router.last_route_info() {
            session.exchanges[idx].routing_path = Some(info.path);
            session.exchanges[idx].matched_feature = info.matched_feature.clone();
            session.exchanges[idx].feature_action = info.feature_action.clone();
        }
        session.exchanges[idx].llm_calls = self.router.last_llm_calls().iter().cloned().map(LlmCallRecord::from).collect();

        session.exchanges[idx].start_phase("tts");
        let pcm_result = self.tts.synthesize(&response);
        session.exchanges[idx].end_phase("tts");
        let pcm_response = pcm_result?;

        session.exchanges[idx].start_phase("playback");
        let bargein_result = self.play_with_bargein_monitor(pcm_response);
        session.exchanges[idx].end_phase("playback");
        let had_bargein = bargein_result?;
        session.exchanges[idx].had_bargein = had_bargein;

        if had_bargein || self.router.expects_follow_up() {
            Ok(Continuation::Continue)
        } else {
            Ok(Continuation::End)
        }
    }

    fn capture(&mut self, exchange: &mut Exchange) -> Result<Vec<i16>> {
        if self.vad_enabled {
            let mut stream = self.audio.stream(self.audio_cfg.chunk_ms)?;
            let pcm = self.vad.record_until_silence(stream.as_mut(), self.audio_cfg.chunk_ms);
            exchange.used_vad = true;
            pcm
        } else {
            self.audio.record(self.voice_cfg.record_duration_s)
        }
    }

    /// Play `pcm`, monitoring the microphone for a barge-in wake once
    /// `barge_in.debounce_chunks` have elapsed since playback started.
    /// Returns whether a barge-in occurred.
    ///
    /// Uses `play_async` rather than `play_streamed` for the actual
    /// playback: `play_async` returns immediately (its concrete adapter
    /// runs the device write on its own thread), leaving `self.audio`
    /// free for a second `stream()` call to read the microphone
    /// concurrently. `play_streamed` blocks its caller until exhausted
    /// and so cannot be interleaved with a second borrow of the same
    /// port for monitoring.
    fn play_with_bargein_monitor(&mut self, pcm: Vec<i16>) -> Result<bool> {
        if !self.barge_in_cfg.enabled {
            self.audio.play(&pcm)?;
            return Ok(false);
        }

        self.audio.play_async(pcm)?;
        self.wake.reset();

        let mut monitor = self.audio.stream(self.audio_cfg.chunk_ms)?;
        let mut chunks_seen: u32 = 0;
        let mut had_bargein = false;

        while self.audio.is_playing() {
            if !self.running.load(Ordering::SeqCst) {
                break;
            }
            match monitor.next_chunk() {
                Some(Ok(chunk)) => {
                    chunks_seen += 1;
                    if chunks_seen <= self.barge_in_cfg.debounce_chunks {
                        continue;
                    }
                    if self.wake.detect(&chunk)? {
                        self.audio.stop_playback();
                        self.wake.reset();
                        had_bargein = true;
                        break;
                    }
                }
                Some(Err(e)) => {
                    warn!("barge-in monitor stream error: {e}");
                    break;
                }
                None => break,
            }
        }

        monitor.close();
        Ok(had_bargein)
    }

    fn play_ack_clip(&mut self) {
        let Some(cache) = &self.prompt_cache else {
            return;
        };
        let clip = cache.pick();
        if let Err(e) = self.audio.play(&clip) {
            warn!("failed to play wake acknowledgement: {e}");
        }
    }

    fn save_session(&self, session: &Session) {
        if let Err(e) = self.store.save_session(session) {
            warn!("failed to persist session {}: {e}", session.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{ChunkStream, VecChunkStream};
    use crate::config::LlmConfig;
    use crate::features::default_registry;
    use crate::llm::ScriptedLlm;
    use crate::stt::ScriptedStt;
    use crate::tts::SilentTts;
    use crate::wake::EnergyWakeDetector;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct FixtureAudioPort {
        wake_chunks: Mutex<VecDeque<Vec<i16>>>,
        monitor_chunks: Mutex<VecDeque<Vec<i16>>>,
        fixed_record: Vec<i16>,
        played: Mutex<Vec<Vec<i16>>>,
    }

    impl FixtureAudioPort {
        fn new(wake_chunks: Vec<Vec<i16>>, fixed_record: Vec<i16>) -> Self {
            Self {
                wake_chunks: Mutex::new(wake_chunks.into()),
                monitor_chunks: Mutex::new(VecDeque::new()),
                fixed_record,
                played: Mutex::new(Vec::new()),
            }
        }
    }

    impl AudioPort for FixtureAudioPort {
        fn stream(&mut self, _chunk_ms: u32) -> Result<Box<dyn ChunkStream>> {
            let mut wake = self.wake_chunks.lock().expect("lock");
            if !wake.is_empty() {
                return Ok(Box::new(VecChunkStream::new(wake.drain(..).collect())));
            }
            let mut monitor = self.monitor_chunks.lock().expect("lock");
            Ok(Box::new(VecChunkStream::new(monitor.drain(..).collect())))
        }

        fn record(&mut self, _duration_s: u64) -> Result<Vec<i16>> {
            Ok(self.fixed_record.clone())
        }

        fn play(&mut self, pcm: &[i16]) -> Result<()> {
            self.played.lock().expect("lock").push(pcm.to_vec());
            Ok(())
        }

        fn play_async(&mut self, pcm: Vec<i16>) -> Result<()> {
            self.played.lock().expect("lock").push(pcm);
            Ok(())
        }

        fn play_streamed(&mut self, mut chunks: Box<dyn ChunkStream>) -> Result<()> {
            while let Some(Ok(chunk)) = chunks.next_chunk() {
                self.played.lock().expect("lock").push(chunk);
            }
            Ok(())
        }

        fn is_playing(&self) -> bool {
            false
        }

        fn stop_playback(&self) {}

        fn close(&mut self) {}
    }

    fn llm_config() -> LlmConfig {
        LlmConfig {
            max_history: 20,
            history_ttl_s: 1800,
            intent_max_tokens: 256,
        }
    }

    fn test_orchestrator(transcripts: Vec<String>) -> (Orchestrator, Arc<TelemetryStore>, std::path::PathBuf, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        let db_path = dir.path().join("telemetry.db");
        let store = Arc::new(TelemetryStore::open(&db_path, 64 * 1024 * 1024).expect("open store"));

        let mut config = RuntimeConfig::default();
        config.vad.enabled = false;
        config.barge_in.enabled = false;
        config.voice.wake_feedback = false;

        let audio = Box::new(FixtureAudioPort::new(vec![vec![20_000i16; 160]], vec![0i16; 1600]));
        let wake = Box::new(EnergyWakeDetector::new("test-wake", 1.0, 1.0, 1));
        let stt = Box::new(ScriptedStt::new(transcripts));
        let tts = Box::new(SilentTts::new(16_000));
        let llm = Box::new(ScriptedLlm::new("fixture", &llm_config()));
        let running = Arc::new(AtomicBool::new(true));

        let orchestrator = Orchestrator::new(&config, audio, wake, stt, tts, llm, default_registry(), Arc::clone(&store), running);
        (orchestrator, store, db_path, dir)
    }

    #[test]
    fn single_exchange_session_is_persisted_with_matched_feature() {
        let (mut orchestrator, store, _path, _dir) = test_orchestrator(vec!["add milk to the grocery list".to_owned()]);
        orchestrator.run_one_session().expect("session");

        let sessions = store.list_sessions(10, 0).expect("list");
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].features_used, vec!["grocery_list".to_owned()]);

        let detail = store.session_detail(&sessions[0].id).expect("detail").expect("found");
        assert_eq!(detail.exchanges.len(), 1);
        assert_eq!(detail.exchanges[0].transcription.as_deref(), Some("add milk to the grocery list"));
        assert!(detail.exchanges[0].response_text.as_deref().unwrap().contains("Added milk"));
    }

    #[test]
    fn empty_transcription_discards_the_exchange() {
        let (mut orchestrator, store, _path, _dir) = test_orchestrator(vec!["   ".to_owned()]);
        orchestrator.run_one_session().expect("session");

        let sessions = store.list_sessions(10, 0).expect("list");
        assert_eq!(sessions.len(), 1);
        let detail = store.session_detail(&sessions[0].id).expect("detail").expect("found");
        assert!(detail.exchanges.is_empty());
    }

    #[test]
    fn no_wake_detected_when_shut_down_before_any_chunk_arrives() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db_path = dir.path().join("telemetry.db");
        let store = Arc::new(TelemetryStore::open(&db_path, 64 * 1024 * 1024).expect("open store"));
        let mut config = RuntimeConfig::default();
        config.vad.enabled = false;

        let audio = Box::new(FixtureAudioPort::new(vec![], vec![]));
        let wake = Box::new(EnergyWakeDetector::new("test-wake", 1.0, 1.0, 1));
        let stt = Box::new(ScriptedStt::new(vec![]));
        let tts = Box::new(SilentTts::new(16_000));
        let llm = Box::new(ScriptedLlm::new("fixture", &llm_config()));
        let running = Arc::new(AtomicBool::new(true));

        let mut orchestrator = Orchestrator::new(&config, audio, wake, stt, tts, llm, default_registry(), Arc::clone(&store), running);
        orchestrator.run_one_session().expect("session");

        assert!(store.list_sessions(10, 0).expect("list").is_empty());
    }
}
