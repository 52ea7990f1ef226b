//! End-to-end scenarios over the public API: wake → capture → route →
//! synthesize → play, run against the reference fixtures.

use std::collections::VecDeque;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use hearthvox::audio::{AudioPort, ChunkStream, VecChunkStream};
use hearthvox::config::RuntimeConfig;
use hearthvox::error::Result;
use hearthvox::features::default_registry;
use hearthvox::llm::{IntentType, ParsedIntent, ScriptedLlm};
use hearthvox::router::RoutingPath;
use hearthvox::stt::ScriptedStt;
use hearthvox::telemetry::TelemetryStore;
use hearthvox::tts::SilentTts;
use hearthvox::wake::EnergyWakeDetector;
use hearthvox::Orchestrator;

struct FixtureAudioPort {
    wake_chunks: Mutex<VecDeque<Vec<i16>>>,
    monitor_chunks: Mutex<VecDeque<Vec<i16>>>,
    fixed_record: Vec<i16>,
    still_playing: Mutex<u32>,
}

impl FixtureAudioPort {
    fn new(wake_chunks: Vec<Vec<i16>>, fixed_record: Vec<i16>) -> Self {
        Self {
            wake_chunks: Mutex::new(wake_chunks.into()),
            monitor_chunks: Mutex::new(VecDeque::new()),
            fixed_record,
            still_playing: Mutex::new(0),
        }
    }

    fn with_monitor_chunks(mut self, chunks: Vec<Vec<i16>>) -> Self {
        self.monitor_chunks = Mutex::new(chunks.into());
        self
    }
}

impl AudioPort for FixtureAudioPort {
    fn stream(&mut self, _chunk_ms: u32) -> Result<Box<dyn ChunkStream>> {
        let mut wake = self.wake_chunks.lock().expect("lock");
        if !wake.is_empty() {
            return Ok(Box::new(VecChunkStream::new(wake.drain(..).collect())));
        }
        let mut monitor = self.monitor_chunks.lock().expect("lock");
        *self.still_playing.lock().expect("lock") = monitor.len() as u32;
        Ok(Box::new(VecChunkStream::new(monitor.drain(..).collect())))
    }

    fn record(&mut self, _duration_s: u64) -> Result<Vec<i16>> {
        Ok(self.fixed_record.clone())
    }

    fn play(&mut self, _pcm: &[i16]) -> Result<()> {
        Ok(())
    }

    fn play_async(&mut self, _pcm: Vec<i16>) -> Result<()> {
        Ok(())
    }

    fn play_streamed(&mut self, mut chunks: Box<dyn ChunkStream>) -> Result<()> {
        while chunks.next_chunk().is_some() {}
        Ok(())
    }

    fn is_playing(&self) -> bool {
        let mut remaining = self.still_playing.lock().expect("lock");
        if *remaining == 0 {
            false
        } else {
            *remaining -= 1;
            true
        }
    }

    fn stop_playback(&self) {}

    fn close(&mut self) {}
}

fn llm_config() -> hearthvox::config::LlmConfig {
    hearthvox::config::LlmConfig {
        max_history: 20,
        history_ttl_s: 1800,
        intent_max_tokens: 256,
    }
}

fn loud_chunk() -> Vec<i16> {
    vec![20_000i16; 160]
}

fn quiet_chunk() -> Vec<i16> {
    vec![0i16; 160]
}

fn new_store() -> (Arc<TelemetryStore>, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(TelemetryStore::open(&dir.path().join("telemetry.db"), 64 * 1024 * 1024).expect("open store"));
    (store, dir)
}

#[test]
fn grocery_add_routes_through_structured_parse() {
    let (store, _dir) = new_store();
    let mut config = RuntimeConfig::default();
    config.vad.enabled = false;
    config.barge_in.enabled = false;
    config.voice.wake_feedback = false;

    let audio = Box::new(FixtureAudioPort::new(vec![loud_chunk()], vec![0i16; 1600]));
    let wake = Box::new(EnergyWakeDetector::new("ref-wake", 1.0, 1.0, 1));
    let stt = Box::new(ScriptedStt::new(vec!["add milk to the grocery list".to_owned()]));
    let tts = Box::new(SilentTts::new(16_000));

    let mut llm = ScriptedLlm::new("fixture", &llm_config());
    llm.script_parse(
        "add milk to the grocery list",
        ParsedIntent {
            kind: IntentType::Action,
            feature: Some("grocery_list".to_owned()),
            action: Some("add".to_owned()),
            parameters: Some(serde_json::json!({ "item": "milk" })),
            speech: "Adding milk.".to_owned(),
            expects_follow_up: false,
        },
    );

    let running = Arc::new(AtomicBool::new(true));
    let mut orchestrator = Orchestrator::new(&config, audio, wake, stt, tts, Box::new(llm), default_registry(), Arc::clone(&store), running);
    orchestrator.run_one_session().expect("session runs");

    let sessions = store.list_sessions(10, 0).expect("list");
    assert_eq!(sessions.len(), 1);
    let detail = store.session_detail(&sessions[0].id).expect("detail").expect("found");
    assert_eq!(detail.exchanges.len(), 1);
    assert_eq!(detail.exchanges[0].routing_path, Some(RoutingPath::LlmParse));
    assert_eq!(detail.exchanges[0].response_text.as_deref(), Some("Added milk to the grocery list. You now have 1 item."));
}

#[test]
fn misheard_command_is_recovered_via_classify_intent() {
    let (store, _dir) = new_store();
    let mut config = RuntimeConfig::default();
    config.vad.enabled = false;
    config.barge_in.enabled = false;
    config.voice.wake_feedback = false;

    let audio = Box::new(FixtureAudioPort::new(vec![loud_chunk()], vec![0i16; 1600]));
    let wake = Box::new(EnergyWakeDetector::new("ref-wake", 1.0, 1.0, 1));
    let stt = Box::new(ScriptedStt::new(vec!["what is on the gross free list".to_owned()]));
    let tts = Box::new(SilentTts::new(16_000));

    let mut llm = ScriptedLlm::new("fixture", &llm_config());
    llm.script_classify("what is on the gross free list", "what is on the grocery list");

    let running = Arc::new(AtomicBool::new(true));
    let mut orchestrator = Orchestrator::new(&config, audio, wake, stt, tts, Box::new(llm), default_registry(), Arc::clone(&store), running);
    orchestrator.run_one_session().expect("session runs");

    let sessions = store.list_sessions(10, 0).expect("list");
    let detail = store.session_detail(&sessions[0].id).expect("detail").expect("found");
    assert_eq!(detail.exchanges[0].routing_path, Some(RoutingPath::Recovery));
    assert_eq!(detail.exchanges[0].response_text.as_deref(), Some("The grocery list is empty."));
}

#[test]
fn media_disambiguation_continues_as_a_follow_up() {
    let (store, _dir) = new_store();
    let mut config = RuntimeConfig::default();
    config.vad.enabled = false;
    config.barge_in.enabled = false;
    config.voice.wake_feedback = false;

    let audio = Box::new(FixtureAudioPort::new(vec![loud_chunk()], vec![0i16; 1600]));
    let wake = Box::new(EnergyWakeDetector::new("ref-wake", 1.0, 1.0, 1));
    let stt = Box::new(ScriptedStt::new(vec!["track batman".to_owned(), "yes".to_owned()]));
    let tts = Box::new(SilentTts::new(16_000));
    let llm = ScriptedLlm::new("fixture", &llm_config());

    let running = Arc::new(AtomicBool::new(true));
    let mut orchestrator = Orchestrator::new(&config, audio, wake, stt, tts, Box::new(llm), default_registry(), Arc::clone(&store), running);
    orchestrator.run_one_session().expect("session runs");

    let sessions = store.list_sessions(10, 0).expect("list");
    let detail = store.session_detail(&sessions[0].id).expect("detail").expect("found");
    assert_eq!(detail.exchanges.len(), 2);
    assert!(detail.exchanges[0].is_follow_up.eq(&false));
    assert!(detail.exchanges[1].is_follow_up);
    assert_eq!(detail.exchanges[1].response_text.as_deref(), Some("Done! I've added Batman (1989) to your movies."));
}

#[test]
fn barge_in_interrupts_playback_and_starts_a_new_capture() {
    let (store, _dir) = new_store();
    let mut config = RuntimeConfig::default();
    config.vad.enabled = false;
    config.barge_in.enabled = true;
    config.barge_in.debounce_chunks = 0;
    config.voice.wake_feedback = false;

    // Two exchanges: the first's playback is "interrupted" (monitor
    // stream yields one loud chunk for the barge-in detector to catch),
    // the second ends normally.
    let audio = Box::new(FixtureAudioPort::new(vec![loud_chunk()], vec![0i16; 1600]).with_monitor_chunks(vec![loud_chunk()]));
    let wake = Box::new(EnergyWakeDetector::new("ref-wake", 1.0, 1.0, 1));
    let stt = Box::new(ScriptedStt::new(vec!["what is on the grocery list".to_owned(), "what is on the grocery list".to_owned()]));
    let tts = Box::new(SilentTts::new(16_000));
    let llm = ScriptedLlm::new("fixture", &llm_config());

    let running = Arc::new(AtomicBool::new(true));
    let mut orchestrator = Orchestrator::new(&config, audio, wake, stt, tts, Box::new(llm), default_registry(), Arc::clone(&store), running);
    orchestrator.run_one_session().expect("session runs");

    let sessions = store.list_sessions(10, 0).expect("list");
    let detail = store.session_detail(&sessions[0].id).expect("detail").expect("found");
    assert_eq!(detail.exchanges.len(), 2);
    assert!(detail.exchanges[0].had_bargein);
    assert!(!detail.exchanges[1].had_bargein);
}

#[test]
fn empty_transcription_returns_to_listening_without_recording_an_exchange() {
    let (store, _dir) = new_store();
    let mut config = RuntimeConfig::default();
    config.vad.enabled = false;
    config.barge_in.enabled = false;

    let audio = Box::new(FixtureAudioPort::new(vec![loud_chunk()], vec![0i16; 1600]));
    let wake = Box::new(EnergyWakeDetector::new("ref-wake", 1.0, 1.0, 1));
    let stt = Box::new(ScriptedStt::new(vec!["   ".to_owned()]));
    let tts = Box::new(SilentTts::new(16_000));
    let llm = ScriptedLlm::new("fixture", &llm_config());

    let running = Arc::new(AtomicBool::new(true));
    let mut orchestrator = Orchestrator::new(&config, audio, wake, stt, tts, Box::new(llm), default_registry(), Arc::clone(&store), running);
    orchestrator.run_one_session().expect("session runs");

    let sessions = store.list_sessions(10, 0).expect("list");
    assert_eq!(sessions.len(), 1);
    let detail = store.session_detail(&sessions[0].id).expect("detail").expect("found");
    assert!(detail.exchanges.is_empty());
}

#[test]
fn no_wake_word_detected_persists_no_session() {
    let (store, _dir) = new_store();
    let mut config = RuntimeConfig::default();
    config.vad.enabled = false;

    let audio = Box::new(FixtureAudioPort::new(vec![quiet_chunk()], Vec::new()));
    let wake = Box::new(EnergyWakeDetector::new("ref-wake", 1.0, 1.0, 1));
    let stt = Box::new(ScriptedStt::new(Vec::new()));
    let tts = Box::new(SilentTts::new(16_000));
    let llm = ScriptedLlm::new("fixture", &llm_config());

    let running = Arc::new(AtomicBool::new(true));
    let mut orchestrator = Orchestrator::new(&config, audio, wake, stt, tts, Box::new(llm), default_registry(), Arc::clone(&store), running);
    orchestrator.run_one_session().expect("session runs");

    assert!(store.list_sessions(10, 0).expect("list").is_empty());
}
