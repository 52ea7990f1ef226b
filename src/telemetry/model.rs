//! Telemetry data model: Session / Exchange / LLMCall, with per-phase
//! timing. Grounded in the prior implementation's dataclass model (same
//! phase set and started_at/ended_at/duration_ms bookkeeping), expressed
//! as owned Rust structs rather than dataclasses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::llm::{CallType, LastCallInfo};
use crate::router::RoutingPath;

/// Pipeline phases timed on every exchange, in the order they occur.
pub const PHASE_NAMES: [&str; 5] = ["recording", "stt", "routing", "tts", "playback"];

/// Start/end timestamps and duration for one pipeline phase.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PhaseTiming {
    /// When the phase began.
    pub started_at: Option<DateTime<Utc>>,
    /// When the phase ended, set even if the phase was aborted.
    pub ended_at: Option<DateTime<Utc>>,
    /// `ended_at - started_at` in milliseconds, when both are set.
    pub duration_ms: Option<i64>,
}

impl PhaseTiming {
    fn start(&mut self) {
        self.started_at = Some(Utc::now());
    }

    fn end(&mut self) {
        let ended = Utc::now();
        self.ended_at = Some(ended);
        if let Some(started) = self.started_at {
            self.duration_ms = Some((ended - started).num_milliseconds().max(0));
        }
    }
}

/// Metadata for a single LLM call, owned by exactly one [`Exchange`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmCallRecord {
    /// Which operation this call performed.
    pub call_type: CallType,
    /// Wall-clock call duration in milliseconds.
    pub duration_ms: u64,
    /// Model identifier used.
    pub model: String,
    /// System prompt sent, if any.
    pub system_prompt: Option<String>,
    /// User message sent.
    pub user_message: String,
    /// Raw response text, if the call succeeded.
    pub response_text: Option<String>,
    /// Input token count, if reported by the backend.
    pub input_tokens: Option<u32>,
    /// Output token count, if reported by the backend.
    pub output_tokens: Option<u32>,
    /// Model-reported stop reason.
    pub stop_reason: Option<String>,
    /// Error message, set when the call failed.
    pub error: Option<String>,
}

impl From<LastCallInfo> for LlmCallRecord {
    fn from(info: LastCallInfo) -> Self {
        Self {
            call_type: info.call_type.unwrap_or(CallType::Respond),
            duration_ms: info.duration_ms,
            model: info.model,
            system_prompt: info.system_prompt,
            user_message: info.user_message,
            response_text: info.response_text,
            input_tokens: info.input_tokens,
            output_tokens: info.output_tokens,
            stop_reason: info.stop_reason,
            error: info.error,
        }
    }
}

/// One command/response cycle within a [`Session`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Exchange {
    /// Unique identifier.
    pub id: Uuid,
    /// Owning session identifier.
    pub session_id: Uuid,
    /// 0-based position within the session.
    pub sequence: u32,
    /// Whether this exchange continued a prior flow without a new wake.
    pub is_follow_up: bool,
    /// Per-phase timing, keyed by [`PHASE_NAMES`].
    pub recording: PhaseTiming,
    /// STT phase timing.
    pub stt: PhaseTiming,
    /// Routing phase timing.
    pub routing: PhaseTiming,
    /// TTS phase timing.
    pub tts: PhaseTiming,
    /// Playback phase timing.
    pub playback: PhaseTiming,
    /// Transcribed text.
    pub transcription: Option<String>,
    /// Which routing stage produced the response.
    pub routing_path: Option<RoutingPath>,
    /// Feature that handled the action, if any.
    pub matched_feature: Option<String>,
    /// Structured action name, if any.
    pub feature_action: Option<String>,
    /// The spoken response text.
    pub response_text: Option<String>,
    /// Whether C3 (VAD) drove capture for this exchange.
    pub used_vad: bool,
    /// Whether barge-in interrupted playback during this exchange.
    pub had_bargein: bool,
    /// Error message, if this exchange failed.
    pub error: Option<String>,
    /// LLM calls made while routing this exchange.
    pub llm_calls: Vec<LlmCallRecord>,
}

impl Exchange {
    /// Start a new exchange within `session_id` at `sequence`.
    pub fn new(session_id: Uuid, sequence: u32, is_follow_up: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            sequence,
            is_follow_up,
            recording: PhaseTiming::default(),
            stt: PhaseTiming::default(),
            routing: PhaseTiming::default(),
            tts: PhaseTiming::default(),
            playback: PhaseTiming::default(),
            transcription: None,
            routing_path: None,
            matched_feature: None,
            feature_action: None,
            response_text: None,
            used_vad: false,
            had_bargein: false,
            error: None,
            llm_calls: Vec::new(),
        }
    }

    /// Record the start of `phase`.
    pub fn start_phase(&mut self, phase: &str) {
        self.phase_mut(phase).start();
    }

    /// Record the end of `phase` and compute its duration.
    pub fn end_phase(&mut self, phase: &str) {
        self.phase_mut(phase).end();
    }

    fn phase_mut(&mut self, phase: &str) -> &mut PhaseTiming {
        match phase {
            "recording" => &mut self.recording,
            "stt" => &mut self.stt,
            "routing" => &mut self.routing,
            "tts" => &mut self.tts,
            "playback" => &mut self.playback,
            other => panic!("unknown pipeline phase: {other}"),
        }
    }
}

/// A voice interaction session, spanning from wake detection until the
/// loop returns to listening without a follow-up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Unique identifier.
    pub id: Uuid,
    /// When the session started (wake detected).
    pub started_at: DateTime<Utc>,
    /// When the session ended, set by [`Session::finish`].
    pub ended_at: Option<DateTime<Utc>>,
    /// Identifier of the wake model active for this session.
    pub wake_model: String,
    /// Exchanges in sequence order.
    pub exchanges: Vec<Exchange>,
}

impl Session {
    /// Start a new session for `wake_model`.
    pub fn new(wake_model: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            ended_at: None,
            wake_model: wake_model.into(),
            exchanges: Vec::new(),
        }
    }

    /// Number of exchanges recorded so far.
    pub fn exchange_count(&self) -> usize {
        self.exchanges.len()
    }

    /// Create and append a new exchange.
    pub fn create_exchange(&mut self, is_follow_up: bool) -> &mut Exchange {
        let sequence = self.exchanges.len() as u32;
        self.exchanges.push(Exchange::new(self.id, sequence, is_follow_up));
        self.exchanges.last_mut().expect("just pushed")
    }

    /// Mark the session as ended.
    pub fn finish(&mut self) {
        self.ended_at = Some(Utc::now());
    }
}
