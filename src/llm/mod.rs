//! LLM Port (C5): structured intent parsing, misheard-command recovery,
//! and conversational fallback, each a constrained use of an underlying
//! model. History retention combines a max-entry ring buffer with
//! TTL-based lazy expiry, mirroring the two-rule contract independently
//! grounded in the teacher's ring-buffer eviction and the prior
//! implementation's monotonic-clock TTL expiry.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;
use crate::error::Result;

/// Sentinel returned by `classify_intent` meaning "this is a genuine
/// non-feature query, not a misheard command".
pub const NO_CORRECTION: &str = "none-marker";

/// Which LLM operation produced a [`LastCallInfo`], recorded in telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallType {
    /// `parse_intent`.
    ParseIntent,
    /// `classify_intent`.
    ClassifyIntent,
    /// `respond`.
    Respond,
}

/// Coarse classification of a parsed utterance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentType {
    /// A feature action with parameters.
    Action,
    /// Plain conversation, no feature involved.
    Conversation,
    /// The model needs more information before it can act.
    Clarification,
}

/// Structured result of `parse_intent`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedIntent {
    /// Coarse classification.
    #[serde(rename = "type")]
    pub kind: IntentType,
    /// Feature name, present when `kind` is `Action`.
    pub feature: Option<String>,
    /// Action name within the feature.
    pub action: Option<String>,
    /// Action parameters as a JSON object.
    pub parameters: Option<serde_json::Value>,
    /// What to speak back to the user.
    pub speech: String,
    /// Whether the feature expects a follow-up utterance without a new wake.
    pub expects_follow_up: bool,
}

/// Ephemeral per-call record the router harvests after each LLM call and
/// attaches to the current exchange for telemetry.
#[derive(Debug, Clone, Default)]
pub struct LastCallInfo {
    /// Which operation produced this record.
    pub call_type: Option<CallType>,
    /// Wall-clock call duration in milliseconds.
    pub duration_ms: u64,
    /// Model identifier used for the call.
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

/// Three constrained LLM operations plus history bookkeeping. Concrete
/// model/provider integration is out of scope; [`ScriptedLlm`] is a
/// deterministic fixture that satisfies the contract for exercising the
/// router and orchestrator.
pub trait Llm: Send {
    /// Conversational fallback. Takes history into account, records the
    /// exchange into history on success, and returns a safe apology
    /// string on failure (never propagates an error to the caller).
    fn respond(&mut self, text: &str) -> String;

    /// Primary intent path. `feature_schemas` lists every feature with a
    /// non-empty action schema; `context` is optional multi-turn state
    /// from `get_llm_context()`, prepended to the user message with a
    /// recognizable sentinel. Must not mutate history. Returns `None` on
    /// API error or an absent structured result, and sets `last_call_info`
    /// accordingly.
    fn parse_intent(
        &mut self,
        text: &str,
        feature_schemas: &[serde_json::Value],
        context: Option<&str>,
    ) -> Option<ParsedIntent>;

    /// Stateless misheard-command corrector. Returns the corrected text,
    /// or [`NO_CORRECTION`] meaning "genuine non-feature query". Must not
    /// read or update history.
    fn classify_intent(&mut self, text: &str, feature_descriptions: &[String]) -> Option<String>;

    /// Commit a user/assistant pair to history after a successful route.
    fn record_exchange(&mut self, user: &str, assistant: &str);

    /// The most recent call's telemetry record.
    fn last_call_info(&self) -> LastCallInfo;

    /// Clear all conversation history.
    fn clear_history(&mut self);
}

struct HistoryEntry {
    user: String,
    assistant: String,
    recorded_at: Instant,
}

/// Ring-buffer-plus-TTL conversation history shared by `Llm` implementors.
struct History {
    entries: VecDeque<HistoryEntry>,
    max_entries: usize,
    ttl: Option<Duration>,
}

impl History {
    fn new(max_entries: usize, ttl_s: i64) -> Self {
        Self {
            entries: VecDeque::with_capacity(max_entries),
            max_entries,
            ttl: (ttl_s > 0).then(|| Duration::from_secs(ttl_s as u64)),
        }
    }

    fn expire(&mut self) {
        let Some(ttl) = self.ttl else { return };
        let now = Instant::now();
        self.entries
            .retain(|e| now.saturating_duration_since(e.recorded_at) <= ttl);
    }

    fn record(&mut self, user: &str, assistant: &str) {
        self.expire();
        self.entries.push_back(HistoryEntry {
            user: user.to_owned(),
            assistant: assistant.to_owned(),
            recorded_at: Instant::now(),
        });
        while self.entries.len() > self.max_entries {
            self.entries.pop_front();
        }
    }

    fn pairs(&mut self) -> Vec<(String, String)> {
        self.expire();
        self.entries
            .iter()
            .map(|e| (e.user.clone(), e.assistant.clone()))
            .collect()
    }

    fn clear(&mut self) {
        self.entries.clear();
    }

    fn len(&mut self) -> usize {
        self.expire();
        self.entries.len()
    }
}

/// Sentinel prefix used to inject feature-supplied multi-turn context
/// ahead of the user's message in a `parse_intent` call.
const CONTEXT_SENTINEL: &str = "[[active-context]]";

/// A deterministic, table-driven LLM fixture. Matches `parse_intent`
/// inputs against a configured table of exact-text responses; everything
/// else falls through to `None`/`NO_CORRECTION`/a canned apology. Exists
/// to exercise the router's contract without a real model provider.
pub struct ScriptedLlm {
    model: String,
    history: History,
    last_call: LastCallInfo,
    parse_table: Vec<(String, ParsedIntent)>,
    classify_table: Vec<(String, String)>,
    respond_table: Vec<(String, String)>,
}

impl ScriptedLlm {
    /// Build a fixture with empty response tables and history sized per
    /// `config`.
    pub fn new(model: impl Into<String>, config: &LlmConfig) -> Self {
        Self {
            model: model.into(),
            history: History::new(config.max_history, config.history_ttl_s),
            last_call: LastCallInfo::default(),
            parse_table: Vec::new(),
            classify_table: Vec::new(),
            respond_table: Vec::new(),
        }
    }

    /// Register a scripted `parse_intent` response for an exact input.
    pub fn script_parse(&mut self, input: impl Into<String>, result: ParsedIntent) {
        self.parse_table.push((input.into(), result));
    }

    /// Register a scripted `classify_intent` correction for an exact input.
    pub fn script_classify(&mut self, input: impl Into<String>, corrected: impl Into<String>) {
        self.classify_table.push((input.into(), corrected.into()));
    }

    /// Register a scripted `respond` reply for an exact input.
    pub fn script_respond(&mut self, input: impl Into<String>, reply: impl Into<String>) {
        self.respond_table.push((input.into(), reply.into()));
    }

    fn record_call(&mut self, call_type: CallType, user_message: &str, response: Option<&str>, error: Option<&str>) {
        self.last_call = LastCallInfo {
            call_type: Some(call_type),
            duration_ms: 0,
            model: self.model.clone(),
            system_prompt: None,
            user_message: user_message.to_owned(),
            response_text: response.map(str::to_owned),
            input_tokens: None,
            output_tokens: None,
            stop_reason: Some("stop".to_owned()),
            error: error.map(str::to_owned),
        };
    }
}

impl Llm for ScriptedLlm {
    fn respond(&mut self, text: &str) -> String {
        let reply = self
            .respond_table
            .iter()
            .find(|(input, _)| input == text)
            .map(|(_, reply)| reply.clone());

        match reply {
            Some(reply) => {
                self.record_call(CallType::Respond, text, Some(&reply), None);
                self.history.record(text, &reply);
                reply
            }
            None => {
                self.record_call(CallType::Respond, text, None, Some("no scripted response"));
                "Sorry, I didn't catch that.".to_owned()
            }
        }
    }

    fn parse_intent(
        &mut self,
        text: &str,
        _feature_schemas: &[serde_json::Value],
        context: Option<&str>,
    ) -> Option<ParsedIntent> {
        let effective_text = match context {
            Some(ctx) => format!("{CONTEXT_SENTINEL} {ctx}\n{text}"),
            None => text.to_owned(),
        };
        let found = self
            .parse_table
            .iter()
            .find(|(input, _)| *input == effective_text || input == text)
            .map(|(_, result)| result.clone());

        match &found {
            Some(result) => {
                self.record_call(CallType::ParseIntent, &effective_text, Some(&result.speech), None)
            }
            None => self.record_call(CallType::ParseIntent, &effective_text, None, Some("no structured match")),
        }
        found
    }

    fn classify_intent(&mut self, text: &str, _feature_descriptions: &[String]) -> Option<String> {
        let corrected = self
            .classify_table
            .iter()
            .find(|(input, _)| input == text)
            .map(|(_, corrected)| corrected.clone())
            .unwrap_or_else(|| NO_CORRECTION.to_owned());
        self.record_call(CallType::ClassifyIntent, text, Some(&corrected), None);
        Some(corrected)
    }

    fn record_exchange(&mut self, user: &str, assistant: &str) {
        self.history.record(user, assistant);
    }

    fn last_call_info(&self) -> LastCallInfo {
        self.last_call.clone()
    }

    fn clear_history(&mut self) {
        self.history.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> LlmConfig {
        LlmConfig {
            max_history: 2,
            history_ttl_s: 0,
            intent_max_tokens: 256,
        }
    }

    fn action(feature: &str, action: &str) -> ParsedIntent {
        ParsedIntent {
            kind: IntentType::Action,
            feature: Some(feature.to_owned()),
            action: Some(action.to_owned()),
            parameters: None,
            speech: "ok".to_owned(),
            expects_follow_up: false,
        }
    }

    #[test]
    fn parse_intent_does_not_mutate_history() {
        let mut llm = ScriptedLlm::new("fixture", &config());
        llm.script_parse("add milk", action("grocery_list", "add"));
        assert!(llm.parse_intent("add milk", &[], None).is_some());
        assert_eq!(llm.history.len(), 0);
    }

    #[test]
    fn classify_intent_does_not_mutate_history() {
        let mut llm = ScriptedLlm::new("fixture", &config());
        llm.script_classify("gross free list", "grocery list");
        assert_eq!(
            llm.classify_intent("gross free list", &[]).unwrap(),
            "grocery list"
        );
        assert_eq!(llm.history.len(), 0);
    }

    #[test]
    fn classify_intent_unmatched_returns_no_correction_sentinel() {
        let mut llm = ScriptedLlm::new("fixture", &config());
        assert_eq!(llm.classify_intent("what time is it", &[]).unwrap(), NO_CORRECTION);
    }

    #[test]
    fn respond_records_exchange_on_success() {
        let mut llm = ScriptedLlm::new("fixture", &config());
        llm.script_respond("hello", "hi there");
        assert_eq!(llm.respond("hello"), "hi there");
        assert_eq!(llm.history.len(), 1);
    }

    #[test]
    fn respond_returns_safe_apology_on_failure() {
        let mut llm = ScriptedLlm::new("fixture", &config());
        let reply = llm.respond("unscripted input");
        assert_eq!(reply, "Sorry, I didn't catch that.");
        assert_eq!(llm.history.len(), 0);
    }

    #[test]
    fn history_evicts_oldest_past_max_entries() {
        let mut llm = ScriptedLlm::new("fixture", &config());
        llm.record_exchange("a", "1");
        llm.record_exchange("b", "2");
        llm.record_exchange("c", "3");
        assert_eq!(llm.history.len(), 2);
        let pairs = llm.history.pairs();
        assert_eq!(pairs[0].0, "b");
        assert_eq!(pairs[1].0, "c");
    }

    #[test]
    fn ttl_zero_disables_expiry() {
        let mut llm = ScriptedLlm::new("fixture", &config());
        llm.record_exchange("a", "1");
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(llm.history.len(), 1);
    }

    #[test]
    fn ttl_expires_entries_lazily_on_next_access() {
        let mut llm = ScriptedLlm::new("fixture", &LlmConfig { max_history: 10, history_ttl_s: 1, intent_max_tokens: 256 });
        llm.history.ttl = Some(Duration::from_millis(1));
        llm.record_exchange("a", "1");
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(llm.history.len(), 0);
    }

    #[test]
    fn last_call_info_reflects_most_recent_call() {
        let mut llm = ScriptedLlm::new("fixture", &config());
        llm.script_parse("add milk", action("grocery_list", "add"));
        llm.parse_intent("add milk", &[], None);
        let info = llm.last_call_info();
        assert_eq!(info.call_type, Some(CallType::ParseIntent));
        assert!(info.error.is_none());
    }

    #[test]
    fn context_is_prepended_with_sentinel() {
        let mut llm = ScriptedLlm::new("fixture", &config());
        llm.script_parse(
            format!("{CONTEXT_SENTINEL} media disambiguation active\nyes"),
            action("media_library", "confirm"),
        );
        let result = llm.parse_intent("yes", &[], Some("media disambiguation active"));
        assert!(result.is_some());
    }

    #[test]
    fn clear_history_empties_entries() {
        let mut llm = ScriptedLlm::new("fixture", &config());
        llm.record_exchange("a", "1");
        llm.clear_history();
        assert_eq!(llm.history.len(), 0);
    }
}
