//! Media library feature fixture (C12). In-memory only, no persistence —
//! a reference implementation of the Feature contract exercising the
//! multi-turn disambiguation flow, not a specified part of the core.

use std::sync::LazyLock;
use std::time::{Duration, Instant};

use regex::Regex;
use serde_json::{json, Value};

use crate::error::{Error, Result};
use crate::feature::Feature;

/// How long a pending disambiguation stays valid without a follow-up.
const DISAMBIGUATION_TTL: Duration = Duration::from_secs(60);

static ANY_MEDIA: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(movie|movies|show|shows|series|tv|track|download|library)\b").expect("valid regex")
});
static TRACK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:track|add|download|grab|get)\s+(?:the\s+)?(.+)").expect("valid regex"));
static YES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(yes|yeah|yep|sure|do it|go ahead|confirm)\b").expect("valid regex"));
static CANCEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(cancel|never\s*mind|forget\s*it|stop|no|nope)\b").expect("valid regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Confirming,
}

struct Pending {
    candidate: String,
    search_term: String,
    phase: Phase,
    created_at: Instant,
}

/// A small fixed catalog standing in for a real Sonarr/Radarr search.
const CATALOG: &[&str] = &["Batman (1989)", "Batman Begins (2005)", "Breaking Bad", "Severance", "Dune (2021)"];

/// In-memory tracked media library with single-candidate disambiguation.
pub struct MediaFeature {
    library: Vec<String>,
    pending: Option<Pending>,
}

impl MediaFeature {
    /// Start with an empty library.
    pub fn new() -> Self {
        Self {
            library: Vec::new(),
            pending: None,
        }
    }

    fn expire_if_stale(&mut self) {
        if let Some(pending) = &self.pending {
            if pending.created_at.elapsed() > DISAMBIGUATION_TTL {
                self.pending = None;
            }
        }
    }

    fn search(&self, term: &str) -> Vec<&'static str> {
        let needle = term.to_lowercase();
        CATALOG
            .iter()
            .copied()
            .filter(|title| title.to_lowercase().contains(&needle))
            .collect()
    }

    fn track(&mut self, term: &str) -> String {
        let term = term.trim_end_matches(['.', '!', '?', ',', ';', ':']).trim();
        let matches = self.search(term);
        match matches.as_slice() {
            [] => format!("I couldn't find anything matching \"{term}\"."),
            [single] => {
                self.pending = Some(Pending {
                    candidate: (*single).to_owned(),
                    search_term: term.to_owned(),
                    phase: Phase::Confirming,
                    created_at: Instant::now(),
                });
                format!("I found {single}. Should I add it?")
            }
            many => {
                let first = many[0];
                self.pending = Some(Pending {
                    candidate: first.to_owned(),
                    search_term: term.to_owned(),
                    phase: Phase::Confirming,
                    created_at: Instant::now(),
                });
                format!("I found {} matches. First: {first}. Should I add it?", many.len())
            }
        }
    }

    fn confirm(&mut self) -> String {
        let Some(pending) = self.pending.take() else {
            return "There's nothing pending to confirm.".to_owned();
        };
        self.library.push(pending.candidate.clone());
        format!("Done! I've added {} to your movies.", pending.candidate)
    }

    fn cancel(&mut self) -> String {
        if self.pending.take().is_some() {
            "Okay, cancelled.".to_owned()
        } else {
            "There's nothing pending to cancel.".to_owned()
        }
    }
}

impl Default for MediaFeature {
    fn default() -> Self {
        Self::new()
    }
}

impl Feature for MediaFeature {
    fn name(&self) -> &str {
        "media_library"
    }

    fn short_description(&self) -> &str {
        "Media library"
    }

    fn description(&self) -> &str {
        "Media library: triggered by \"movie\", \"show\", \"track\", or \"library\". Commands: \
         \"track X\", \"add X to my movies\", confirmations like \"yes\" or \"cancel\" during \
         disambiguation."
    }

    fn matches(&self, text: &str) -> bool {
        if self.pending.is_some() && (YES.is_match(text) || CANCEL.is_match(text)) {
            return true;
        }
        ANY_MEDIA.is_match(text)
    }

    fn handle(&mut self, text: &str) -> Result<String> {
        self.expire_if_stale();
        if self.pending.is_some() {
            if YES.is_match(text) {
                return Ok(self.confirm());
            }
            if CANCEL.is_match(text) {
                return Ok(self.cancel());
            }
        }
        if let Some(caps) = TRACK.captures(text) {
            return Ok(self.track(&caps[1]));
        }
        Ok("I'm not sure what to do with that.".to_owned())
    }

    fn action_schema(&self) -> Value {
        json!({
            "track": {"title": "string"},
            "confirm": {},
            "cancel": {},
        })
    }

    fn execute(&mut self, action: &str, parameters: &Value) -> Result<String> {
        self.expire_if_stale();
        match action {
            "track" => {
                let title = parameters
                    .get("title")
                    .and_then(Value::as_str)
                    .ok_or_else(|| Error::Feature("media track requires a title parameter".into()))?;
                Ok(self.track(title))
            }
            "confirm" => Ok(self.confirm()),
            "cancel" => Ok(self.cancel()),
            other => Err(Error::Feature(format!("unknown media action: {other}"))),
        }
    }

    fn get_llm_context(&self) -> Option<String> {
        let pending = self.pending.as_ref()?;
        if pending.created_at.elapsed() > DISAMBIGUATION_TTL {
            return None;
        }
        match pending.phase {
            Phase::Confirming => Some(format!(
                "media disambiguation active for \"{}\": confirm adding \"{}\"?",
                pending.search_term, pending.candidate
            )),
        }
    }

    fn expects_follow_up(&self) -> bool {
        self.pending.is_some()
    }

    fn close(&mut self) {
        self.pending = None;
    }
}
