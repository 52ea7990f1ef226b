//! Background research scheduling and storage.
//!
//! When Fae detects user interests, she can schedule background research
//! tasks that search the web, summarize findings, and store them as memory
//! records for later delivery in briefings.

use crate::intelligence::store::IntelligenceStore;
use crate::memory::{MemoryKind, MemoryRecord};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

/// A research task waiting to be executed.
#[derive(Debug, Clone)]
pub struct ResearchTask {
    /// Topic to research.
    pub topic: String,
    /// Source intelligence item that triggered this research.
    pub source_id: Option<String>,
    /// Maximum age of existing research (in days) before re-researching.
    pub freshness_days: u32,
}

impl ResearchTask {
    /// Create a new research task for the given topic.
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            source_id: None,
            freshness_days: 7,
        }
    }

    /// Attach a source intelligence item ID.
    #[must_use]
    pub fn with_source(mut self, id: impl Into<String>) -> Self {
        self.source_id = Some(id.into());
        self
    }

    /// Set the freshness threshold.
    #[must_use]
    pub fn with_freshness_days(mut self, days: u32) -> Self {
        self.freshness_days = days;
        self
    }
}

/// Default freshness threshold for research (days).
const DEFAULT_FRESHNESS_DAYS: u32 = 7;

/// Maximum daily research tasks.
const MAX_DAILY_RESEARCH: usize = 3;
/// Relative location for mutable research scheduling policy.
const RESEARCH_POLICY_RELATIVE_PATH: &str = "skills/intelligence/research-policy.toml";

/// Policy thresholds for research scheduling heuristics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResearchPolicy {
    /// Freshness horizon in days before a topic is considered stale.
    pub freshness_days: u32,
    /// Maximum number of research tasks to schedule in a pass.
    pub max_daily_tasks: usize,
}

impl Default for ResearchPolicy {
    fn default() -> Self {
        Self {
            freshness_days: DEFAULT_FRESHNESS_DAYS,
            max_daily_tasks: MAX_DAILY_RESEARCH,
        }
    }
}

/// Check if recent research exists for a topic.
///
/// Returns `true` if a Fact-kind record with the `research` and matching
/// topic tag exists and was updated within `max_age_days`.
pub fn has_recent_research(store: &IntelligenceStore, topic: &str, max_age_days: u32) -> bool {
    let records = match store.repo().list_records() {
        Ok(r) => r,
        Err(_) => return false,
    };

    let now = now_epoch_secs();
    let max_age_secs = u64::from(max_age_days) * 86_400;
    let normalized_topic = topic.trim().to_lowercase();

    records.iter().any(|r| {
        r.kind == MemoryKind::Fact
            && r.status == crate::memory::MemoryStatus::Active
            && r.tags.iter().any(|t| t == "research")
            && r.tags
                .iter()
                .any(|t| t.starts_with("topic:") && t[6..].to_lowercase() == normalized_topic)
            && now.saturating_sub(r.updated_at) < max_age_secs
    })
}

/// Store a research result as a Fact-kind memory record.
pub fn store_research_result(
    store: &IntelligenceStore,
    topic: &str,
    summary: &str,
    source_urls: &[String],
) -> Result<MemoryRecord, crate::error::SpeechError> {
    let mut tags = vec![
        "research".to_owned(),
        format!("topic:{topic}"),
        "intelligence:research".to_owned(),
    ];

    // Store source URLs as tags for retrieval.
    for url in source_urls {
        tags.push(format!("source_url:{url}"));
    }

    Ok(store
        .repo()
        .insert_record(MemoryKind::Fact, summary, 0.70, None, &tags)?)
}

/// Gather recent research results for briefing inclusion.
///
/// Returns Fact-kind records tagged with `research` that were updated
/// within the given number of days, ordered by most recent first.
pub fn gather_recent_research(store: &IntelligenceStore, within_days: u32) -> Vec<MemoryRecord> {
    let records = match store.repo().list_records() {
        Ok(r) => r,
        Err(_) => return Vec::new(),
    };

    let now = now_epoch_secs();
    let horizon = u64::from(within_days) * 86_400;

    let mut research: Vec<MemoryRecord> = records
        .into_iter()
        .filter(|r| {
            r.kind == MemoryKind::Fact
                && r.status == crate::memory::MemoryStatus::Active
                && r.tags.iter().any(|t| t == "research")
                && now.saturating_sub(r.updated_at) < horizon
        })
        .collect();

    // Most recent first.
    research.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    research
}

/// Create research tasks from detected interests, respecting freshness
/// and daily limits.
///
/// Returns research tasks that should be scheduled (topics not recently
/// researched), capped at `max_daily`.
pub fn create_research_tasks(
    store: &IntelligenceStore,
    topics: &[String],
    max_daily: Option<usize>,
) -> Vec<ResearchTask> {
    let mut policy = ResearchPolicy::default();
    if let Some(limit) = max_daily {
        policy.max_daily_tasks = limit;
    }
    create_research_tasks_with_policy(store, topics, policy)
}

/// Create research tasks using a mutable policy pack.
///
/// This keeps scheduler heuristics in data while preserving the same core
/// filtering logic.
pub fn create_research_tasks_with_policy(
    store: &IntelligenceStore,
    topics: &[String],
    policy: ResearchPolicy,
) -> Vec<ResearchTask> {
    let limit = policy.max_daily_tasks;
    topics
        .iter()
        .filter(|topic| !has_recent_research(store, topic, policy.freshness_days))
        .take(limit)
        .map(|topic| ResearchTask::new(topic.as_str()).with_freshness_days(policy.freshness_days))
        .collect()
}

/// Load research scheduling policy from mutable root.
///
/// Missing or malformed policy file falls back to defaults.
#[must_use]
pub fn load_research_policy(fae_root: &Path) -> ResearchPolicy {
    let path = fae_root.join(RESEARCH_POLICY_RELATIVE_PATH);
    if !path.exists() {
        return ResearchPolicy::default();
    }

    let contents = match std::fs::read_to_string(&path) {
        Ok(c) => c,
        Err(e) => {
            warn!(
                path = %path.display(),
                error = %e,
                "failed to read research policy; using defaults"
            );
            return ResearchPolicy::default();
        }
    };

    match toml::from_str::<ResearchPolicy>(&contents) {
        Ok(policy) => policy,
        Err(e) => {
            warn!(
                path = %path.display(),
                error = %e,
                "failed to parse research policy; using defaults"
            );
            ResearchPolicy::default()
        }
    }
}

/// Get current time as epoch seconds.
fn now_epoch_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
