//! Intelligence action executor.
//!
//! Executes [`IntelligenceAction`]s by creating scheduler tasks,
//! memory records, and updating relationship metadata.

use crate::intelligence::store::IntelligenceStore;
use crate::intelligence::types::{ActionResult, IntelligenceAction};
use crate::memory::MemoryKind;
use crate::scheduler::{Schedule, ScheduledTask, upsert_persisted_user_task};
use tracing::warn;

/// Execute a list of intelligence actions, returning results for each.
///
/// Actions are executed independently — a failure in one does not prevent
/// others from running.
pub fn execute_actions(
    actions: &[IntelligenceAction],
    store: &IntelligenceStore,
) -> Vec<ActionResult> {
    actions
        .iter()
        .map(|action| execute_single_action(action, store))
        .collect()
}

/// Execute a single intelligence action.
fn execute_single_action(action: &IntelligenceAction, store: &IntelligenceStore) -> ActionResult {
    match action {
        IntelligenceAction::CreateSchedulerTask {
            name,
            trigger_at,
            prompt,
        } => create_scheduler_task(name, trigger_at, prompt),

        IntelligenceAction::CreateMemoryRecord {
            kind,
            text,
            tags,
            confidence,
        } => create_memory_record(store, kind, text, tags, *confidence),

        IntelligenceAction::UpdateRelationship {
            name,
            relationship,
            context,
        } => update_relationship(store, name, relationship.as_deref(), context.as_deref()),
    }
}

/// Create a scheduler task from an intelligence action.
fn create_scheduler_task(name: &str, trigger_at: &str, prompt: &str) -> ActionResult {
    // Parse the trigger date into a daily schedule.
    let schedule = parse_trigger_date_to_schedule(trigger_at);

    let trigger = crate::scheduler::ConversationTrigger::new(prompt).with_system_addon(
        "You are delivering a proactive reminder based on intelligence \
         gathered from previous conversations. Be warm and natural.",
    );

    let payload = match trigger.to_json() {
        Ok(p) => p,
        Err(e) => {
            return ActionResult::Failed {
                reason: format!("failed to serialize trigger payload: {e}"),
            };
        }
    };

    let task_id = format!("intelligence_{}", sanitize_task_id(name));
    let mut task = ScheduledTask::new(&task_id, name, schedule);
    task.payload = Some(payload);

    match upsert_persisted_user_task(task) {
        Ok(()) => ActionResult::TaskCreated { task_id },
        Err(e) => ActionResult::Failed {
            reason: format!("failed to persist scheduler task: {e}"),
        },
    }
}

/// Create a memory record from an intelligence action.
fn create_memory_record(
    store: &IntelligenceStore,
    kind_str: &str,
    text: &str,
    tags: &[String],
    confidence: f32,
) -> ActionResult {
    let kind = match kind_str {
        "event" => MemoryKind::Event,
        "person" => MemoryKind::Person,
        "interest" => MemoryKind::Interest,
        "commitment" => MemoryKind::Commitment,
        "fact" => MemoryKind::Fact,
        "profile" => MemoryKind::Profile,
        other => {
            warn!("unknown memory kind in intelligence action: {other}");
            MemoryKind::Fact
        }
    };

    match store
        .repo()
        .insert_record(kind, text, confidence, None, tags.to_vec())
    {
        Ok(record) => ActionResult::MemoryRecordCreated {
            record_id: record.id,
        },
        Err(e) => ActionResult::Failed {
            reason: format!("failed to insert memory record: {e}"),
        },
    }
}

/// Update a relationship from an intelligence action.
fn update_relationship(
    store: &IntelligenceStore,
    name: &str,
    relationship: Option<&str>,
    context: Option<&str>,
) -> ActionResult {
    match store.upsert_relationship(name, relationship, context) {
        Ok(_) => ActionResult::RelationshipUpdated {
            name: name.to_owned(),
        },
        Err(e) => ActionResult::Failed {
            reason: format!("failed to update relationship for {name}: {e}"),
        },
    }
}

/// Parse a trigger date string into a [`Schedule`].
///
/// Attempts ISO date parsing; falls back to a daily schedule at 09:00.
fn parse_trigger_date_to_schedule(trigger_at: &str) -> Schedule {
    // For now, just use a daily schedule at 09:00.
    // A future improvement could parse the date and create a one-shot task.
    let _ = trigger_at; // Used in future date-aware scheduling.
    Schedule::Daily { hour: 9, min: 0 }
}

/// Sanitize a name for use as a task ID.
fn sanitize_task_id(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect::<String>()
        .to_lowercase()
}
