//! Durable telemetry store: append-only session persistence with
//! size-capped pruning. Grounded in the teacher's `SqliteMemoryRepository`
//! (an internal `Mutex<Connection>`, idempotent schema application on
//! open) and the prior implementation's prune-oldest-10%-then-vacuum
//! maintenance pass.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use tracing::warn;

use crate::error::{Error, Result};
use crate::llm::CallType;
use crate::router::RoutingPath;
use crate::telemetry::model::{Exchange, LlmCallRecord, PhaseTiming, Session};
use crate::telemetry::schema::apply_schema;

fn call_type_str(call_type: CallType) -> &'static str {
    match call_type {
        CallType::ParseIntent => "parse_intent",
        CallType::ClassifyIntent => "classify_intent",
        CallType::Respond => "respond",
    }
}

fn call_type_from_str(s: &str) -> CallType {
    match s {
        "parse_intent" => CallType::ParseIntent,
        "classify_intent" => CallType::ClassifyIntent,
        _ => CallType::Respond,
    }
}

fn routing_path_str(path: RoutingPath) -> &'static str {
    match path {
        RoutingPath::LlmParse => "llm_parse",
        RoutingPath::Regex => "regex",
        RoutingPath::Recovery => "recovery",
        RoutingPath::LlmFallback => "llm_fallback",
    }
}

fn routing_path_from_str(s: &str) -> Option<RoutingPath> {
    match s {
        "llm_parse" => Some(RoutingPath::LlmParse),
        "regex" => Some(RoutingPath::Regex),
        "recovery" => Some(RoutingPath::Recovery),
        "llm_fallback" => Some(RoutingPath::LlmFallback),
        _ => None,
    }
}

/// Thread-safe, durable append-only telemetry store. All writes are
/// serialized behind the internal mutex; a single embedded relational
/// file backs the store.
pub struct TelemetryStore {
    path: PathBuf,
    max_size_bytes: u64,
    conn: Mutex<Connection>,
}

impl TelemetryStore {
    /// Open (or create) the telemetry database at `path`, applying the
    /// idempotent schema.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or the schema
    /// cannot be applied.
    pub fn open(path: &Path, max_size_bytes: u64) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        apply_schema(&conn)?;
        Ok(Self {
            path: path.to_path_buf(),
            max_size_bytes,
            conn: Mutex::new(conn),
        })
    }

    /// Open a second, read-only connection to the same database file, for
    /// the dashboard's read path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened.
    pub fn open_read_only(path: &Path, max_size_bytes: u64) -> Result<Self> {
        let conn = Connection::open_with_flags(path, rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        Ok(Self {
            path: path.to_path_buf(),
            max_size_bytes,
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Telemetry("telemetry store lock poisoned".into()))
    }

    /// Append a finished session, all its exchanges, and all llm calls in
    /// a single transaction. Then prunes if the backing file exceeds
    /// `max_size_bytes`; pruning failures are logged, not propagated.
    ///
    /// # Errors
    ///
    /// Returns an error if the write transaction fails.
    pub fn save_session(&self, session: &Session) -> Result<()> {
        {
            let mut conn = self.lock()?;
            let tx = conn.transaction()?;

            tx.execute(
                "INSERT INTO sessions (id, started_at, ended_at, wake_model) VALUES (?1, ?2, ?3, ?4)",
                params![
                    session.id.to_string(),
                    session.started_at.to_rfc3339(),
                    session.ended_at.map(|t| t.to_rfc3339()),
                    session.wake_model,
                ],
            )?;

            for exchange in &session.exchanges {
                insert_exchange(&tx, exchange)?;
            }

            tx.commit()?;
        }
        self.prune_if_oversized();
        Ok(())
    }

    /// Total size in bytes of the backing database file on disk.
    fn file_size_bytes(&self) -> u64 {
        std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
    }

    /// Delete the oldest 10% of sessions (cascading to exchanges and llm
    /// calls) and compact storage. Non-fatal: logs and returns on
    /// failure rather than propagating.
    pub fn prune_if_oversized(&self) {
        if self.file_size_bytes() <= self.max_size_bytes {
            return;
        }
        if let Err(e) = self.prune_oldest_tenth() {
            warn!("telemetry pruning failed: {e}");
        }
    }

    fn prune_oldest_tenth(&self) -> Result<()> {
        let conn = self.lock()?;
        let total: i64 = conn.query_row("SELECT count(*) FROM sessions", [], |row| row.get(0))?;
        if total == 0 {
            return Ok(());
        }
        let to_delete = ((total as f64 * 0.1).ceil() as i64).max(1);

        conn.execute(
            "DELETE FROM sessions WHERE id IN (
                SELECT id FROM sessions ORDER BY started_at ASC LIMIT ?1
            )",
            params![to_delete],
        )?;
        conn.execute_batch("VACUUM")?;
        Ok(())
    }

    /// Aggregate counters for the dashboard's `/api/stats` endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if any query fails.
    pub fn stats(&self) -> Result<Stats> {
        let conn = self.lock()?;
        let sessions: i64 = conn.query_row("SELECT count(*) FROM sessions", [], |row| row.get(0))?;
        let exchanges: i64 = conn.query_row("SELECT count(*) FROM exchanges", [], |row| row.get(0))?;
        let llm_calls: i64 = conn.query_row("SELECT count(*) FROM llm_calls", [], |row| row.get(0))?;
        let input_tokens: i64 = conn.query_row(
            "SELECT COALESCE(SUM(input_tokens), 0) FROM llm_calls",
            [],
            |row| row.get(0),
        )?;
        let output_tokens: i64 = conn.query_row(
            "SELECT COALESCE(SUM(output_tokens), 0) FROM llm_calls",
            [],
            |row| row.get(0),
        )?;
        let errors: i64 = conn.query_row(
            "SELECT count(*) FROM exchanges WHERE error IS NOT NULL",
            [],
            |row| row.get(0),
        )?;
        let today: i64 = conn.query_row(
            "SELECT count(*) FROM sessions WHERE date(started_at) = date('now')",
            [],
            |row| row.get(0),
        )?;

        let mut phase_averages = Vec::new();
        for phase in crate::telemetry::model::PHASE_NAMES {
            let column = format!("{phase}_duration_ms");
            let avg: Option<f64> = conn.query_row(
                &format!("SELECT AVG({column}) FROM exchanges WHERE {column} IS NOT NULL"),
                [],
                |row| row.get(0),
            )?;
            phase_averages.push((phase.to_owned(), avg.unwrap_or(0.0)));
        }

        let mut feature_counts = Vec::new();
        {
            let mut stmt = conn.prepare(
                "SELECT matched_feature, count(*) FROM exchanges \
                 WHERE matched_feature IS NOT NULL GROUP BY matched_feature ORDER BY count(*) DESC",
            )?;
            let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
            for r in rows {
                feature_counts.push(r?);
            }
        }

        let mut routing_path_counts = Vec::new();
        {
            let mut stmt = conn.prepare(
                "SELECT routing_path, count(*) FROM exchanges \
                 WHERE routing_path IS NOT NULL GROUP BY routing_path ORDER BY count(*) DESC",
            )?;
            let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
            for r in rows {
                routing_path_counts.push(r?);
            }
        }

        Ok(Stats {
            sessions,
            exchanges,
            llm_calls,
            input_tokens,
            output_tokens,
            errors,
            sessions_today: today,
            phase_averages_ms: phase_averages,
            feature_counts,
            routing_path_counts,
        })
    }

    /// Paginated session summaries, most recent first. `limit` is
    /// clamped to 200.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_sessions(&self, limit: u32, offset: u32) -> Result<Vec<SessionSummary>> {
        let limit = limit.min(200);
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, started_at, ended_at, wake_model FROM sessions \
             ORDER BY started_at DESC LIMIT ?1 OFFSET ?2",
        )?;
        let rows = stmt.query_map(params![limit, offset], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut summaries = Vec::new();
        for row in rows {
            let (id, started_at, ended_at, wake_model) = row?;
            let first_transcription: Option<String> = conn
                .query_row(
                    "SELECT transcription FROM exchanges WHERE session_id = ?1 \
                     AND transcription IS NOT NULL ORDER BY sequence ASC LIMIT 1",
                    params![id],
                    |r| r.get(0),
                )
                .optional()?;
            let had_error: bool = conn
                .query_row(
                    "SELECT count(*) FROM exchanges WHERE session_id = ?1 AND error IS NOT NULL",
                    params![id],
                    |r| r.get::<_, i64>(0),
                )?
                > 0;

            let mut feat_stmt = conn.prepare(
                "SELECT DISTINCT matched_feature FROM exchanges \
                 WHERE session_id = ?1 AND matched_feature IS NOT NULL",
            )?;
            let features: Vec<String> = feat_stmt
                .query_map(params![id], |r| r.get(0))?
                .collect::<rusqlite::Result<_>>()?;

            let duration_ms = ended_at.as_ref().and_then(|e| {
                let start = chrono::DateTime::parse_from_rfc3339(&started_at).ok()?;
                let end = chrono::DateTime::parse_from_rfc3339(e).ok()?;
                Some((end - start).num_milliseconds().max(0))
            });

            summaries.push(SessionSummary {
                id,
                started_at,
                ended_at,
                wake_model,
                first_transcription,
                features_used: features,
                had_error,
                duration_ms,
            });
        }
        Ok(summaries)
    }

    /// Full session detail: all exchanges and their LLM calls.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn session_detail(&self, id: &str) -> Result<Option<Session>> {
        let conn = self.lock()?;
        let session_row = conn
            .query_row(
                "SELECT started_at, ended_at, wake_model FROM sessions WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;

        let Some((started_at, ended_at, wake_model)) = session_row else {
            return Ok(None);
        };

        let session_uuid = uuid::Uuid::parse_str(id).map_err(|e| Error::Telemetry(e.to_string()))?;
        let mut session = Session {
            id: session_uuid,
            started_at: parse_rfc3339(&started_at)?,
            ended_at: ended_at.as_deref().map(parse_rfc3339).transpose()?,
            wake_model,
            exchanges: Vec::new(),
        };

        let mut stmt = conn.prepare("SELECT id FROM exchanges WHERE session_id = ?1 ORDER BY sequence ASC")?;
        let exchange_ids: Vec<String> = stmt.query_map(params![id], |r| r.get(0))?.collect::<rusqlite::Result<_>>()?;
        drop(stmt);

        for exchange_id in exchange_ids {
            if let Some(exchange) = load_exchange(&conn, &exchange_id)? {
                session.exchanges.push(exchange);
            }
        }

        Ok(Some(session))
    }
}

fn parse_rfc3339(s: &str) -> Result<chrono::DateTime<chrono::Utc>> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .map_err(|e| Error::Telemetry(e.to_string()))
}

fn insert_exchange(tx: &rusqlite::Transaction<'_>, exchange: &Exchange) -> Result<()> {
    tx.execute(
        "INSERT INTO exchanges (
            id, session_id, sequence, is_follow_up,
            recording_started_at, recording_ended_at, recording_duration_ms,
            stt_started_at, stt_ended_at, stt_duration_ms,
            routing_started_at, routing_ended_at, routing_duration_ms,
            tts_started_at, tts_ended_at, tts_duration_ms,
            playback_started_at, playback_ended_at, playback_duration_ms,
            transcription, routing_path, matched_feature, feature_action,
            response_text, used_vad, had_bargein, error
        ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19,?20,?21,?22,?23,?24,?25,?26,?27)",
        params![
            exchange.id.to_string(),
            exchange.session_id.to_string(),
            exchange.sequence,
            exchange.is_follow_up,
            phase_ts(&exchange.recording, true),
            phase_ts(&exchange.recording, false),
            exchange.recording.duration_ms,
            phase_ts(&exchange.stt, true),
            phase_ts(&exchange.stt, false),
            exchange.stt.duration_ms,
            phase_ts(&exchange.routing, true),
            phase_ts(&exchange.routing, false),
            exchange.routing.duration_ms,
            phase_ts(&exchange.tts, true),
            phase_ts(&exchange.tts, false),
            exchange.tts.duration_ms,
            phase_ts(&exchange.playback, true),
            phase_ts(&exchange.playback, false),
            exchange.playback.duration_ms,
            exchange.transcription,
            exchange.routing_path.map(routing_path_str),
            exchange.matched_feature,
            exchange.feature_action,
            exchange.response_text,
            exchange.used_vad,
            exchange.had_bargein,
            exchange.error,
        ],
    )?;

    for call in &exchange.llm_calls {
        tx.execute(
            "INSERT INTO llm_calls (
                exchange_id, call_type, duration_ms, model, system_prompt,
                user_message, response_text, input_tokens, output_tokens,
                stop_reason, error
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11)",
            params![
                exchange.id.to_string(),
                call_type_str(call.call_type),
                call.duration_ms,
                call.model,
                call.system_prompt,
                call.user_message,
                call.response_text,
                call.input_tokens,
                call.output_tokens,
                call.stop_reason,
                call.error,
            ],
        )?;
    }
    Ok(())
}

fn phase_ts(phase: &PhaseTiming, started: bool) -> Option<String> {
    let ts = if started { phase.started_at } else { phase.ended_at };
    ts.map(|t| t.to_rfc3339())
}

fn load_exchange(conn: &Connection, exchange_id: &str) -> Result<Option<Exchange>> {
    let row = conn
        .query_row(
            "SELECT session_id, sequence, is_follow_up,
                    recording_started_at, recording_ended_at, recording_duration_ms,
                    stt_started_at, stt_ended_at, stt_duration_ms,
                    routing_started_at, routing_ended_at, routing_duration_ms,
                    tts_started_at, tts_ended_at, tts_duration_ms,
                    playback_started_at, playback_ended_at, playback_duration_ms,
                    transcription, routing_path, matched_feature, feature_action,
                    response_text, used_vad, had_bargein, error
             FROM exchanges WHERE id = ?1",
            params![exchange_id],
            |row| {
                Ok(ExchangeRow {
                    session_id: row.get(0)?,
                    sequence: row.get(1)?,
                    is_follow_up: row.get(2)?,
                    recording: (row.get(3)?, row.get(4)?, row.get(5)?),
                    stt: (row.get(6)?, row.get(7)?, row.get(8)?),
                    routing: (row.get(9)?, row.get(10)?, row.get(11)?),
                    tts: (row.get(12)?, row.get(13)?, row.get(14)?),
                    playback: (row.get(15)?, row.get(16)?, row.get(17)?),
                    transcription: row.get(18)?,
                    routing_path: row.get(19)?,
                    matched_feature: row.get(20)?,
                    feature_action: row.get(21)?,
                    response_text: row.get(22)?,
                    used_vad: row.get(23)?,
                    had_bargein: row.get(24)?,
                    error: row.get(25)?,
                })
            },
        )
        .optional()?;

    let Some(row) = row else { return Ok(None) };

    let mut stmt = conn.prepare(
        "SELECT call_type, duration_ms, model, system_prompt, user_message,
                response_text, input_tokens, output_tokens, stop_reason, error
         FROM llm_calls WHERE exchange_id = ?1 ORDER BY id ASC",
    )?;
    let llm_calls = stmt
        .query_map(params![exchange_id], |row| {
            Ok(LlmCallRecord {
                call_type: call_type_from_str(&row.get::<_, String>(0)?),
                duration_ms: row.get::<_, i64>(1)? as u64,
                model: row.get(2)?,
                system_prompt: row.get(3)?,
                user_message: row.get(4)?,
                response_text: row.get(5)?,
                input_tokens: row.get::<_, Option<i64>>(6)?.map(|v| v as u32),
                output_tokens: row.get::<_, Option<i64>>(7)?.map(|v| v as u32),
                stop_reason: row.get(8)?,
                error: row.get(9)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(Some(Exchange {
        id: uuid::Uuid::parse_str(exchange_id).map_err(|e| Error::Telemetry(e.to_string()))?,
        session_id: uuid::Uuid::parse_str(&row.session_id).map_err(|e| Error::Telemetry(e.to_string()))?,
        sequence: row.sequence,
        is_follow_up: row.is_follow_up,
        recording: timing_from(row.recording)?,
        stt: timing_from(row.stt)?,
        routing: timing_from(row.routing)?,
        tts: timing_from(row.tts)?,
        playback: timing_from(row.playback)?,
        transcription: row.transcription,
        routing_path: row.routing_path.as_deref().and_then(routing_path_from_str),
        matched_feature: row.matched_feature,
        feature_action: row.feature_action,
        response_text: row.response_text,
        used_vad: row.used_vad,
        had_bargein: row.had_bargein,
        error: row.error,
        llm_calls,
    }))
}

struct ExchangeRow {
    session_id: String,
    sequence: u32,
    is_follow_up: bool,
    recording: (Option<String>, Option<String>, Option<i64>),
    stt: (Option<String>, Option<String>, Option<i64>),
    routing: (Option<String>, Option<String>, Option<i64>),
    tts: (Option<String>, Option<String>, Option<i64>),
    playback: (Option<String>, Option<String>, Option<i64>),
    transcription: Option<String>,
    routing_path: Option<String>,
    matched_feature: Option<String>,
    feature_action: Option<String>,
    response_text: Option<String>,
    used_vad: bool,
    had_bargein: bool,
    error: Option<String>,
}

fn timing_from(raw: (Option<String>, Option<String>, Option<i64>)) -> Result<PhaseTiming> {
    Ok(PhaseTiming {
        started_at: raw.0.as_deref().map(parse_rfc3339).transpose()?,
        ended_at: raw.1.as_deref().map(parse_rfc3339).transpose()?,
        duration_ms: raw.2,
    })
}

/// Aggregate counters for the dashboard home page.
#[derive(Debug, Clone, Serialize)]
pub struct Stats {
    /// Total sessions recorded.
    pub sessions: i64,
    /// Total exchanges recorded.
    pub exchanges: i64,
    /// Total LLM calls recorded.
    pub llm_calls: i64,
    /// Sum of input tokens across all LLM calls.
    pub input_tokens: i64,
    /// Sum of output tokens across all LLM calls.
    pub output_tokens: i64,
    /// Count of exchanges with a non-null error.
    pub errors: i64,
    /// Sessions started today (server-local date).
    pub sessions_today: i64,
    /// Average duration per phase, in milliseconds.
    pub phase_averages_ms: Vec<(String, f64)>,
    /// Exchange counts grouped by matched feature.
    pub feature_counts: Vec<(String, i64)>,
    /// Exchange counts grouped by routing path.
    pub routing_path_counts: Vec<(String, i64)>,
}

/// Summary of one session for paginated listings.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    /// Session identifier.
    pub id: String,
    /// Session start timestamp (RFC 3339).
    pub started_at: String,
    /// Session end timestamp (RFC 3339), if finished.
    pub ended_at: Option<String>,
    /// Wake model active for this session.
    pub wake_model: String,
    /// First non-empty transcription in the session, if any.
    pub first_transcription: Option<String>,
    /// Distinct features matched during this session.
    pub features_used: Vec<String>,
    /// Whether any exchange in this session recorded an error.
    pub had_error: bool,
    /// Session duration in milliseconds, if finished.
    pub duration_ms: Option<i64>,
}
