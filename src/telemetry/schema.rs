//! SQLite DDL for the telemetry store.
//!
//! All `CREATE TABLE` / `CREATE INDEX` statements live here, following the
//! teacher's convention of keeping DDL reviewable and testable in
//! isolation, idempotent via `IF NOT EXISTS` throughout.

use rusqlite::Connection;

/// Current schema version stamped into `schema_meta`.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS schema_meta (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS sessions (
    id         TEXT PRIMARY KEY,
    started_at TEXT NOT NULL,
    ended_at   TEXT,
    wake_model TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sessions_started_at ON sessions(started_at);

CREATE TABLE IF NOT EXISTS exchanges (
    id                     TEXT PRIMARY KEY,
    session_id             TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
    sequence               INTEGER NOT NULL,
    is_follow_up           INTEGER NOT NULL DEFAULT 0,
    recording_started_at   TEXT,
    recording_ended_at     TEXT,
    recording_duration_ms  INTEGER,
    stt_started_at         TEXT,
    stt_ended_at           TEXT,
    stt_duration_ms        INTEGER,
    routing_started_at     TEXT,
    routing_ended_at       TEXT,
    routing_duration_ms    INTEGER,
    tts_started_at         TEXT,
    tts_ended_at           TEXT,
    tts_duration_ms        INTEGER,
    playback_started_at    TEXT,
    playback_ended_at      TEXT,
    playback_duration_ms   INTEGER,
    transcription          TEXT,
    routing_path           TEXT,
    matched_feature        TEXT,
    feature_action         TEXT,
    response_text          TEXT,
    used_vad               INTEGER NOT NULL DEFAULT 0,
    had_bargein            INTEGER NOT NULL DEFAULT 0,
    error                  TEXT
);

CREATE INDEX IF NOT EXISTS idx_exchanges_session_id ON exchanges(session_id);

CREATE TABLE IF NOT EXISTS llm_calls (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    exchange_id    TEXT NOT NULL REFERENCES exchanges(id) ON DELETE CASCADE,
    call_type      TEXT NOT NULL,
    duration_ms    INTEGER NOT NULL,
    model          TEXT NOT NULL,
    system_prompt  TEXT,
    user_message   TEXT NOT NULL,
    response_text  TEXT,
    input_tokens   INTEGER,
    output_tokens  INTEGER,
    stop_reason    TEXT,
    error          TEXT
);

CREATE INDEX IF NOT EXISTS idx_llm_calls_exchange_id ON llm_calls(exchange_id);
"#;

/// Apply the full schema to an open connection. Safe to call multiple
/// times; all statements use `IF NOT EXISTS`. Seeds the schema version
/// into `schema_meta` only if it is not already present.
pub fn apply_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', ?1)",
        rusqlite::params![CURRENT_SCHEMA_VERSION.to_string()],
    )?;
    Ok(())
}
