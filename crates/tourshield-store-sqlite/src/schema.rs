//! SQL schema for the TourShield archive.
//!
//! Executed once at connection startup. Migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- One row per terminal alert. Derived columns are kept for querying only;
-- the alert is rebuilt from alert_history on read.
CREATE TABLE IF NOT EXISTS alerts (
    alert_id          TEXT PRIMARY KEY,
    person_id         TEXT NOT NULL,
    origin            TEXT NOT NULL,   -- 'manual' | 'auto_threshold'
    priority          TEXT NOT NULL,   -- 'low' | 'medium' | 'high'
    state             TEXT NOT NULL,
    created_at        TEXT NOT NULL,
    lat               REAL NOT NULL,
    lon               REAL NOT NULL,
    resolution        TEXT,
    resolved_at       TEXT,
    escalated_at      TEXT,
    merged_triggers   INTEGER NOT NULL DEFAULT 0,
    last_triggered_at TEXT NOT NULL,
    archived_at       TEXT NOT NULL
);

-- Append-only; rows are written once with their alert.
CREATE TABLE IF NOT EXISTS alert_history (
    alert_id   TEXT NOT NULL REFERENCES alerts(alert_id),
    version    INTEGER NOT NULL,
    from_state TEXT,               -- NULL for the creation entry
    to_state   TEXT NOT NULL,
    at         TEXT NOT NULL,
    actor      TEXT,
    unit_id    TEXT,
    resolution TEXT,
    note       TEXT,
    PRIMARY KEY (alert_id, version)
);

CREATE TABLE IF NOT EXISTS persons (
    person_id      TEXT PRIMARY KEY,
    registered_at  TEXT NOT NULL,
    profile_json   TEXT NOT NULL,
    fingerprint    TEXT NOT NULL,
    last_fix_json  TEXT,           -- JSON-encoded Fix or NULL
    last_report_at TEXT,
    safety_score   INTEGER NOT NULL,
    status         TEXT NOT NULL,  -- 'active' | 'stale' | 'offline'
    archived_at    TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS alerts_person_idx  ON alerts(person_id);
CREATE INDEX IF NOT EXISTS alerts_created_idx ON alerts(created_at);

PRAGMA user_version = 1;
";
