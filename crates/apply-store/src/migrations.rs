//! Schema migrations, run once at startup. All statements are idempotent.

use rusqlite::Connection;

use crate::errors::Result;

const SCHEMA_SQL: &str = "\
CREATE TABLE IF NOT EXISTS applications (
    id             TEXT PRIMARY KEY,
    company_name   TEXT NOT NULL,
    job_title      TEXT NOT NULL,
    job_url        TEXT NOT NULL,
    status         TEXT NOT NULL,
    steps_taken    INTEGER NOT NULL DEFAULT 0,
    applied_at     TEXT,
    failure_reason TEXT,
    debug_run_id   TEXT,
    created_at     TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS credentials (
    id         TEXT PRIMARY KEY,
    portal     TEXT NOT NULL,
    tenant     TEXT NOT NULL,
    email      TEXT NOT NULL,
    password   TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (portal, tenant, email)
);

CREATE TABLE IF NOT EXISTS config (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_applications_status ON applications (status);
";

/// Apply the schema to a connection.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
