//! Application attempt records.
//!
//! One row per application attempt, created `pending` before the run starts
//! and updated to the terminal status when it ends.

use chrono::{DateTime, Utc};
use rusqlite::{Row, params};
use tracing::debug;

use apply_core::ids::RecordId;
use apply_core::outcome::RunStatus;

use crate::connection::ConnectionPool;
use crate::errors::Result;

/// Lifecycle status of a stored application record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordStatus {
    /// The run has not terminated yet.
    Pending,
    /// Terminal status from the run.
    Finished(RunStatus),
}

impl RecordStatus {
    fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Finished(RunStatus::Applied) => "applied",
            Self::Finished(RunStatus::Skipped) => "skipped",
            Self::Finished(RunStatus::Failed) => "failed",
        }
    }

    fn parse(s: &str) -> Self {
        match s {
            "applied" => Self::Finished(RunStatus::Applied),
            "skipped" => Self::Finished(RunStatus::Skipped),
            "failed" => Self::Finished(RunStatus::Failed),
            _ => Self::Pending,
        }
    }
}

/// A stored application attempt.
#[derive(Clone, Debug)]
pub struct ApplicationRecord {
    /// Record ID.
    pub id: RecordId,
    /// Company name.
    pub company_name: String,
    /// Job title.
    pub job_title: String,
    /// Posting URL.
    pub job_url: String,
    /// Lifecycle status.
    pub status: RecordStatus,
    /// Steps the run took (0 while pending).
    pub steps_taken: u32,
    /// When the submission happened, for applied records.
    pub applied_at: Option<DateTime<Utc>>,
    /// Reason text for skipped/failed records.
    pub failure_reason: Option<String>,
    /// Debug run ID, when the attempt ran in debug mode.
    pub debug_run_id: Option<String>,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
}

impl ApplicationRecord {
    /// Build a fresh pending record.
    #[must_use]
    pub fn pending(company_name: &str, job_title: &str, job_url: &str) -> Self {
        Self {
            id: RecordId::new(),
            company_name: company_name.to_owned(),
            job_title: job_title.to_owned(),
            job_url: job_url.to_owned(),
            status: RecordStatus::Pending,
            steps_taken: 0,
            applied_at: None,
            failure_reason: None,
            debug_run_id: None,
            created_at: Utc::now(),
        }
    }
}

/// Repository for application records.
pub struct ApplicationStore {
    pool: ConnectionPool,
}

impl ApplicationStore {
    /// Create a store over a pool. Migrations must already have run.
    #[must_use]
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    /// Insert a new record.
    pub fn add(&self, record: &ApplicationRecord) -> Result<()> {
        let conn = self.pool.get()?;
        let _ = conn.execute(
            "INSERT INTO applications \
             (id, company_name, job_title, job_url, status, steps_taken, \
              applied_at, failure_reason, debug_run_id, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                record.id.as_str(),
                record.company_name,
                record.job_title,
                record.job_url,
                record.status.as_str(),
                record.steps_taken,
                record.applied_at.map(|t| t.to_rfc3339()),
                record.failure_reason,
                record.debug_run_id,
                record.created_at.to_rfc3339(),
            ],
        )?;
        debug!(record_id = %record.id, "application record added");
        Ok(())
    }

    /// Update a record to its terminal state.
    pub fn finish(
        &self,
        id: &RecordId,
        status: RunStatus,
        steps_taken: u32,
        failure_reason: Option<&str>,
        applied_at: Option<DateTime<Utc>>,
        debug_run_id: Option<&str>,
    ) -> Result<()> {
        let conn = self.pool.get()?;
        let _ = conn.execute(
            "UPDATE applications SET status = ?2, steps_taken = ?3, \
             failure_reason = ?4, applied_at = ?5, debug_run_id = ?6 \
             WHERE id = ?1",
            params![
                id.as_str(),
                RecordStatus::Finished(status).as_str(),
                steps_taken,
                failure_reason,
                applied_at.map(|t| t.to_rfc3339()),
                debug_run_id,
            ],
        )?;
        Ok(())
    }

    /// Fetch one record.
    pub fn get(&self, id: &RecordId) -> Result<Option<ApplicationRecord>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT id, company_name, job_title, job_url, status, steps_taken, \
             applied_at, failure_reason, debug_run_id, created_at \
             FROM applications WHERE id = ?1",
        )?;
        let mut rows = stmt.query_map(params![id.as_str()], row_to_record)?;
        rows.next().transpose().map_err(Into::into)
    }

    /// All records, newest first.
    pub fn list_all(&self) -> Result<Vec<ApplicationRecord>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT id, company_name, job_title, job_url, status, steps_taken, \
             applied_at, failure_reason, debug_run_id, created_at \
             FROM applications ORDER BY created_at DESC",
        )?;
        let rows = stmt.query_map([], row_to_record)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }
}

fn row_to_record(row: &Row<'_>) -> std::result::Result<ApplicationRecord, rusqlite::Error> {
    let status: String = row.get(4)?;
    let applied_at: Option<String> = row.get(6)?;
    let created_at: String = row.get(9)?;
    Ok(ApplicationRecord {
        id: RecordId::from(row.get::<_, String>(0)?),
        company_name: row.get(1)?,
        job_title: row.get(2)?,
        job_url: row.get(3)?,
        status: RecordStatus::parse(&status),
        steps_taken: row.get(5)?,
        applied_at: applied_at.and_then(|s| parse_rfc3339(&s)),
        failure_reason: row.get(7)?,
        debug_run_id: row.get(8)?,
        created_at: parse_rfc3339(&created_at).unwrap_or_default(),
    })
}

fn parse_rfc3339(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::new_in_memory;
    use crate::migrations::run_migrations;

    fn make_store() -> ApplicationStore {
        let pool = new_in_memory().unwrap();
        run_migrations(&pool.get().unwrap()).unwrap();
        ApplicationStore::new(pool)
    }

    #[test]
    fn add_and_get_roundtrip() {
        let store = make_store();
        let record = ApplicationRecord::pending("Acme", "Engineer", "https://a.test/1");
        store.add(&record).unwrap();

        let loaded = store.get(&record.id).unwrap().unwrap();
        assert_eq!(loaded.company_name, "Acme");
        assert_eq!(loaded.status, RecordStatus::Pending);
        assert_eq!(loaded.steps_taken, 0);
    }

    #[test]
    fn get_unknown_returns_none() {
        let store = make_store();
        assert!(store.get(&RecordId::from("missing")).unwrap().is_none());
    }

    #[test]
    fn finish_updates_terminal_fields() {
        let store = make_store();
        let record = ApplicationRecord::pending("Acme", "Engineer", "https://a.test/1");
        store.add(&record).unwrap();

        let applied_at = Utc::now();
        store
            .finish(
                &record.id,
                RunStatus::Applied,
                12,
                None,
                Some(applied_at),
                None,
            )
            .unwrap();

        let loaded = store.get(&record.id).unwrap().unwrap();
        assert_eq!(loaded.status, RecordStatus::Finished(RunStatus::Applied));
        assert_eq!(loaded.steps_taken, 12);
        assert!(loaded.applied_at.is_some());
    }

    #[test]
    fn finish_with_failure_reason() {
        let store = make_store();
        let record = ApplicationRecord::pending("Acme", "Engineer", "https://a.test/1");
        store.add(&record).unwrap();

        store
            .finish(
                &record.id,
                RunStatus::Failed,
                3,
                Some("Image-based captcha detected"),
                None,
                None,
            )
            .unwrap();

        let loaded = store.get(&record.id).unwrap().unwrap();
        assert_eq!(loaded.status, RecordStatus::Finished(RunStatus::Failed));
        assert_eq!(
            loaded.failure_reason.as_deref(),
            Some("Image-based captcha detected")
        );
    }

    #[test]
    fn list_all_returns_rows() {
        let store = make_store();
        for i in 0..3 {
            let record =
                ApplicationRecord::pending("Acme", "Engineer", &format!("https://a.test/{i}"));
            store.add(&record).unwrap();
        }
        assert_eq!(store.list_all().unwrap().len(), 3);
    }

    #[test]
    fn debug_run_id_is_stored() {
        let store = make_store();
        let record = ApplicationRecord::pending("Acme", "Engineer", "https://a.test/1");
        store.add(&record).unwrap();
        store
            .finish(
                &record.id,
                RunStatus::Skipped,
                5,
                Some("Debug mode: submit suppressed."),
                None,
                Some("run-42"),
            )
            .unwrap();

        let loaded = store.get(&record.id).unwrap().unwrap();
        assert_eq!(loaded.debug_run_id.as_deref(), Some("run-42"));
    }
}
