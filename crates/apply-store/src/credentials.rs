//! Account credentials created during application runs.
//!
//! Keyed by (portal, tenant, email). The agent loop hands records here as a
//! side channel; nothing reads them back during the same run.

use chrono::{DateTime, Utc};
use rusqlite::{Row, params};
use tracing::debug;

use apply_core::ids::CredentialId;

use crate::connection::ConnectionPool;
use crate::errors::Result;

/// A stored account credential.
#[derive(Clone, Debug)]
pub struct AccountCredential {
    /// Credential ID.
    pub id: CredentialId,
    /// Job board the account lives on (e.g. "greenhouse").
    pub portal: String,
    /// Company slug within the portal.
    pub tenant: String,
    /// Account email.
    pub email: String,
    /// Account password.
    pub password: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
}

impl AccountCredential {
    /// Build a fresh credential record.
    #[must_use]
    pub fn new(portal: &str, tenant: &str, email: &str, password: &str) -> Self {
        let now = Utc::now();
        Self {
            id: CredentialId::new(),
            portal: portal.to_owned(),
            tenant: tenant.to_owned(),
            email: email.to_owned(),
            password: password.to_owned(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Mask a secret for display: first and last character kept, the rest
/// starred. Short secrets are fully starred.
#[must_use]
pub fn mask_secret(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.is_empty() {
        return String::new();
    }
    if chars.len() <= 3 {
        return "*".repeat(chars.len());
    }
    let mut masked = String::new();
    masked.push(chars[0]);
    masked.push_str(&"*".repeat(chars.len() - 2));
    masked.push(chars[chars.len() - 1]);
    masked
}

/// Repository for account credentials.
pub struct CredentialStore {
    pool: ConnectionPool,
}

impl CredentialStore {
    /// Create a store over a pool. Migrations must already have run.
    #[must_use]
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    /// Insert or update the credential for (portal, tenant, email).
    pub fn upsert(&self, credential: &AccountCredential) -> Result<()> {
        let conn = self.pool.get()?;
        let _ = conn.execute(
            "INSERT INTO credentials \
             (id, portal, tenant, email, password, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) \
             ON CONFLICT (portal, tenant, email) DO UPDATE SET \
             password = excluded.password, updated_at = excluded.updated_at",
            params![
                credential.id.as_str(),
                credential.portal,
                credential.tenant,
                credential.email,
                credential.password,
                credential.created_at.to_rfc3339(),
                credential.updated_at.to_rfc3339(),
            ],
        )?;
        debug!(portal = %credential.portal, tenant = %credential.tenant, "credential upserted");
        Ok(())
    }

    /// Look up a credential.
    pub fn get(
        &self,
        portal: &str,
        tenant: &str,
        email: &str,
    ) -> Result<Option<AccountCredential>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT id, portal, tenant, email, password, created_at, updated_at \
             FROM credentials WHERE portal = ?1 AND tenant = ?2 AND email = ?3",
        )?;
        let mut rows = stmt.query_map(params![portal, tenant, email], row_to_credential)?;
        rows.next().transpose().map_err(Into::into)
    }

    /// All credentials, oldest first.
    pub fn list_all(&self) -> Result<Vec<AccountCredential>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT id, portal, tenant, email, password, created_at, updated_at \
             FROM credentials ORDER BY created_at",
        )?;
        let rows = stmt.query_map([], row_to_credential)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }
}

fn row_to_credential(row: &Row<'_>) -> std::result::Result<AccountCredential, rusqlite::Error> {
    let created_at: String = row.get(5)?;
    let updated_at: String = row.get(6)?;
    Ok(AccountCredential {
        id: CredentialId::from(row.get::<_, String>(0)?),
        portal: row.get(1)?,
        tenant: row.get(2)?,
        email: row.get(3)?,
        password: row.get(4)?,
        created_at: parse_rfc3339(&created_at),
        updated_at: parse_rfc3339(&updated_at),
    })
}

fn parse_rfc3339(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_default()
}
