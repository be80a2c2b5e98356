//! Key/value config storage for runtime-toggleable state (e.g. the bot's
//! debug flag).

use rusqlite::{OptionalExtension as _, params};

use crate::connection::ConnectionPool;
use crate::errors::Result;

/// Repository for config values.
pub struct ConfigStore {
    pool: ConnectionPool,
}

impl ConfigStore {
    /// Create a store over a pool. Migrations must already have run.
    #[must_use]
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    /// Read a config value.
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.pool.get()?;
        conn.query_row(
            "SELECT value FROM config WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()
        .map_err(Into::into)
    }

    /// Write a config value, replacing any existing one.
    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.pool.get()?;
        let _ = conn.execute(
            "INSERT INTO config (key, value) VALUES (?1, ?2) \
             ON CONFLICT (key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::new_in_memory;
    use crate::migrations::run_migrations;

    fn make_store() -> ConfigStore {
        let pool = new_in_memory().unwrap();
        run_migrations(&pool.get().unwrap()).unwrap();
        ConfigStore::new(pool)
    }

    #[test]
    fn get_missing_returns_none() {
        let store = make_store();
        assert!(store.get("debug").unwrap().is_none());
    }

    #[test]
    fn set_and_get() {
        let store = make_store();
        store.set("debug", "true").unwrap();
        assert_eq!(store.get("debug").unwrap().as_deref(), Some("true"));
    }

    #[test]
    fn set_overwrites() {
        let store = make_store();
        store.set("debug", "true").unwrap();
        store.set("debug", "false").unwrap();
        assert_eq!(store.get("debug").unwrap().as_deref(), Some("false"));
    }
}
