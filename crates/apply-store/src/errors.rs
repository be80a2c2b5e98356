//! Store error types.

use thiserror::Error;

/// Errors from the persistence layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Could not get a connection from the pool.
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// SQLite-level failure.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result alias for this crate.
pub type Result<T> = std::result::Result<T, StoreError>;
