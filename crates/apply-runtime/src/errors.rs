//! Runtime error types.

use thiserror::Error;

use apply_store::StoreError;

/// Errors from the run registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The task key already has an active run.
    #[error("run already active for {0}")]
    Busy(String),

    /// The registry is at its concurrency cap.
    #[error("run capacity reached ({current}/{max})")]
    Capacity {
        /// Currently active runs.
        current: usize,
        /// Configured maximum.
        max: usize,
    },
}

/// Errors from the application service (bookkeeping around a run).
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Persistence failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}
