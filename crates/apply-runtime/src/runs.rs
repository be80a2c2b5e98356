//! Run registry: concurrent independent runs.
//!
//! One active run per task key, a semaphore capping total concurrency, and
//! a cancellation token per run. Dropping the permit on completion frees a
//! slot.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use apply_core::ids::RunId;

use crate::errors::RegistryError;

struct ActiveRun {
    run_id: RunId,
    cancel: CancellationToken,
    /// RAII guard: released when the run is removed from the registry.
    _permit: OwnedSemaphorePermit,
}

/// Registry of active runs keyed by task identity.
pub struct RunRegistry {
    max_concurrent: usize,
    semaphore: Arc<Semaphore>,
    active: Mutex<HashMap<String, ActiveRun>>,
}

impl RunRegistry {
    /// Create a registry with a concurrency cap.
    #[must_use]
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            max_concurrent,
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            active: Mutex::new(HashMap::new()),
        }
    }

    /// Start tracking a run. Returns its `CancellationToken`.
    ///
    /// Errors when the key already has an active run or the registry is at
    /// capacity.
    pub fn start(&self, key: &str, run_id: RunId) -> Result<CancellationToken, RegistryError> {
        let mut active = self.active.lock();
        if active.contains_key(key) {
            return Err(RegistryError::Busy(key.to_owned()));
        }
        let permit = Arc::clone(&self.semaphore)
            .try_acquire_owned()
            .map_err(|_| RegistryError::Capacity {
                current: active.len(),
                max: self.max_concurrent,
            })?;

        let cancel = CancellationToken::new();
        let _ = active.insert(
            key.to_owned(),
            ActiveRun {
                run_id: run_id.clone(),
                cancel: cancel.clone(),
                _permit: permit,
            },
        );
        info!(key, run_id = %run_id, "run registered");
        Ok(cancel)
    }

    /// Stop tracking a run, freeing its slot.
    pub fn complete(&self, key: &str) {
        debug!(key, "run completed");
        let _ = self.active.lock().remove(key);
    }

    /// Cancel the active run for a key. Returns true if one was cancelled.
    pub fn cancel(&self, key: &str) -> bool {
        let active = self.active.lock();
        if let Some(run) = active.get(key) {
            warn!(key, run_id = %run.run_id, "run cancelled");
            run.cancel.cancel();
            true
        } else {
            false
        }
    }

    /// The run ID for an active key, if any.
    #[must_use]
    pub fn run_id(&self, key: &str) -> Option<RunId> {
        self.active.lock().get(key).map(|r| r.run_id.clone())
    }

    /// Whether a key has an active run.
    #[must_use]
    pub fn is_active(&self, key: &str) -> bool {
        self.active.lock().contains_key(key)
    }

    /// Number of active runs.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active.lock().len()
    }

    /// Cancel every active run (shutdown).
    pub fn shutdown(&self) {
        let active = self.active.lock();
        for run in active.values() {
            run.cancel.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_returns_live_token() {
        let registry = RunRegistry::new(4);
        let token = registry.start("acme", RunId::from("r1")).unwrap();
        assert!(!token.is_cancelled());
        assert!(registry.is_active("acme"));
        assert_eq!(registry.active_count(), 1);
        assert_eq!(registry.run_id("acme").unwrap().as_str(), "r1");
    }

    #[test]
    fn duplicate_key_is_rejected() {
        let registry = RunRegistry::new(4);
        let _token = registry.start("acme", RunId::from("r1")).unwrap();
        let err = registry.start("acme", RunId::from("r2")).unwrap_err();
        assert!(err.to_string().contains("already active"));
    }

    #[test]
    fn capacity_is_enforced_and_released() {
        let registry = RunRegistry::new(2);
        let _t1 = registry.start("a", RunId::from("r1")).unwrap();
        let _t2 = registry.start("b", RunId::from("r2")).unwrap();

        let err = registry.start("c", RunId::from("r3")).unwrap_err();
        assert!(matches!(err, RegistryError::Capacity { current: 2, max: 2 }));

        registry.complete("a");
        assert_eq!(registry.active_count(), 1);
        let _t3 = registry.start("c", RunId::from("r3")).unwrap();
    }

    #[test]
    fn cancel_fires_the_token() {
        let registry = RunRegistry::new(4);
        let token = registry.start("acme", RunId::from("r1")).unwrap();
        assert!(registry.cancel("acme"));
        assert!(token.is_cancelled());
        // The run stays registered until the driver loop calls complete.
        assert!(registry.is_active("acme"));
    }

    #[test]
    fn cancel_unknown_returns_false() {
        let registry = RunRegistry::new(4);
        assert!(!registry.cancel("ghost"));
    }

    #[test]
    fn cancel_one_leaves_others_running() {
        let registry = RunRegistry::new(4);
        let t1 = registry.start("a", RunId::from("r1")).unwrap();
        let t2 = registry.start("b", RunId::from("r2")).unwrap();

        assert!(registry.cancel("a"));
        assert!(t1.is_cancelled());
        assert!(!t2.is_cancelled());
    }

    #[test]
    fn shutdown_cancels_everything() {
        let registry = RunRegistry::new(4);
        let t1 = registry.start("a", RunId::from("r1")).unwrap();
        let t2 = registry.start("b", RunId::from("r2")).unwrap();
        registry.shutdown();
        assert!(t1.is_cancelled());
        assert!(t2.is_cancelled());
    }
}
