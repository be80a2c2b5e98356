//! Loop state and per-run configuration.

use std::time::Duration;

use apply_core::outcome::RunStatus;
use apply_core::retry::RetryConfig;

/// Where the loop currently is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopState {
    /// Created but not started.
    Idle,
    /// Cycling: deciding and dispatching.
    Running,
    /// Suspended on an open question to the human.
    AwaitingUser,
    /// Finished with the given status.
    Terminated(RunStatus),
}

/// Loop configuration shared across runs.
#[derive(Clone, Debug)]
pub struct LoopConfig {
    /// How long a run waits for a human answer before folding a timeout
    /// observation into the transcript.
    pub question_timeout: Duration,
    /// Retry policy for the decision port.
    pub decision_retry: RetryConfig,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            question_timeout: Duration::from_secs(300),
            decision_retry: RetryConfig::default(),
        }
    }
}
