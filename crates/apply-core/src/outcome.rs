//! Terminal statuses and the outcome policy.
//!
//! The mapping from loop termination cause to [`RunResult`] is total and
//! deterministic: every cause yields exactly one status, and the reason is
//! non-empty whenever the status is not `Applied`.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ids::ArtifactId;

/// Terminal status of a run. Exactly three values are legal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// The irrevocable submission happened.
    Applied,
    /// Intentionally not submitted (debug mode, or the decision engine's call).
    Skipped,
    /// Could not be completed.
    Failed,
}

impl RunStatus {
    /// Parse a status string as supplied by the decision engine's `done` call.
    ///
    /// Unknown strings map to `Failed` so a confused engine cannot invent a
    /// fourth status.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "applied" => Self::Applied,
            "skipped" => Self::Skipped,
            _ => Self::Failed,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Applied => write!(f, "applied"),
            Self::Skipped => write!(f, "skipped"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Why the loop terminated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TerminationCause {
    /// The decision engine called `done` with the given status and reason.
    Done {
        /// Status named in the call.
        status: RunStatus,
        /// Reason text from the call.
        reason: String,
    },
    /// The step counter reached the configured maximum.
    MaxSteps(u32),
    /// An external cancel signal was observed.
    Cancelled,
    /// A port failed in a non-retryable way (decision port exhausted,
    /// interaction channel fault, browser infrastructure fault).
    PortFailure(String),
}

/// Reason annotation appended when debug mode downgrades an `applied` result.
pub const DEBUG_SUPPRESSED: &str = "Debug mode: submit suppressed.";

/// Terminal record of one run. Created exactly once, at loop termination.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    /// Terminal status.
    pub status: RunStatus,
    /// Human-readable reason. Always present when status is not `Applied`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Number of loop cycles taken.
    pub steps_taken: u32,
    /// References to captured artifacts (the artifacts themselves live in
    /// the artifact store).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<ArtifactId>,
}

impl RunResult {
    /// The reason text, or an empty string for an `Applied` result without one.
    #[must_use]
    pub fn reason_text(&self) -> &str {
        self.reason.as_deref().unwrap_or("")
    }
}

/// Map a termination cause to the terminal [`RunResult`].
///
/// This is the one place where the loop may override the decision engine's
/// stated intent: under debug mode a `done(applied, ...)` is downgraded to
/// `skipped` so a confused engine cannot report a real submission during a
/// verification run.
#[must_use]
pub fn resolve(
    cause: TerminationCause,
    debug: bool,
    steps_taken: u32,
    artifacts: Vec<ArtifactId>,
) -> RunResult {
    let (status, reason) = match cause {
        TerminationCause::Done { status, reason } => {
            if debug && status == RunStatus::Applied {
                let annotated = if reason.is_empty() {
                    DEBUG_SUPPRESSED.to_owned()
                } else {
                    format!("{DEBUG_SUPPRESSED} {reason}")
                };
                (RunStatus::Skipped, Some(annotated))
            } else {
                let reason = match status {
                    RunStatus::Applied => (!reason.is_empty()).then_some(reason),
                    // A non-applied result must carry a reason.
                    RunStatus::Skipped | RunStatus::Failed => Some(if reason.is_empty() {
                        format!("No reason given (status {status})")
                    } else {
                        reason
                    }),
                };
                (status, reason)
            }
        }
        TerminationCause::MaxSteps(max) => (
            RunStatus::Failed,
            Some(format!("Exceeded maximum steps ({max})")),
        ),
        TerminationCause::Cancelled => (RunStatus::Failed, Some("Run cancelled".to_owned())),
        TerminationCause::PortFailure(detail) => (RunStatus::Failed, Some(detail)),
    };

    RunResult {
        status,
        reason,
        steps_taken,
        artifacts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn done(status: RunStatus, reason: &str) -> TerminationCause {
        TerminationCause::Done {
            status,
            reason: reason.into(),
        }
    }

    #[test]
    fn applied_passes_through_without_debug() {
        let r = resolve(done(RunStatus::Applied, "submitted"), false, 7, vec![]);
        assert_eq!(r.status, RunStatus::Applied);
        assert_eq!(r.reason.as_deref(), Some("submitted"));
        assert_eq!(r.steps_taken, 7);
    }

    #[test]
    fn debug_downgrades_applied_to_skipped() {
        let r = resolve(done(RunStatus::Applied, "submitted"), true, 7, vec![]);
        assert_eq!(r.status, RunStatus::Skipped);
        assert!(r.reason_text().contains("Debug mode"));
        assert!(r.reason_text().contains("submitted"));
    }

    #[test]
    fn debug_downgrade_with_empty_reason() {
        let r = resolve(done(RunStatus::Applied, ""), true, 1, vec![]);
        assert_eq!(r.status, RunStatus::Skipped);
        assert_eq!(r.reason.as_deref(), Some(DEBUG_SUPPRESSED));
    }

    #[test]
    fn debug_does_not_touch_skipped_or_failed() {
        let r = resolve(done(RunStatus::Skipped, "dry run complete"), true, 3, vec![]);
        assert_eq!(r.status, RunStatus::Skipped);
        assert_eq!(r.reason.as_deref(), Some("dry run complete"));

        let r = resolve(done(RunStatus::Failed, "captcha"), true, 3, vec![]);
        assert_eq!(r.status, RunStatus::Failed);
        assert_eq!(r.reason.as_deref(), Some("captcha"));
    }

    #[test]
    fn non_applied_always_has_reason() {
        let r = resolve(done(RunStatus::Failed, ""), false, 2, vec![]);
        assert_eq!(r.status, RunStatus::Failed);
        assert!(!r.reason_text().is_empty());

        let r = resolve(done(RunStatus::Skipped, ""), false, 2, vec![]);
        assert!(!r.reason_text().is_empty());
    }

    #[test]
    fn max_steps_mentions_maximum() {
        let r = resolve(TerminationCause::MaxSteps(50), false, 50, vec![]);
        assert_eq!(r.status, RunStatus::Failed);
        assert!(r.reason_text().contains("maximum steps"));
        assert!(r.reason_text().contains("50"));
    }

    #[test]
    fn cancelled_is_failed_with_specific_reason() {
        let r = resolve(TerminationCause::Cancelled, false, 4, vec![]);
        assert_eq!(r.status, RunStatus::Failed);
        assert!(r.reason_text().contains("cancelled"));
    }

    #[test]
    fn port_failure_carries_detail() {
        let r = resolve(
            TerminationCause::PortFailure("Decision service unavailable after 5 attempts".into()),
            false,
            9,
            vec![],
        );
        assert_eq!(r.status, RunStatus::Failed);
        assert!(r.reason_text().contains("unavailable"));
    }

    #[test]
    fn artifacts_are_carried() {
        let r = resolve(
            done(RunStatus::Applied, "submitted"),
            false,
            2,
            vec![ArtifactId::from("shot-1")],
        );
        assert_eq!(r.artifacts.len(), 1);
    }

    #[test]
    fn parse_status_strings() {
        assert_eq!(RunStatus::parse("applied"), RunStatus::Applied);
        assert_eq!(RunStatus::parse("skipped"), RunStatus::Skipped);
        assert_eq!(RunStatus::parse("failed"), RunStatus::Failed);
        assert_eq!(RunStatus::parse("success"), RunStatus::Failed);
        assert_eq!(RunStatus::parse(""), RunStatus::Failed);
    }

    #[test]
    fn status_display_and_serde_agree() {
        for status in [RunStatus::Applied, RunStatus::Skipped, RunStatus::Failed] {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{status}\""));
        }
    }
}
