//! Question/answer plumbing shared by all transports.
//!
//! A run asks at most one question at a time. The [`InteractionRouter`] is
//! the shared state between many suspended runs and one transport: it holds
//! one pending slot per run key, and the transport resolves a slot when the
//! human answers. The router is a router, not a state holder beyond that;
//! cross-run interference is impossible because slots are keyed by run.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::debug;

use apply_core::ids::QuestionId;

/// A question routed to the human.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Question {
    /// Question text.
    pub text: String,
    /// Suggested answers, possibly empty.
    pub choices: Vec<String>,
}

impl Question {
    /// Build a free-text question.
    #[must_use]
    pub fn free_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            choices: Vec::new(),
        }
    }
}

/// Outcome of asking: either the human answered or the wait elapsed.
///
/// A timeout is not a channel fault; the loop folds it into the transcript
/// and lets the decision engine react.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Answer {
    /// The human's reply text.
    Text(String),
    /// No reply arrived within the configured wait.
    TimedOut,
}

/// Non-retryable interaction channel faults. These end the run.
#[derive(Debug, Error)]
pub enum InteractionError {
    /// A question is already outstanding for this run.
    #[error("a question is already pending for run {run_key}")]
    AlreadyPending {
        /// Run key with the open question.
        run_key: String,
    },

    /// The transport failed in a way that will not recover.
    #[error("interaction transport failed: {detail}")]
    Transport {
        /// Description of the failure.
        detail: String,
    },

    /// The channel was shut down while the run was waiting.
    #[error("interaction channel closed")]
    Closed,
}

/// Bookkeeping for one outstanding question.
#[derive(Clone, Debug)]
pub struct PendingQuestion {
    /// Unique ID of this question.
    pub id: QuestionId,
    /// The question.
    pub question: Question,
    /// When the question was opened.
    pub asked_at: DateTime<Utc>,
    /// How many questions this run has asked so far (1-based). There is no
    /// cap here; the run's step budget is the only hard bound on re-asking.
    pub attempt: u32,
}

struct PendingSlot {
    pending: PendingQuestion,
    tx: oneshot::Sender<String>,
}

/// Shared pending-question state, keyed by run.
#[derive(Default)]
pub struct InteractionRouter {
    slots: DashMap<String, PendingSlot>,
    asked_counts: DashMap<String, u32>,
}

impl InteractionRouter {
    /// Create an empty router.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a pending question for a run.
    ///
    /// Fails with [`InteractionError::AlreadyPending`] if the run already
    /// has one outstanding; the loop never dispatches a second question
    /// before the first resolves.
    pub fn open(
        &self,
        run_key: &str,
        question: Question,
    ) -> Result<(PendingQuestion, oneshot::Receiver<String>), InteractionError> {
        if self.slots.contains_key(run_key) {
            return Err(InteractionError::AlreadyPending {
                run_key: run_key.to_owned(),
            });
        }

        let attempt = {
            let mut count = self.asked_counts.entry(run_key.to_owned()).or_insert(0);
            *count += 1;
            *count
        };

        let pending = PendingQuestion {
            id: QuestionId::new(),
            question,
            asked_at: Utc::now(),
            attempt,
        };
        let (tx, rx) = oneshot::channel();
        let _ = self.slots.insert(
            run_key.to_owned(),
            PendingSlot {
                pending: pending.clone(),
                tx,
            },
        );
        debug!(run_key, question_id = %pending.id, attempt, "question opened");
        Ok((pending, rx))
    }

    /// Resolve the pending question for a run. Returns false if none is open.
    pub fn resolve(&self, run_key: &str, text: impl Into<String>) -> bool {
        match self.slots.remove(run_key) {
            Some((_, slot)) => {
                debug!(run_key, question_id = %slot.pending.id, "question resolved");
                slot.tx.send(text.into()).is_ok()
            }
            None => false,
        }
    }

    /// Resolve a pending question by its question ID. Returns the run key
    /// that was resolved, or `None` when no run holds that question.
    pub fn resolve_by_id(&self, question_id: &QuestionId, text: impl Into<String>) -> Option<String> {
        let run_key = self
            .slots
            .iter()
            .find(|entry| entry.value().pending.id == *question_id)
            .map(|entry| entry.key().clone())?;
        self.resolve(&run_key, text).then_some(run_key)
    }

    /// Resolve the oldest pending question across all runs. Used by
    /// single-chat transports where an incoming reply is not addressed to a
    /// specific run. Returns the run key that was resolved.
    pub fn resolve_oldest(&self, text: impl Into<String>) -> Option<String> {
        let oldest = self
            .slots
            .iter()
            .min_by_key(|entry| entry.value().pending.asked_at)
            .map(|entry| entry.key().clone())?;
        if self.resolve(&oldest, text) {
            Some(oldest)
        } else {
            None
        }
    }

    /// Drop the pending question for a run without answering (timeout or
    /// cancellation path).
    pub fn abandon(&self, run_key: &str) {
        if self.slots.remove(run_key).is_some() {
            debug!(run_key, "question abandoned");
        }
    }

    /// Whether a run has an open question.
    #[must_use]
    pub fn has_pending(&self, run_key: &str) -> bool {
        self.slots.contains_key(run_key)
    }

    /// The open question for a run, if any.
    #[must_use]
    pub fn pending(&self, run_key: &str) -> Option<PendingQuestion> {
        self.slots.get(run_key).map(|slot| slot.pending.clone())
    }

    /// Number of runs currently waiting on an answer.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.slots.len()
    }

    /// Drop every pending question (shutdown). Waiting runs observe a
    /// closed channel.
    pub fn cancel_all(&self) {
        self.slots.clear();
        self.asked_counts.clear();
    }
}

/// The user-facing side of the interaction channel.
#[async_trait]
pub trait UserChannel: Send + Sync {
    /// Ask a question and wait for the answer or the timeout.
    ///
    /// Suspends the calling run only. A timeout yields `Ok(Answer::TimedOut)`;
    /// an `Err` is a non-retryable channel fault.
    async fn ask(
        &self,
        run_key: &str,
        question: Question,
        timeout: Duration,
    ) -> Result<Answer, InteractionError>;

    /// Send an informational message. No reply expected.
    async fn notify(&self, message: &str) -> Result<(), InteractionError>;

    /// Send an image with a caption (e.g. a captcha screenshot).
    ///
    /// Transports without image support fall back to the caption text.
    async fn send_image(&self, caption: &str, _base64_png: &str) -> Result<(), InteractionError> {
        self.notify(caption).await
    }
}

/// Wait on an opened slot, translating the usual endings.
///
/// Shared by transports: a received text is an [`Answer::Text`], an elapsed
/// timeout abandons the slot and yields [`Answer::TimedOut`], and a dropped
/// sender (router shutdown) is a channel fault.
pub async fn await_answer(
    router: &InteractionRouter,
    run_key: &str,
    rx: oneshot::Receiver<String>,
    timeout: Duration,
) -> Result<Answer, InteractionError> {
    match tokio::time::timeout(timeout, rx).await {
        Ok(Ok(text)) => Ok(Answer::Text(text)),
        Ok(Err(_)) => Err(InteractionError::Closed),
        Err(_) => {
            router.abandon(run_key);
            Ok(Answer::TimedOut)
        }
    }
}
