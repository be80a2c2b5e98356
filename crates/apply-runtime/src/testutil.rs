//! Shared scripted fakes for loop and service tests.
//!
//! A scripted decision client plays back a fixed sequence of tool calls, a
//! fake page driver records operations and answers with canned results, and
//! a fake user channel replays prepared answers.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use apply_core::tools::ToolCall;
use apply_interaction::channel::{Answer, InteractionError, Question, UserChannel};
use apply_llm::decision::{Decision, DecisionClient, DecisionError, DecisionRequest};
use apply_tools::action::{DocumentKind, ScrollDirection};
use apply_tools::driver::{CapturedImage, DriveOutcome, PageDriver};
use apply_tools::errors::DriverFault;

/// Build a tool call from a name and JSON arguments.
#[must_use]
pub fn call(name: &str, args: Value) -> ToolCall {
    ToolCall::new(name, args.as_object().cloned().unwrap_or_default())
}

// ─────────────────────────────────────────────────────────────────────────────
// Scripted decision client
// ─────────────────────────────────────────────────────────────────────────────

/// One scripted decision step.
pub enum ScriptStep {
    /// Return this call.
    Call(ToolCall),
    /// Fail with this HTTP status.
    Fail(u16),
}

/// Decision client that plays back a script.
pub struct ScriptedDecisionClient {
    steps: Mutex<VecDeque<ScriptStep>>,
    /// When the script runs dry: repeat this call forever, if set.
    repeat: Option<ToolCall>,
    calls_made: AtomicU32,
}

impl ScriptedDecisionClient {
    /// Play back the given calls, then fail with HTTP 500 when exhausted.
    #[must_use]
    pub fn new(calls: Vec<ToolCall>) -> Self {
        Self {
            steps: Mutex::new(calls.into_iter().map(ScriptStep::Call).collect()),
            repeat: None,
            calls_made: AtomicU32::new(0),
        }
    }

    /// Play back raw steps (calls and failures).
    #[must_use]
    pub fn with_steps(steps: Vec<ScriptStep>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            repeat: None,
            calls_made: AtomicU32::new(0),
        }
    }

    /// After the script runs dry, answer every request with this call.
    #[must_use]
    pub fn repeating(mut self, call: ToolCall) -> Self {
        self.repeat = Some(call);
        self
    }

    /// Number of decide calls served.
    #[must_use]
    pub fn calls_made(&self) -> u32 {
        self.calls_made.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DecisionClient for ScriptedDecisionClient {
    async fn decide(&self, _request: &DecisionRequest<'_>) -> Result<Decision, DecisionError> {
        let _ = self.calls_made.fetch_add(1, Ordering::SeqCst);
        let step = self.steps.lock().pop_front();
        match step {
            Some(ScriptStep::Call(call)) => Ok(Decision {
                call,
                commentary: None,
            }),
            Some(ScriptStep::Fail(status)) => Err(DecisionError::Http {
                status,
                message: "scripted failure".into(),
            }),
            None => match &self.repeat {
                Some(call) => Ok(Decision {
                    call: call.clone(),
                    commentary: None,
                }),
                None => Err(DecisionError::Http {
                    status: 500,
                    message: "script exhausted".into(),
                }),
            },
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Fake page driver
// ─────────────────────────────────────────────────────────────────────────────

/// In-memory page driver that records operations.
pub struct FakePageDriver {
    operations: Mutex<Vec<String>>,
    missing: Mutex<HashSet<String>>,
    snapshot_text: Mutex<String>,
    faulty: AtomicBool,
    close_calls: AtomicU32,
}

impl FakePageDriver {
    /// A driver where everything succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self {
            operations: Mutex::new(Vec::new()),
            missing: Mutex::new(HashSet::new()),
            snapshot_text: Mutex::new("URL: about:blank\nVISIBLE TEXT:\n(blank)".into()),
            faulty: AtomicBool::new(false),
            close_calls: AtomicU32::new(0),
        }
    }

    /// Builder: the given target/field reports not-found.
    #[must_use]
    pub fn with_missing_element(self, target: &str) -> Self {
        let _ = self.missing.lock().insert(target.to_owned());
        self
    }

    /// Builder: every operation faults (browser gone).
    #[must_use]
    pub fn with_fault(self) -> Self {
        self.faulty.store(true, Ordering::SeqCst);
        self
    }

    /// Builder: what `snapshot` returns.
    #[must_use]
    pub fn with_snapshot(self, text: &str) -> Self {
        *self.snapshot_text.lock() = text.to_owned();
        self
    }

    /// Recorded operations, in order.
    #[must_use]
    pub fn operations(&self) -> Vec<String> {
        self.operations.lock().clone()
    }

    /// How many times `close` was called.
    #[must_use]
    pub fn close_calls(&self) -> u32 {
        self.close_calls.load(Ordering::SeqCst)
    }

    fn check(&self, op: String) -> Result<(), DriverFault> {
        if self.faulty.load(Ordering::SeqCst) {
            return Err(DriverFault::Unavailable("browser gone".into()));
        }
        self.operations.lock().push(op);
        Ok(())
    }

    fn found(&self, key: &str) -> bool {
        !self.missing.lock().contains(key)
    }
}

impl Default for FakePageDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PageDriver for FakePageDriver {
    async fn snapshot(&self) -> Result<DriveOutcome, DriverFault> {
        self.check("snapshot".into())?;
        Ok(DriveOutcome::Done(self.snapshot_text.lock().clone()))
    }

    async fn goto(&self, url: &str) -> Result<DriveOutcome, DriverFault> {
        self.check(format!("goto {url}"))?;
        Ok(DriveOutcome::Done(format!("Navigated to {url}")))
    }

    async fn click(&self, target: &str) -> Result<DriveOutcome, DriverFault> {
        self.check(format!("click {target}"))?;
        if self.found(target) {
            Ok(DriveOutcome::Done(format!("Clicked: {target}")))
        } else {
            Ok(DriveOutcome::NotFound(format!("Element not found: {target}")))
        }
    }

    async fn fill(&self, field: &str, value: &str) -> Result<DriveOutcome, DriverFault> {
        self.check(format!("fill {field}={value}"))?;
        if self.found(field) {
            Ok(DriveOutcome::Done(format!("Filled {field}")))
        } else {
            Ok(DriveOutcome::NotFound(format!("Field not found: {field}")))
        }
    }

    async fn select_option(&self, field: &str, value: &str) -> Result<DriveOutcome, DriverFault> {
        self.check(format!("select {field}={value}"))?;
        if self.found(field) {
            Ok(DriveOutcome::Done(format!("Selected '{value}' in {field}")))
        } else {
            Ok(DriveOutcome::NotFound(format!("Dropdown not found: {field}")))
        }
    }

    async fn upload_file(
        &self,
        field: &str,
        document: DocumentKind,
        path: &str,
    ) -> Result<DriveOutcome, DriverFault> {
        self.check(format!("upload {field}<-{path}"))?;
        if self.found(field) {
            Ok(DriveOutcome::Done(format!(
                "Uploaded {} to {field}",
                document.as_str()
            )))
        } else {
            Ok(DriveOutcome::NotFound(format!("File input not found: {field}")))
        }
    }

    async fn scroll(&self, direction: ScrollDirection) -> Result<DriveOutcome, DriverFault> {
        self.check(format!("scroll {}", direction.as_str()))?;
        Ok(DriveOutcome::Done(format!("Scrolled {}", direction.as_str())))
    }

    async fn wait(&self, seconds: u64) -> Result<DriveOutcome, DriverFault> {
        self.check(format!("wait {seconds}"))?;
        // Scaled down so waiting scripts yield to the scheduler without
        // slowing the suite.
        tokio::time::sleep(Duration::from_millis(seconds.min(100) * 10)).await;
        Ok(DriveOutcome::Done(format!("Waited up to {seconds}s")))
    }

    async fn screenshot(&self) -> Result<CapturedImage, DriverFault> {
        self.check("screenshot".into())?;
        // 1x1 transparent PNG.
        Ok(CapturedImage {
            base64_png: "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mP8z8BQDwAEhQGAhKmMIQAAAABJRU5ErkJggg==".into(),
        })
    }

    async fn current_url(&self) -> Result<DriveOutcome, DriverFault> {
        self.check("current_url".into())?;
        Ok(DriveOutcome::Done("Current URL: about:blank".into()))
    }

    async fn close(&self) -> Result<(), DriverFault> {
        let _ = self.close_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Fake user channel
// ─────────────────────────────────────────────────────────────────────────────

/// User channel replaying prepared answers.
pub struct FakeUserChannel {
    answers: Mutex<VecDeque<Answer>>,
    asked: Mutex<Vec<Question>>,
    notifications: Mutex<Vec<String>>,
    fail: AtomicBool,
}

impl FakeUserChannel {
    /// A channel that answers every question with `TimedOut`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            answers: Mutex::new(VecDeque::new()),
            asked: Mutex::new(Vec::new()),
            notifications: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
        }
    }

    /// Builder: queue an answer.
    #[must_use]
    pub fn with_answer(self, text: &str) -> Self {
        self.answers.lock().push_back(Answer::Text(text.to_owned()));
        self
    }

    /// Builder: every ask fails with a transport fault.
    #[must_use]
    pub fn with_failure(self) -> Self {
        self.fail.store(true, Ordering::SeqCst);
        self
    }

    /// Questions asked so far.
    #[must_use]
    pub fn asked(&self) -> Vec<Question> {
        self.asked.lock().clone()
    }

    /// Notifications sent so far.
    #[must_use]
    pub fn notifications(&self) -> Vec<String> {
        self.notifications.lock().clone()
    }
}

impl Default for FakeUserChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UserChannel for FakeUserChannel {
    async fn ask(
        &self,
        _run_key: &str,
        question: Question,
        _timeout: Duration,
    ) -> Result<Answer, InteractionError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(InteractionError::Transport {
                detail: "fake transport down".into(),
            });
        }
        self.asked.lock().push(question);
        Ok(self
            .answers
            .lock()
            .pop_front()
            .unwrap_or(Answer::TimedOut))
    }

    async fn notify(&self, message: &str) -> Result<(), InteractionError> {
        self.notifications.lock().push(message.to_owned());
        Ok(())
    }
}
