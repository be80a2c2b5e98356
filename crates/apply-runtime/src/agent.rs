//! The agent loop.
//!
//! One run: seed the transcript, then cycle through decide, validate,
//! dispatch, fold the result back, until a terminal condition. The loop
//! owns three invariants the rest of the system relies on:
//!
//! - every decision is followed by exactly one observation before the next
//!   decision is requested;
//! - the page driver is released exactly once on every terminal path,
//!   cancellation included;
//! - exactly one [`RunResult`] comes out, via the total outcome mapping
//!   (which applies the debug downgrade).

use std::sync::Arc;

use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use apply_core::ids::{ArtifactId, RunId};
use apply_core::outcome::{RunResult, RunStatus, TerminationCause, resolve};
use apply_core::task::Task;
use apply_core::tools::ToolDefinition;
use apply_core::transcript::{Transcript, TranscriptEntry};
use apply_interaction::channel::{Answer, Question, UserChannel};
use apply_llm::decision::{DecisionClient, DecisionRequest, decide_with_retry};
use apply_tools::action::Action;
use apply_tools::contract::definitions;
use apply_tools::driver::PageDriver;

use crate::artifacts::ArtifactSink;
use crate::executor;
use crate::prompts;
use crate::state::{LoopConfig, LoopState};

/// Everything a finished run hands back: the terminal result plus the full
/// transcript for bookkeeping and audit.
#[derive(Debug)]
pub struct RunReport {
    /// The terminal result.
    pub result: RunResult,
    /// The complete ordered history of the run.
    pub transcript: Transcript,
}

/// One agent loop instance. Create one per run.
pub struct AgentLoop {
    decision: Arc<dyn DecisionClient>,
    driver: Arc<dyn PageDriver>,
    channel: Arc<dyn UserChannel>,
    artifacts: Option<Arc<dyn ArtifactSink>>,
    config: LoopConfig,
    tools: Vec<ToolDefinition>,
    state: RwLock<LoopState>,
    cancel: CancellationToken,
}

impl AgentLoop {
    /// Build a loop over the three ports.
    #[must_use]
    pub fn new(
        decision: Arc<dyn DecisionClient>,
        driver: Arc<dyn PageDriver>,
        channel: Arc<dyn UserChannel>,
        config: LoopConfig,
    ) -> Self {
        Self {
            decision,
            driver,
            channel,
            artifacts: None,
            config,
            tools: definitions(),
            state: RwLock::new(LoopState::Idle),
            cancel: CancellationToken::new(),
        }
    }

    /// Builder: record screenshot artifacts in the given sink.
    #[must_use]
    pub fn with_artifacts(mut self, sink: Arc<dyn ArtifactSink>) -> Self {
        self.artifacts = Some(sink);
        self
    }

    /// Builder: use an externally owned cancellation token.
    #[must_use]
    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Handle for cancelling this run from outside.
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Current loop state.
    #[must_use]
    pub fn state(&self) -> LoopState {
        *self.state.read()
    }

    fn set_state(&self, state: LoopState) {
        *self.state.write() = state;
    }

    /// Run one task to completion.
    #[instrument(skip_all, fields(run_id = %run_id, company = %task.job.company_name, debug = task.debug))]
    pub async fn run(&self, run_id: &RunId, task: &Task, account_password: Option<&str>) -> RunReport {
        let mut transcript = Transcript::new();
        if task.debug {
            transcript.push(TranscriptEntry::system_note(
                "Debug mode active: the final submission must not be performed.",
            ));
        }
        transcript.push(TranscriptEntry::observation(prompts::build_task_prompt(
            task,
            account_password,
        )));

        self.set_state(LoopState::Running);
        info!(max_steps = task.max_steps, "run started");

        let mut steps: u32 = 0;
        let mut artifacts: Vec<ArtifactId> = Vec::new();

        let cause = loop {
            // Step boundary: cancellation and the step cap are checked
            // before any new work is started.
            if self.cancel.is_cancelled() {
                break TerminationCause::Cancelled;
            }
            if steps >= task.max_steps {
                break TerminationCause::MaxSteps(task.max_steps);
            }

            let request = DecisionRequest {
                system_prompt: prompts::SYSTEM_PROMPT,
                transcript: &transcript,
                tools: &self.tools,
            };
            let decision =
                match decide_with_retry(self.decision.as_ref(), &request, &self.config.decision_retry)
                    .await
                {
                    Ok(decision) => decision,
                    Err(e) => break TerminationCause::PortFailure(e.to_string()),
                };

            // One step per cycle, whatever branch follows. Invalid calls
            // burn budget too, so they cannot starve the run forever.
            steps += 1;
            transcript.push(TranscriptEntry::decision(decision.call.clone()));

            let action = match Action::parse(&decision.call) {
                Ok(action) => action,
                Err(message) => {
                    warn!(step = steps, tool = %decision.call.name, %message, "invalid tool call");
                    transcript.push(TranscriptEntry::error_observation(format!(
                        "Invalid tool call: {message}"
                    )));
                    continue;
                }
            };

            match action {
                Action::Done { status, reason } => {
                    break TerminationCause::Done {
                        status: RunStatus::parse(&status),
                        reason,
                    };
                }
                Action::AskUser { question, choices } => {
                    self.set_state(LoopState::AwaitingUser);
                    let ask = self.channel.ask(
                        run_id.as_str(),
                        Question {
                            text: question,
                            choices,
                        },
                        self.config.question_timeout,
                    );
                    let outcome = tokio::select! {
                        () = self.cancel.cancelled() => break TerminationCause::Cancelled,
                        outcome = ask => outcome,
                    };
                    self.set_state(LoopState::Running);
                    match outcome {
                        Ok(Answer::Text(text)) => {
                            transcript
                                .push(TranscriptEntry::observation(format!("User replied: {text}")));
                        }
                        Ok(Answer::TimedOut) => {
                            transcript.push(TranscriptEntry::error_observation(format!(
                                "No answer received within {}s",
                                self.config.question_timeout.as_secs()
                            )));
                        }
                        Err(e) => {
                            break TerminationCause::PortFailure(format!(
                                "Interaction channel failed: {e}"
                            ));
                        }
                    }
                }
                Action::ReportStatus { status, message } => {
                    let note = match &message {
                        Some(message) => format!("status report: {status}: {message}"),
                        None => format!("status report: {status}"),
                    };
                    transcript.push(TranscriptEntry::system_note(note));
                    if let Some(text) = &message {
                        if let Err(e) = self.channel.notify(text).await {
                            warn!(error = %e, "status notification failed");
                        }
                    }
                    transcript.push(TranscriptEntry::observation("Status sent"));
                }
                browser_action => {
                    match executor::execute(
                        self.driver.as_ref(),
                        &browser_action,
                        run_id,
                        &task.documents,
                        self.artifacts.as_deref(),
                        Some(self.channel.as_ref()),
                    )
                    .await
                    {
                        Ok(outcome) => {
                            if let Some(artifact) = &outcome.artifact {
                                artifacts.push(artifact.clone());
                            }
                            if outcome.failed() {
                                transcript.push(TranscriptEntry::error_observation(outcome.content));
                            } else {
                                transcript.push(TranscriptEntry::observation(outcome.content));
                            }
                        }
                        Err(fault) => {
                            break TerminationCause::PortFailure(format!("Browser failure: {fault}"));
                        }
                    }
                }
            }
        };

        // The one terminal path: release the browser exactly once, then map
        // the cause through the outcome policy.
        if let Err(e) = self.driver.close().await {
            warn!(error = %e, "browser release failed");
        }

        let result = resolve(cause, task.debug, steps, artifacts);
        self.set_state(LoopState::Terminated(result.status));
        info!(
            status = %result.status,
            steps = result.steps_taken,
            reason = result.reason_text(),
            "run terminated"
        );

        RunReport { result, transcript }
    }
}
