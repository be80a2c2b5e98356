//! Application bookkeeping around one run.
//!
//! The loop does the work; this service wraps it with the record
//! lifecycle, user-facing outcome messages, the credential side channel,
//! and debug-run metadata.

use std::sync::Arc;

use chrono::Utc;
use rand::Rng as _;
use rand::distr::Alphanumeric;
use tracing::{info, instrument, warn};

use apply_core::ids::RunId;
use apply_core::outcome::RunStatus;
use apply_core::task::Task;
use apply_core::transcript::Transcript;
use apply_interaction::channel::UserChannel;
use apply_store::applications::{ApplicationRecord, ApplicationStore};
use apply_store::credentials::{AccountCredential, CredentialStore};

use crate::agent::{AgentLoop, RunReport};
use crate::artifacts::FilesystemArtifactStore;
use crate::errors::ServiceError;

/// Bookkeeping wrapper for application runs.
pub struct ApplicationService {
    applications: Arc<ApplicationStore>,
    credentials: Arc<CredentialStore>,
    artifacts: Option<Arc<FilesystemArtifactStore>>,
}

impl ApplicationService {
    /// Build the service over its stores.
    #[must_use]
    pub fn new(applications: Arc<ApplicationStore>, credentials: Arc<CredentialStore>) -> Self {
        Self {
            applications,
            credentials,
            artifacts: None,
        }
    }

    /// Builder: write debug-run metadata to this artifact store.
    #[must_use]
    pub fn with_artifacts(mut self, artifacts: Arc<FilesystemArtifactStore>) -> Self {
        self.artifacts = Some(artifacts);
        self
    }

    /// Run one application attempt end to end.
    ///
    /// Creates the pending record, runs the loop, persists the terminal
    /// state, notifies the user, and upserts a credential when the
    /// generated account password was actually used.
    #[instrument(skip_all, fields(company = %task.job.company_name, debug = task.debug))]
    pub async fn apply(
        &self,
        run_id: RunId,
        task: Task,
        agent: &AgentLoop,
        channel: &dyn UserChannel,
    ) -> Result<RunReport, ServiceError> {
        let record = ApplicationRecord::pending(
            &task.job.company_name,
            &task.job.job_title,
            &task.job.job_url,
        );
        self.applications.add(&record)?;

        let password = generate_password();
        let started_at = Utc::now();

        let report = agent.run(&run_id, &task, Some(&password)).await;
        let result = &report.result;

        if password_was_used(&report.transcript, &password) {
            let credential = AccountCredential::new(
                task.job.board_type.as_deref().unwrap_or("unknown"),
                &company_slug(&task.job.company_name),
                &task.profile.email,
                &password,
            );
            self.credentials.upsert(&credential)?;
            info!(portal = %credential.portal, "account credential recorded");
        }

        let applied_at = (result.status == RunStatus::Applied).then(Utc::now);
        let debug_run_id = task.debug.then(|| run_id.as_str().to_owned());
        self.applications.finish(
            &record.id,
            result.status,
            result.steps_taken,
            result.reason.as_deref(),
            applied_at,
            debug_run_id.as_deref(),
        )?;

        let message = outcome_message(&task, result.status, result.reason_text());
        if let Err(e) = channel.notify(&message).await {
            warn!(error = %e, "outcome notification failed");
        }

        if task.debug {
            if let Some(artifacts) = &self.artifacts {
                let metadata = serde_json::json!({
                    "run_id": run_id.as_str(),
                    "company": task.job.company_name,
                    "job_url": task.job.job_url,
                    "mode": "debug",
                    "started_at": started_at.to_rfc3339(),
                    "ended_at": Utc::now().to_rfc3339(),
                    "outcome": result.status.to_string(),
                    "reason": result.reason,
                    "steps_taken": result.steps_taken,
                    "artifacts": result.artifacts,
                });
                if let Err(e) = artifacts.save_metadata(&run_id, &metadata) {
                    warn!(error = %e, "debug metadata write failed");
                }
            }
        }

        Ok(report)
    }
}

/// Random password for account creation, handed to the decision engine via
/// the task prompt.
fn generate_password() -> String {
    let suffix: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(16)
        .map(char::from)
        .collect();
    format!("auto-{suffix}")
}

/// Whether the run actually typed the generated password into a field.
fn password_was_used(transcript: &Transcript, password: &str) -> bool {
    transcript.decisions().any(|call| {
        call.name == "fill"
            && call
                .arguments
                .get("value")
                .and_then(serde_json::Value::as_str)
                == Some(password)
    })
}

fn company_slug(name: &str) -> String {
    name.trim().to_lowercase().replace(' ', "-")
}

fn outcome_message(task: &Task, status: RunStatus, reason: &str) -> String {
    let company = &task.job.company_name;
    let title = &task.job.job_title;
    match status {
        RunStatus::Applied => format!("Application submitted for {company} - {title}."),
        RunStatus::Skipped => {
            format!("Prepared application for {company} - {title} without submitting. {reason}")
        }
        RunStatus::Failed => format!("Failed to apply for {company}. Reason: {reason}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::LoopConfig;
    use crate::testutil::{FakePageDriver, FakeUserChannel, ScriptedDecisionClient, call};
    use apply_core::retry::RetryConfig;
    use apply_core::task::{ApplicantProfile, DocumentSet, JobPosting};
    use apply_core::tools::ToolCall;
    use apply_core::transcript::TranscriptEntry;
    use apply_store::applications::RecordStatus;
    use apply_store::migrations::run_migrations;
    use apply_store::new_in_memory;
    use serde_json::json;
    use std::time::Duration;

    fn make_service() -> (ApplicationService, Arc<ApplicationStore>, Arc<CredentialStore>) {
        let pool = new_in_memory().unwrap();
        run_migrations(&pool.get().unwrap()).unwrap();
        let applications = Arc::new(ApplicationStore::new(pool.clone()));
        let credentials = Arc::new(CredentialStore::new(pool));
        (
            ApplicationService::new(applications.clone(), credentials.clone()),
            applications,
            credentials,
        )
    }

    fn make_task() -> Task {
        Task::new(
            JobPosting {
                company_name: "Acme Corp".into(),
                job_title: "Engineer".into(),
                job_url: "https://jobs.acme.test/1".into(),
                board_type: Some("greenhouse".into()),
            },
            ApplicantProfile {
                full_name: "Jane".into(),
                email: "jane@test.com".into(),
                phone: None,
                address: None,
            },
            DocumentSet::default(),
        )
    }

    fn make_agent(decision: ScriptedDecisionClient) -> (AgentLoop, Arc<FakeUserChannel>) {
        let channel = Arc::new(FakeUserChannel::new());
        let agent = AgentLoop::new(
            Arc::new(decision),
            Arc::new(FakePageDriver::new()),
            channel.clone(),
            LoopConfig {
                question_timeout: Duration::from_millis(50),
                decision_retry: RetryConfig {
                    max_retries: 0,
                    base_delay_ms: 1,
                    max_delay_ms: 1,
                    jitter_factor: 0.0,
                },
            },
        );
        (agent, channel)
    }

    #[tokio::test]
    async fn applied_run_updates_record_and_notifies() {
        let (service, applications, _) = make_service();
        let (agent, channel) = make_agent(ScriptedDecisionClient::new(vec![call(
            "done",
            json!({"status": "applied", "reason": "submitted"}),
        )]));

        let report = service
            .apply(RunId::new(), make_task(), &agent, channel.as_ref())
            .await
            .unwrap();
        assert_eq!(report.result.status, RunStatus::Applied);

        let records = applications.list_all().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, RecordStatus::Finished(RunStatus::Applied));
        assert!(records[0].applied_at.is_some());

        assert!(channel.notifications()[0].contains("Application submitted"));
    }

    #[tokio::test]
    async fn failed_run_records_reason() {
        let (service, applications, _) = make_service();
        let (agent, channel) = make_agent(ScriptedDecisionClient::new(vec![call(
            "done",
            json!({"status": "failed", "reason": "Image-based captcha detected"}),
        )]));

        let report = service
            .apply(RunId::new(), make_task(), &agent, channel.as_ref())
            .await
            .unwrap();
        assert_eq!(report.result.status, RunStatus::Failed);

        let records = applications.list_all().unwrap();
        assert_eq!(
            records[0].failure_reason.as_deref(),
            Some("Image-based captcha detected")
        );
        assert!(channel.notifications()[0].contains("Image-based captcha"));
    }

    #[tokio::test]
    async fn debug_run_stores_run_id_on_record() {
        let (service, applications, _) = make_service();
        let (agent, channel) = make_agent(ScriptedDecisionClient::new(vec![call(
            "done",
            json!({"status": "applied", "reason": "submitted"}),
        )]));

        let run_id = RunId::from("debug-run-7");
        let report = service
            .apply(
                run_id,
                make_task().with_debug(true),
                &agent,
                channel.as_ref(),
            )
            .await
            .unwrap();
        // Debug gate downgraded the applied result.
        assert_eq!(report.result.status, RunStatus::Skipped);

        let records = applications.list_all().unwrap();
        assert_eq!(records[0].debug_run_id.as_deref(), Some("debug-run-7"));
        assert_eq!(records[0].status, RecordStatus::Finished(RunStatus::Skipped));
    }

    #[tokio::test]
    async fn no_credential_without_password_use() {
        let (service, _, credentials) = make_service();
        let (agent, channel) = make_agent(ScriptedDecisionClient::new(vec![
            call("done", json!({"status": "applied", "reason": "ok"})),
        ]));

        let _ = service
            .apply(RunId::new(), make_task(), &agent, channel.as_ref())
            .await
            .unwrap();
        // The run never filled the generated password into a field.
        assert!(credentials.list_all().unwrap().is_empty());
    }

    #[test]
    fn password_detection_matches_fill_values() {
        let mut transcript = Transcript::new();
        let mut args = serde_json::Map::new();
        let _ = args.insert("field".into(), json!("password"));
        let _ = args.insert("value".into(), json!("auto-abc123"));
        transcript.push(TranscriptEntry::decision(ToolCall::new("fill", args)));

        assert!(password_was_used(&transcript, "auto-abc123"));
        assert!(!password_was_used(&transcript, "auto-other"));
    }

    #[test]
    fn generated_passwords_are_distinct_and_prefixed() {
        let a = generate_password();
        let b = generate_password();
        assert!(a.starts_with("auto-"));
        assert_eq!(a.len(), 21);
        assert_ne!(a, b);
    }

    #[test]
    fn company_slug_normalizes() {
        assert_eq!(company_slug("Acme Corp"), "acme-corp");
        assert_eq!(company_slug("  Tilted  "), "tilted");
    }

    #[test]
    fn outcome_messages_are_specific() {
        let task = make_task();
        assert!(outcome_message(&task, RunStatus::Applied, "").contains("submitted"));
        assert!(
            outcome_message(&task, RunStatus::Skipped, "Debug mode: submit suppressed.")
                .contains("without submitting")
        );
        assert!(outcome_message(&task, RunStatus::Failed, "cancelled").contains("cancelled"));
    }
}
