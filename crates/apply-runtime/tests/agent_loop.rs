//! End-to-end loop scenarios over scripted ports.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use apply_core::ids::RunId;
use apply_core::outcome::RunStatus;
use apply_core::retry::RetryConfig;
use apply_core::task::{ApplicantProfile, DocumentSet, JobPosting, Task};
use apply_core::transcript::TranscriptEntry;
use apply_interaction::channel::{
    Answer, InteractionError, InteractionRouter, Question, UserChannel, await_answer,
};
use apply_runtime::agent::AgentLoop;
use apply_runtime::artifacts::FilesystemArtifactStore;
use apply_runtime::runs::RunRegistry;
use apply_runtime::state::LoopConfig;
use apply_runtime::testutil::{FakePageDriver, FakeUserChannel, ScriptedDecisionClient, call};
use async_trait::async_trait;

fn make_task(debug: bool) -> Task {
    Task::new(
        JobPosting {
            company_name: "Acme".into(),
            job_title: "Engineer".into(),
            job_url: "https://jobs.acme.test/1".into(),
            board_type: None,
        },
        ApplicantProfile {
            full_name: "Jane".into(),
            email: "jane@test.com".into(),
            phone: None,
            address: None,
        },
        DocumentSet::default(),
    )
    .with_debug(debug)
}

fn fast_config() -> LoopConfig {
    LoopConfig {
        question_timeout: Duration::from_millis(200),
        decision_retry: RetryConfig {
            max_retries: 0,
            base_delay_ms: 1,
            max_delay_ms: 1,
            jitter_factor: 0.0,
        },
    }
}

fn guest_apply_script() -> ScriptedDecisionClient {
    ScriptedDecisionClient::new(vec![
        call("goto", json!({"url": "https://jobs.acme.test/1"})),
        call("page_snapshot", json!({})),
        call("fill", json!({"field": "Full name", "value": "Jane"})),
        call("fill", json!({"field": "Email", "value": "jane@test.com"})),
        call("click", json!({"target": "Submit Application"})),
        call("done", json!({"status": "applied", "reason": "submitted"})),
    ])
}

#[tokio::test]
async fn guest_apply_flow_ends_applied() {
    let driver = Arc::new(FakePageDriver::new());
    let agent = AgentLoop::new(
        Arc::new(guest_apply_script()),
        driver.clone(),
        Arc::new(FakeUserChannel::new()),
        fast_config(),
    );

    let report = agent.run(&RunId::new(), &make_task(false), None).await;
    assert_eq!(report.result.status, RunStatus::Applied);
    assert_eq!(report.result.steps_taken, 6);
    assert!(report.result.reason_text().is_empty() || report.result.reason_text() == "submitted");

    let ops = driver.operations();
    assert!(ops.iter().any(|op| op.contains("jane@test.com")));
    assert_eq!(driver.close_calls(), 1);
}

#[tokio::test]
async fn same_flow_under_debug_is_downgraded() {
    let agent = AgentLoop::new(
        Arc::new(guest_apply_script()),
        Arc::new(FakePageDriver::new()),
        Arc::new(FakeUserChannel::new()),
        fast_config(),
    );

    let report = agent.run(&RunId::new(), &make_task(true), None).await;
    assert_eq!(report.result.status, RunStatus::Skipped);
    assert!(report.result.reason_text().contains("Debug mode"));
}

#[tokio::test]
async fn reset_code_round_trip_shows_in_fill() {
    let decision = ScriptedDecisionClient::new(vec![
        call("ask_user", json!({"question": "reset code?"})),
        call("fill", json!({"field": "reset_code", "value": "RESET-XYZ"})),
        call("done", json!({"status": "applied", "reason": "submitted"})),
    ]);
    let driver = Arc::new(FakePageDriver::new());
    let channel = Arc::new(FakeUserChannel::new().with_answer("RESET-XYZ"));
    let agent = AgentLoop::new(Arc::new(decision), driver.clone(), channel, fast_config());

    let report = agent.run(&RunId::new(), &make_task(false), None).await;
    assert_eq!(report.result.status, RunStatus::Applied);

    let filled = report.transcript.decisions().any(|c| {
        c.name == "fill" && c.arguments.get("value").and_then(|v| v.as_str()) == Some("RESET-XYZ")
    });
    assert!(filled);
    assert!(driver.operations().iter().any(|op| op == "fill reset_code=RESET-XYZ"));
}

#[tokio::test]
async fn immediate_captcha_abort_is_honored() {
    let decision = ScriptedDecisionClient::new(vec![call(
        "done",
        json!({"status": "failed", "reason": "Image-based captcha detected"}),
    )]);
    let agent = AgentLoop::new(
        Arc::new(decision),
        Arc::new(FakePageDriver::new()),
        Arc::new(FakeUserChannel::new()),
        fast_config(),
    );

    let report = agent.run(&RunId::new(), &make_task(false), None).await;
    assert_eq!(report.result.status, RunStatus::Failed);
    assert!(report.result.reason_text().contains("Image-based captcha"));
    assert_eq!(report.result.steps_taken, 1);
}

#[tokio::test]
async fn invalid_calls_across_full_budget_fail_with_max_steps() {
    let decision =
        ScriptedDecisionClient::new(vec![]).repeating(call("frobnicate", json!({})));
    let agent = AgentLoop::new(
        Arc::new(decision),
        Arc::new(FakePageDriver::new()),
        Arc::new(FakeUserChannel::new()),
        fast_config(),
    );

    let task = make_task(false).with_max_steps(7);
    let report = agent.run(&RunId::new(), &task, None).await;
    assert_eq!(report.result.status, RunStatus::Failed);
    assert_eq!(report.result.steps_taken, 7);
    assert!(report.result.reason_text().contains("maximum steps"));

    // Every rejected decision got its corrective observation.
    let corrections = report
        .transcript
        .entries()
        .iter()
        .filter(|e| {
            matches!(e, TranscriptEntry::Observation { text, .. } if text.starts_with("Invalid tool call"))
        })
        .count();
    assert_eq!(corrections, 7);
}

#[tokio::test]
async fn screenshots_produce_artifact_references() {
    let dir = tempfile::tempdir().unwrap();
    let sink = Arc::new(FilesystemArtifactStore::new(dir.path()));
    let decision = ScriptedDecisionClient::new(vec![
        call("screenshot", json!({"label": "review"})),
        call("done", json!({"status": "skipped", "reason": "dry run"})),
    ]);
    let agent = AgentLoop::new(
        Arc::new(decision),
        Arc::new(FakePageDriver::new()),
        Arc::new(FakeUserChannel::new()),
        fast_config(),
    )
    .with_artifacts(sink);

    let run_id = RunId::from("shot-run");
    let report = agent.run(&run_id, &make_task(false), None).await;
    assert_eq!(report.result.artifacts.len(), 1);
    let artifact = &report.result.artifacts[0];
    assert!(dir.path().join(artifact.as_str()).exists());
}

// ─────────────────────────────────────────────────────────────────────────────
// Router-backed channel: suspension semantics across concurrent runs
// ─────────────────────────────────────────────────────────────────────────────

/// Minimal channel over the shared router, resolved from test code the way
/// a chat transport would resolve it from incoming messages.
struct RouterChannel {
    router: Arc<InteractionRouter>,
}

#[async_trait]
impl UserChannel for RouterChannel {
    async fn ask(
        &self,
        run_key: &str,
        question: Question,
        timeout: Duration,
    ) -> Result<Answer, InteractionError> {
        let (_pending, rx) = self.router.open(run_key, question)?;
        await_answer(&self.router, run_key, rx, timeout).await
    }

    async fn notify(&self, _message: &str) -> Result<(), InteractionError> {
        Ok(())
    }
}

#[tokio::test]
async fn one_pending_question_per_run_and_no_cross_talk() {
    let router = Arc::new(InteractionRouter::new());

    let make_agent = |router: &Arc<InteractionRouter>| {
        let decision = ScriptedDecisionClient::new(vec![
            call("ask_user", json!({"question": "salary?"})),
            call("done", json!({"status": "failed", "reason": "answer recorded, stopping"})),
        ]);
        AgentLoop::new(
            Arc::new(decision),
            Arc::new(FakePageDriver::new()),
            Arc::new(RouterChannel {
                router: router.clone(),
            }),
            LoopConfig {
                question_timeout: Duration::from_secs(5),
                ..fast_config()
            },
        )
    };

    let agent_a = make_agent(&router);
    let agent_b = make_agent(&router);
    let task = make_task(false);

    let run_a = tokio::spawn({
        let task = task.clone();
        async move { agent_a.run(&RunId::from("run-a"), &task, None).await }
    });
    let run_b = tokio::spawn({
        let task = task.clone();
        async move { agent_b.run(&RunId::from("run-b"), &task, None).await }
    });

    // Both runs suspend on their own question.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(router.has_pending("run-a"));
    assert!(router.has_pending("run-b"));
    assert_eq!(router.pending_count(), 2);

    // Answering one run resumes only that run.
    assert!(router.resolve("run-b", "90k"));
    let report_b = run_b.await.unwrap();
    assert!(report_b.transcript.entries().iter().any(|e| {
        matches!(e, TranscriptEntry::Observation { text, .. } if text.contains("90k"))
    }));
    assert!(router.has_pending("run-a"));

    assert!(router.resolve("run-a", "120k"));
    let report_a = run_a.await.unwrap();
    assert!(report_a.transcript.entries().iter().any(|e| {
        matches!(e, TranscriptEntry::Observation { text, .. } if text.contains("120k"))
    }));
}

#[tokio::test]
async fn cancellation_during_suspension_releases_browser_once() {
    let router = Arc::new(InteractionRouter::new());
    let decision = ScriptedDecisionClient::new(vec![call(
        "ask_user",
        json!({"question": "still there?"}),
    )]);
    let driver = Arc::new(FakePageDriver::new());
    let agent = AgentLoop::new(
        Arc::new(decision),
        driver.clone(),
        Arc::new(RouterChannel {
            router: router.clone(),
        }),
        LoopConfig {
            question_timeout: Duration::from_secs(30),
            ..fast_config()
        },
    );
    let cancel = agent.cancel_token();

    let handle = tokio::spawn({
        let task = make_task(false);
        async move { agent.run(&RunId::from("run-c"), &task, None).await }
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(router.has_pending("run-c"));
    cancel.cancel();

    let report = handle.await.unwrap();
    assert_eq!(report.result.status, RunStatus::Failed);
    assert!(report.result.reason_text().contains("cancelled"));
    assert_eq!(driver.close_calls(), 1);
}

#[tokio::test]
async fn registry_tracks_and_cancels_concurrent_runs() {
    let registry = Arc::new(RunRegistry::new(2));
    let decision = ScriptedDecisionClient::new(vec![]).repeating(call("wait", json!({"seconds": 1})));
    let driver = Arc::new(FakePageDriver::new());

    let token = registry.start("acme", RunId::from("run-1")).unwrap();
    let agent = AgentLoop::new(
        Arc::new(decision),
        driver.clone(),
        Arc::new(FakeUserChannel::new()),
        fast_config(),
    )
    .with_cancel_token(token);

    let handle = tokio::spawn({
        let task = make_task(false);
        async move { agent.run(&RunId::from("run-1"), &task, None).await }
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(registry.cancel("acme"));
    let report = handle.await.unwrap();
    registry.complete("acme");

    assert_eq!(report.result.status, RunStatus::Failed);
    assert!(report.result.reason_text().contains("cancelled"));
    assert_eq!(registry.active_count(), 0);
}
