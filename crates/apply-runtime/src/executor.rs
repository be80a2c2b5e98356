//! Dispatch of one validated action to the page driver.
//!
//! Expected failures come back as error-flagged [`ToolOutcome`]s that the
//! loop folds into the transcript; only a [`DriverFault`] propagates and
//! terminates the run.

use tracing::warn;

use apply_core::ids::RunId;
use apply_core::task::DocumentSet;
use apply_core::tools::{ToolOutcome, error_outcome, text_outcome};
use apply_interaction::channel::UserChannel;
use apply_tools::action::{Action, DocumentKind};
use apply_tools::driver::{DriveOutcome, PageDriver};
use apply_tools::errors::DriverFault;

use crate::artifacts::ArtifactSink;

/// Execute one browser-facing action.
///
/// Screenshots are forwarded to the user channel (so a human can read a
/// text captcha) as well as stored in the artifact sink. `ask_user`,
/// `report_status`, and `done` are handled by the loop itself; passing
/// them here yields an error outcome rather than a panic.
pub async fn execute(
    driver: &dyn PageDriver,
    action: &Action,
    run_id: &RunId,
    documents: &DocumentSet,
    artifacts: Option<&dyn ArtifactSink>,
    channel: Option<&dyn UserChannel>,
) -> Result<ToolOutcome, DriverFault> {
    match action {
        Action::PageSnapshot => Ok(from_drive(driver.snapshot().await?)),
        Action::Goto { url } => Ok(from_drive(driver.goto(url).await?)),
        Action::Click { target } => Ok(from_drive(driver.click(target).await?)),
        Action::Fill { field, value } => Ok(from_drive(driver.fill(field, value).await?)),
        Action::SelectOption { field, value } => {
            Ok(from_drive(driver.select_option(field, value).await?))
        }
        Action::UploadFile { field, document } => {
            let path = match document {
                DocumentKind::Resume => documents.resume_path.as_deref(),
                DocumentKind::CoverLetter => documents.cover_letter_path.as_deref(),
            };
            let Some(path) = path.filter(|p| !p.is_empty()) else {
                return Ok(error_outcome(format!(
                    "No {} file configured",
                    document.as_str()
                )));
            };
            Ok(from_drive(
                driver.upload_file(field, *document, path).await?,
            ))
        }
        Action::Scroll { direction } => Ok(from_drive(driver.scroll(*direction).await?)),
        Action::Wait { seconds } => Ok(from_drive(driver.wait(*seconds).await?)),
        Action::Screenshot { label } => {
            let image = driver.screenshot().await?;
            if let Some(channel) = channel {
                if let Err(e) = channel
                    .send_image(&format!("Screenshot: {label}"), &image.base64_png)
                    .await
                {
                    warn!(error = %e, "screenshot delivery failed");
                }
            }
            match artifacts {
                Some(sink) => match sink.save_screenshot(run_id, label, &image.base64_png) {
                    Ok(artifact) => Ok(text_outcome(format!("Screenshot captured: {label}"))
                        .with_artifact(artifact)),
                    Err(e) => {
                        warn!(error = %e, "screenshot could not be stored");
                        Ok(text_outcome(format!(
                            "Screenshot captured but not stored: {e}"
                        )))
                    }
                },
                None => Ok(text_outcome(format!("Screenshot captured: {label}"))),
            }
        }
        Action::GetCurrentUrl => Ok(from_drive(driver.current_url().await?)),
        Action::AskUser { .. } | Action::ReportStatus { .. } | Action::Done { .. } => {
            Ok(error_outcome(format!(
                "{} is not a page operation",
                action.tool_name()
            )))
        }
    }
}

fn from_drive(outcome: DriveOutcome) -> ToolOutcome {
    if outcome.is_failure() {
        error_outcome(outcome.message())
    } else {
        text_outcome(outcome.message())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::FakePageDriver;
    use apply_tools::action::ScrollDirection;

    fn run_id() -> RunId {
        RunId::from("run-test")
    }

    fn documents() -> DocumentSet {
        DocumentSet {
            resume_path: Some("/data/resume.pdf".into()),
            cover_letter_path: None,
        }
    }

    #[tokio::test]
    async fn click_success_maps_to_text_outcome() {
        let driver = FakePageDriver::new();
        let action = Action::Click {
            target: "Apply".into(),
        };
        let outcome = execute(&driver, &action, &run_id(), &documents(), None, None)
            .await
            .unwrap();
        assert!(!outcome.failed());
        assert_eq!(outcome.content, "Clicked: Apply");
    }

    #[tokio::test]
    async fn missing_element_maps_to_error_outcome() {
        let driver = FakePageDriver::new().with_missing_element("Ghost");
        let action = Action::Click {
            target: "Ghost".into(),
        };
        let outcome = execute(&driver, &action, &run_id(), &documents(), None, None)
            .await
            .unwrap();
        assert!(outcome.failed());
        assert!(outcome.content.contains("Element not found"));
    }

    #[tokio::test]
    async fn upload_without_configured_document_is_nonfatal() {
        let driver = FakePageDriver::new();
        let action = Action::UploadFile {
            field: "cover".into(),
            document: DocumentKind::CoverLetter,
        };
        let outcome = execute(&driver, &action, &run_id(), &documents(), None, None)
            .await
            .unwrap();
        assert!(outcome.failed());
        assert!(outcome.content.contains("No cover_letter file configured"));
        // The driver was never asked to do anything.
        assert!(driver.operations().is_empty());
    }

    #[tokio::test]
    async fn upload_with_configured_document_reaches_driver() {
        let driver = FakePageDriver::new();
        let action = Action::UploadFile {
            field: "cv".into(),
            document: DocumentKind::Resume,
        };
        let outcome = execute(&driver, &action, &run_id(), &documents(), None, None)
            .await
            .unwrap();
        assert!(!outcome.failed());
        assert!(driver.operations()[0].contains("/data/resume.pdf"));
    }

    #[tokio::test]
    async fn screenshot_without_sink_has_no_artifact() {
        let driver = FakePageDriver::new();
        let action = Action::Screenshot {
            label: "review".into(),
        };
        let outcome = execute(&driver, &action, &run_id(), &documents(), None, None)
            .await
            .unwrap();
        assert!(outcome.artifact.is_none());
        assert!(outcome.content.contains("review"));
    }

    #[tokio::test]
    async fn screenshot_is_delivered_to_the_channel() {
        let driver = FakePageDriver::new();
        let channel = crate::testutil::FakeUserChannel::new();
        let action = Action::Screenshot {
            label: "captcha".into(),
        };
        let outcome = execute(
            &driver,
            &action,
            &run_id(),
            &documents(),
            None,
            Some(&channel),
        )
        .await
        .unwrap();
        assert!(!outcome.failed());
        // The fake channel has no image support, so the caption arrives as
        // a plain notification.
        assert_eq!(channel.notifications(), vec!["Screenshot: captcha".to_owned()]);
    }

    #[tokio::test]
    async fn scroll_and_wait_report_success() {
        let driver = FakePageDriver::new();
        let scroll = Action::Scroll {
            direction: ScrollDirection::Down,
        };
        let wait = Action::Wait { seconds: 2 };
        assert!(
            !execute(&driver, &scroll, &run_id(), &documents(), None, None)
                .await
                .unwrap()
                .failed()
        );
        assert!(
            !execute(&driver, &wait, &run_id(), &documents(), None, None)
                .await
                .unwrap()
                .failed()
        );
    }

    #[tokio::test]
    async fn driver_fault_propagates() {
        let driver = FakePageDriver::new().with_fault();
        let action = Action::PageSnapshot;
        let err = execute(&driver, &action, &run_id(), &documents(), None, None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("browser unavailable"));
    }

    #[tokio::test]
    async fn loop_level_actions_are_rejected() {
        let driver = FakePageDriver::new();
        let action = Action::Done {
            status: "applied".into(),
            reason: String::new(),
        };
        let outcome = execute(&driver, &action, &run_id(), &documents(), None, None)
            .await
            .unwrap();
        assert!(outcome.failed());
        assert!(outcome.content.contains("not a page operation"));
    }
}
