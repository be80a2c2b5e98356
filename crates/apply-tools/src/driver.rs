//! The page-driver port.
//!
//! One operation per browser-facing tool. Expected failures (element not
//! found, navigation trouble) are values in [`DriveOutcome`], folded into
//! the transcript for the decision engine to react to. Only a genuine
//! infrastructure fault surfaces as [`DriverFault`] and ends the run.

use async_trait::async_trait;

use crate::action::{DocumentKind, ScrollDirection};
use crate::errors::DriverFault;

/// Result of one page operation that completed without an infrastructure
/// fault.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DriveOutcome {
    /// The operation did what was asked; the text describes the result.
    Done(String),
    /// The named element or field was not on the page.
    NotFound(String),
}

impl DriveOutcome {
    /// Text to fold into the transcript.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Done(text) | Self::NotFound(text) => text,
        }
    }

    /// Whether this outcome reports an expected failure.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// A captured screenshot, returned as base64 PNG data for the artifact
/// store to persist.
#[derive(Clone, Debug)]
pub struct CapturedImage {
    /// Base64-encoded PNG bytes.
    pub base64_png: String,
}

/// Browser operations behind the tool contract.
///
/// Implementations must not return `Err` for expected failures; those are
/// [`DriveOutcome::NotFound`] values. `Err(DriverFault)` means the browser
/// itself is gone and the run must terminate.
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Structured description of the current page.
    async fn snapshot(&self) -> Result<DriveOutcome, DriverFault>;

    /// Navigate to a URL.
    async fn goto(&self, url: &str) -> Result<DriveOutcome, DriverFault>;

    /// Click an element by text, label, or selector.
    async fn click(&self, target: &str) -> Result<DriveOutcome, DriverFault>;

    /// Fill a form field.
    async fn fill(&self, field: &str, value: &str) -> Result<DriveOutcome, DriverFault>;

    /// Select a dropdown option.
    async fn select_option(&self, field: &str, value: &str) -> Result<DriveOutcome, DriverFault>;

    /// Upload a file to a file input.
    async fn upload_file(
        &self,
        field: &str,
        document: DocumentKind,
        path: &str,
    ) -> Result<DriveOutcome, DriverFault>;

    /// Scroll the page.
    async fn scroll(&self, direction: ScrollDirection) -> Result<DriveOutcome, DriverFault>;

    /// Wait for the page to settle, up to the given number of seconds.
    async fn wait(&self, seconds: u64) -> Result<DriveOutcome, DriverFault>;

    /// Capture a screenshot of the current page.
    async fn screenshot(&self) -> Result<CapturedImage, DriverFault>;

    /// Current page URL.
    async fn current_url(&self) -> Result<DriveOutcome, DriverFault>;

    /// Release the underlying browser session. Called exactly once on every
    /// terminal transition, including cancellation. Must be idempotent.
    async fn close(&self) -> Result<(), DriverFault>;
}
