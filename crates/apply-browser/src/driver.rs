//! [`PageDriver`] implementation over a [`CdpSession`].
//!
//! Translates page operations into CDP calls and maps the results onto the
//! value-vs-fault split: missing elements are `DriveOutcome::NotFound`
//! values, a dead session is a `DriverFault`.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tracing::{info, instrument};

use apply_tools::action::{DocumentKind, ScrollDirection};
use apply_tools::driver::{CapturedImage, DriveOutcome, PageDriver};
use apply_tools::errors::DriverFault;

use crate::error::BrowserError;
use crate::session::CdpSession;

const SCROLL_STEP_PX: i64 = 600;

/// CDP-backed page driver.
pub struct CdpPageDriver {
    session: CdpSession,
    closed: AtomicBool,
}

impl CdpPageDriver {
    /// Launch a fresh headless Chrome and wrap it as a page driver.
    pub async fn launch(chrome_path: &Path) -> Result<Self, BrowserError> {
        let session = CdpSession::launch(chrome_path).await?;
        info!(chrome = %chrome_path.display(), "browser session launched");
        Ok(Self {
            session,
            closed: AtomicBool::new(false),
        })
    }

    fn fault(err: &BrowserError) -> DriverFault {
        DriverFault::Unavailable(err.to_string())
    }

    fn guard(&self) -> Result<(), DriverFault> {
        if self.closed.load(Ordering::SeqCst) {
            Err(DriverFault::Closed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl PageDriver for CdpPageDriver {
    #[instrument(skip(self))]
    async fn snapshot(&self) -> Result<DriveOutcome, DriverFault> {
        self.guard()?;
        match self.session.snapshot().await {
            Ok(text) => Ok(DriveOutcome::Done(text)),
            Err(BrowserError::Script(e)) => {
                Ok(DriveOutcome::Done(format!("Page not readable yet: {e}")))
            }
            Err(e) => Err(Self::fault(&e)),
        }
    }

    #[instrument(skip(self))]
    async fn goto(&self, url: &str) -> Result<DriveOutcome, DriverFault> {
        self.guard()?;
        match self.session.navigate(url).await {
            Ok(()) => Ok(DriveOutcome::Done(format!("Navigated to {url}"))),
            // A refused navigation is an expected failure the engine can
            // react to (bad URL, network refusal), not a dead browser.
            Err(BrowserError::Cdp(e)) if e.contains("navigation failed") => {
                Ok(DriveOutcome::NotFound(format!("Navigation failed: {e}")))
            }
            Err(e) => Err(Self::fault(&e)),
        }
    }

    #[instrument(skip(self))]
    async fn click(&self, target: &str) -> Result<DriveOutcome, DriverFault> {
        self.guard()?;
        match self.session.click(target).await {
            Ok(result) if result == "clicked" => {
                // Clicks often trigger navigation; give the page a moment.
                let _ = self.session.wait_for_ready(5).await;
                Ok(DriveOutcome::Done(format!("Clicked: {target}")))
            }
            Ok(_) => Ok(DriveOutcome::NotFound(format!("Element not found: {target}"))),
            Err(BrowserError::Script(e)) => {
                Ok(DriveOutcome::NotFound(format!("Click failed: {e}")))
            }
            Err(e) => Err(Self::fault(&e)),
        }
    }

    #[instrument(skip(self, value))]
    async fn fill(&self, field: &str, value: &str) -> Result<DriveOutcome, DriverFault> {
        self.guard()?;
        match self.session.fill(field, value).await {
            Ok(result) if result == "filled" => Ok(DriveOutcome::Done(format!("Filled {field}"))),
            Ok(_) => Ok(DriveOutcome::NotFound(format!("Field not found: {field}"))),
            Err(BrowserError::Script(e)) => Ok(DriveOutcome::NotFound(format!("Fill failed: {e}"))),
            Err(e) => Err(Self::fault(&e)),
        }
    }

    #[instrument(skip(self))]
    async fn select_option(&self, field: &str, value: &str) -> Result<DriveOutcome, DriverFault> {
        self.guard()?;
        match self.session.select_option(field, value).await {
            Ok(result) if result == "selected" => {
                Ok(DriveOutcome::Done(format!("Selected '{value}' in {field}")))
            }
            Ok(result) if result == "nooption" => Ok(DriveOutcome::NotFound(format!(
                "Option not found: '{value}' in {field}"
            ))),
            Ok(_) => Ok(DriveOutcome::NotFound(format!("Dropdown not found: {field}"))),
            Err(BrowserError::Script(e)) => {
                Ok(DriveOutcome::NotFound(format!("Select failed: {e}")))
            }
            Err(e) => Err(Self::fault(&e)),
        }
    }

    #[instrument(skip(self, path))]
    async fn upload_file(
        &self,
        field: &str,
        document: DocumentKind,
        path: &str,
    ) -> Result<DriveOutcome, DriverFault> {
        self.guard()?;
        match self.session.upload_file(field, path).await {
            Ok(result) if result == "uploaded" => Ok(DriveOutcome::Done(format!(
                "Uploaded {} to {field}",
                document.as_str()
            ))),
            Ok(_) => Ok(DriveOutcome::NotFound(format!(
                "File input not found: {field}"
            ))),
            Err(BrowserError::Script(e)) => {
                Ok(DriveOutcome::NotFound(format!("Upload failed: {e}")))
            }
            Err(e) => Err(Self::fault(&e)),
        }
    }

    #[instrument(skip(self))]
    async fn scroll(&self, direction: ScrollDirection) -> Result<DriveOutcome, DriverFault> {
        self.guard()?;
        let delta = match direction {
            ScrollDirection::Up => -SCROLL_STEP_PX,
            ScrollDirection::Down => SCROLL_STEP_PX,
        };
        match self.session.scroll_by(delta).await {
            Ok(()) => Ok(DriveOutcome::Done(format!(
                "Scrolled {}",
                direction.as_str()
            ))),
            Err(BrowserError::Script(e)) => {
                Ok(DriveOutcome::NotFound(format!("Scroll failed: {e}")))
            }
            Err(e) => Err(Self::fault(&e)),
        }
    }

    #[instrument(skip(self))]
    async fn wait(&self, seconds: u64) -> Result<DriveOutcome, DriverFault> {
        self.guard()?;
        match self.session.wait_for_ready(seconds).await {
            Ok(()) => Ok(DriveOutcome::Done(format!("Waited up to {seconds}s"))),
            Err(e) => Err(Self::fault(&e)),
        }
    }

    #[instrument(skip(self))]
    async fn screenshot(&self) -> Result<CapturedImage, DriverFault> {
        self.guard()?;
        match self.session.screenshot().await {
            Ok(base64_png) => Ok(CapturedImage { base64_png }),
            Err(e) => Err(Self::fault(&e)),
        }
    }

    #[instrument(skip(self))]
    async fn current_url(&self) -> Result<DriveOutcome, DriverFault> {
        self.guard()?;
        match self.session.current_url().await {
            Ok(url) => Ok(DriveOutcome::Done(format!("Current URL: {url}"))),
            Err(e) => Err(Self::fault(&e)),
        }
    }

    async fn close(&self) -> Result<(), DriverFault> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.session.close().await;
        info!("browser session closed");
        Ok(())
    }
}
