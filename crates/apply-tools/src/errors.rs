//! Tool-layer error types.

use thiserror::Error;

/// A non-retryable infrastructure fault from the page driver.
///
/// Expected failures (element not found, navigation timeout) are values
/// returned through [`crate::driver::DriveOutcome`], never through this
/// type. A `DriverFault` means the driver itself is gone (browser process
/// crashed, CDP socket closed) and the run cannot continue.
#[derive(Debug, Error)]
pub enum DriverFault {
    /// The browser process or its control channel is no longer usable.
    #[error("browser unavailable: {0}")]
    Unavailable(String),

    /// The driver was asked to act after it was closed.
    #[error("browser session already closed")]
    Closed,
}

/// Errors surfaced by tool-layer helpers.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Argument validation failed.
    #[error("validation error: {message}")]
    Validation {
        /// Description of the validation failure.
        message: String,
    },

    /// Infrastructure fault from the page driver.
    #[error("{0}")]
    Driver(#[from] DriverFault),
}
