//! Browser adapter error types.

use thiserror::Error;

/// Failures in the CDP session or the Chrome process.
#[derive(Debug, Error)]
pub enum BrowserError {
    /// Chrome could not be found or started.
    #[error("failed to launch browser: {context}")]
    LaunchFailed {
        /// What went wrong.
        context: String,
    },

    /// A CDP command failed or the control socket is gone.
    #[error("cdp error: {0}")]
    Cdp(String),

    /// A CDP command did not answer in time.
    #[error("timeout after {timeout_ms}ms: {context}")]
    Timeout {
        /// The timeout that elapsed.
        timeout_ms: u64,
        /// The command that timed out.
        context: String,
    },

    /// JavaScript evaluation threw.
    #[error("script error: {0}")]
    Script(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_formats() {
        let err = BrowserError::LaunchFailed {
            context: "no binary".into(),
        };
        assert_eq!(err.to_string(), "failed to launch browser: no binary");

        let err = BrowserError::Timeout {
            timeout_ms: 30_000,
            context: "Page.navigate".into(),
        };
        assert!(err.to_string().contains("30000ms"));
    }
}
