//! Settings error types.

use thiserror::Error;

/// Errors from loading or parsing settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// Reading the settings file failed.
    #[error("failed to read settings file: {0}")]
    Io(#[from] std::io::Error),

    /// The settings file is not valid JSON, or the merged value does not
    /// match the schema.
    #[error("invalid settings: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result alias for this crate.
pub type Result<T> = std::result::Result<T, SettingsError>;
