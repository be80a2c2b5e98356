//! # apply-settings
//!
//! Layered configuration: compiled defaults, deep-merged user file
//! (`~/.apply/settings.json`), and `APPLY_*` environment overrides on top.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::SettingsError;
pub use loader::{load_settings, load_settings_from_path, settings_path};
pub use types::Settings;
