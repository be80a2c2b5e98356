//! # apply-browser
//!
//! CDP-backed implementation of the page-driver port. Launches a headless
//! Chrome, drives it over a WebSocket CDP session, and maps page operations
//! to the value-vs-fault split the agent loop expects.

#![deny(unsafe_code)]

pub mod chrome;
pub mod driver;
pub mod error;
pub mod session;

pub use driver::CdpPageDriver;
pub use error::BrowserError;
