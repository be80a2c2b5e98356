//! # apply-runtime
//!
//! The control protocol that turns page observations and tool-call
//! decisions into a terminating, auditable run:
//!
//! - [`agent::AgentLoop`]: the main cycle with suspension, debug gate, and
//!   termination semantics
//! - [`executor`]: dispatch of validated actions to the page driver
//! - [`service::ApplicationService`]: record/credential bookkeeping around
//!   a run
//! - [`runs::RunRegistry`]: concurrent independent runs with cancellation
//! - [`artifacts`]: filesystem artifact store for screenshots and metadata
//! - [`prompts`]: the fixed system instruction and task prompt builder

#![deny(unsafe_code)]

pub mod agent;
pub mod artifacts;
pub mod errors;
pub mod executor;
pub mod prompts;
pub mod runs;
pub mod service;
pub mod state;
pub mod testutil;
