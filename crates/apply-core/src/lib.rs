//! # apply-core
//!
//! Foundation types for the apply agent. This crate provides the shared
//! vocabulary the other crates depend on:
//!
//! - **Branded IDs**: `RunId`, `QuestionId`, etc. as newtypes for type safety
//! - **Task**: the immutable input describing one application attempt
//! - **Transcript**: the ordered record of observations and decisions
//! - **Tool schema**: `ToolDefinition`, `ToolCall`, `ToolOutcome`
//! - **Outcome policy**: the total mapping from termination cause to `RunResult`
//! - **Retry math**: backoff calculation shared by the network-facing crates

#![deny(unsafe_code)]

pub mod ids;
pub mod outcome;
pub mod retry;
pub mod task;
pub mod tools;
pub mod transcript;
