//! # apply-interaction
//!
//! The interaction channel: routing questions from running agents to a
//! human and back. The [`channel::InteractionRouter`] keeps at most one
//! pending question per run; [`console`] and [`telegram`] provide the
//! concrete transports.

#![deny(unsafe_code)]

pub mod channel;
pub mod console;
pub mod telegram;
