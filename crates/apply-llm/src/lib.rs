//! # apply-llm
//!
//! The decision port. [`decision::DecisionClient`] takes the transcript and
//! the tool schema and returns the single next tool call; [`openai`]
//! implements it against any OpenAI-compatible chat-completions endpoint.

#![deny(unsafe_code)]

pub mod decision;
pub mod openai;
