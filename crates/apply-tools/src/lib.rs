//! # apply-tools
//!
//! The tool contract: the fixed, closed set of actions the decision engine
//! may invoke, their schemas, the typed parser that validates raw tool
//! calls, and the [`driver::PageDriver`] port the browser adapter
//! implements.

#![deny(unsafe_code)]

pub mod action;
pub mod contract;
pub mod driver;
pub mod errors;
