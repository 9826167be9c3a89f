//! Shared types for the clipforge workspace.
//!
//! Holds the pieces every other crate leans on: correlation tokens that
//! bind a submission to its eventual output, the common error type, and
//! human-readable duration formatting used in status texts.

pub mod correlation;
pub mod error;
pub mod format;
pub mod types;
