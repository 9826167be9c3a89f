//! ComfyUI-Connect client and result-acquisition protocol.
//!
//! Provides the REST client for workflow submission, history listing
//! and output retrieval, the job submitter, inline payload extraction,
//! history correlation by token, and the result resolver that races the
//! inline path against a polling fallback.

pub mod api;
pub mod history;
pub mod payload;
pub mod resolver;
pub mod submission;
