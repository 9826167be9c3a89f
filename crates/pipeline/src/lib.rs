//! Job pipeline: orchestration, progress reporting and duration history.
//!
//! The chat layer supplies image bytes, a user id and a [`sink::JobSink`];
//! [`orchestrator::Orchestrator`] does the rest.

pub mod config;
pub mod duration;
pub mod orchestrator;
pub mod progress;
pub mod sink;
pub mod stats;
