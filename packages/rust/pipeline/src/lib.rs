//! Batch enrichment pipeline for LeadFlow.
//!
//! This crate ties together the stage engine, the bounded worker pool, and
//! batch orchestration into end-to-end workflows (e.g.,
//! [`Orchestrator::submit`]).
//!
//! [`Orchestrator::submit`]: orchestrator::Orchestrator::submit

pub mod executor;
pub mod orchestrator;
pub mod prompts;
pub mod scheduler;
pub mod stages;
