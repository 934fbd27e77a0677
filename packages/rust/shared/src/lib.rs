//! Shared types, error model, and configuration for LeadFlow.
//!
//! This crate is the foundation depended on by all other LeadFlow crates.
//! It provides:
//! - [`LeadFlowError`]: the unified error type
//! - Domain types ([`LeadRecord`], [`BatchProgress`], [`EnrichmentState`], [`BatchId`])
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod enrichment;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DefaultsConfig, InferenceConfig, PipelineConfig, ReprocessPolicy, config_dir,
    config_file_path, init_config, load_config, load_config_from, resolve_api_key,
};
pub use enrichment::{
    Approach, ContactTimeline, EnrichmentState, FollowupTiming, Insight, LeadSummary,
    MessageDraft, Qualification, ResearchInsights, Signal, SignalStrength, StageOutcome,
    StageReport,
};
pub use error::{LeadFlowError, Result};
pub use types::{
    BatchId, BatchProgress, BatchStatus, InteractionRecord, LeadRecord, LeadStatus,
    ProgressUpdate, StageKey, StageStatus, parse_datetime_flexible, percent_complete,
};
