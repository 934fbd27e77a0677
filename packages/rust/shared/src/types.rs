//! Core domain types for LeadFlow batches.

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::error::LeadFlowError;

// ---------------------------------------------------------------------------
// BatchId
// ---------------------------------------------------------------------------

/// Batch identifier of the form `BATCH_<YYYY_MM_DD>_<RAND8>`, where the
/// suffix is the first 8 hex chars of a UUID v4, uppercased.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(String);

impl BatchId {
    /// Mint a new identifier for the given submission date.
    pub fn mint(date: NaiveDate) -> Self {
        let raw = Uuid::new_v4().simple().to_string();
        let suffix = raw[..8].to_uppercase();
        Self(format!("BATCH_{}_{suffix}", date.format("%Y_%m_%d")))
    }

    /// Mint a new identifier for today (local time).
    pub fn new() -> Self {
        Self::mint(chrono::Local::now().date_naive())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for BatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for BatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for BatchId {
    type Err = LeadFlowError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('_').collect();
        let valid = parts.len() == 5
            && parts[0] == "BATCH"
            && NaiveDate::parse_from_str(&parts[1..4].join("_"), "%Y_%m_%d").is_ok()
            && parts[4].len() == 8
            && parts[4]
                .chars()
                .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase());
        if !valid {
            return Err(LeadFlowError::validation(format!(
                "malformed batch id: {s}"
            )));
        }
        Ok(Self(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// LeadRecord
// ---------------------------------------------------------------------------

/// Per-record processing status. Transitions are one-directional:
/// `New -> Processing -> {Ready, Error}`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LeadStatus {
    #[default]
    New,
    Processing,
    Ready,
    Error,
}

impl LeadStatus {
    /// Whether the status machine permits moving from `self` to `next`.
    pub fn can_advance_to(self, next: LeadStatus) -> bool {
        matches!(
            (self, next),
            (LeadStatus::New, LeadStatus::Processing)
                | (LeadStatus::Processing, LeadStatus::Ready)
                | (LeadStatus::Processing, LeadStatus::Error)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, LeadStatus::Ready | LeadStatus::Error)
    }
}

impl std::fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LeadStatus::New => "New",
            LeadStatus::Processing => "Processing",
            LeadStatus::Ready => "Ready",
            LeadStatus::Error => "Error",
        };
        write!(f, "{s}")
    }
}

/// One row of the canonical leads table.
///
/// Numeric and boolean fields use tolerant deserializers: CSV exports arrive
/// with blanks, `NaN`, and float-formatted integers, and a malformed cell
/// must not reject the whole upload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LeadRecord {
    pub lead_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub company: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub industry: String,
    #[serde(default, deserialize_with = "de_u32_loose")]
    pub visits: u32,
    #[serde(default, deserialize_with = "de_f64_loose")]
    pub time_on_site: f64,
    #[serde(default, deserialize_with = "de_f64_loose")]
    pub pages_per_visit: f64,
    #[serde(default, deserialize_with = "de_bool_loose")]
    pub converted: bool,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub lead_source: String,
    #[serde(default, deserialize_with = "de_status_loose")]
    pub status: LeadStatus,
    #[serde(default, deserialize_with = "de_opt_score")]
    pub intent_score: Option<f32>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub email_preview: Option<String>,
}

impl LeadRecord {
    /// Clear enrichment outputs and reset the status machine, so a
    /// resubmitted record starts from a clean slate.
    pub fn reset_for_processing(&mut self) {
        self.status = LeadStatus::New;
        self.intent_score = None;
        self.subject = None;
        self.email_preview = None;
    }
}

// ---------------------------------------------------------------------------
// InteractionRecord
// ---------------------------------------------------------------------------

/// One row of the email interaction log. Read-only input: parsed for
/// history features, never written back.
#[derive(Debug, Clone, Deserialize)]
pub struct InteractionRecord {
    #[serde(default)]
    pub email_id: String,
    pub lead_id: String,
    #[serde(default, deserialize_with = "de_opt_datetime")]
    pub sent_time: Option<NaiveDateTime>,
    #[serde(default, deserialize_with = "de_opt_datetime")]
    pub replied_time: Option<NaiveDateTime>,
    #[serde(default)]
    pub response_status: String,
    #[serde(default)]
    pub email_type: String,
    #[serde(default, deserialize_with = "de_bool_loose")]
    pub opened: bool,
    #[serde(default, deserialize_with = "de_f64_loose")]
    pub engagement_score: f64,
}

impl InteractionRecord {
    pub fn replied(&self) -> bool {
        self.replied_time.is_some() || self.response_status.eq_ignore_ascii_case("replied")
    }
}

/// Parse a timestamp in any of the accepted upload formats.
///
/// Accepts `%Y-%m-%d %H:%M:%S`, RFC 3339, and `%Y-%m-%dT%H:%M:%S`.
pub fn parse_datetime_flexible(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .ok()
        .or_else(|| {
            chrono::DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.naive_utc())
        })
        .or_else(|| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S").ok())
}

// ---------------------------------------------------------------------------
// Batch progress
// ---------------------------------------------------------------------------

/// Batch lifecycle status, as persisted in the progress document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl BatchStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, BatchStatus::Completed | BatchStatus::Failed)
    }
}

impl std::fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BatchStatus::Pending => "pending",
            BatchStatus::Processing => "processing",
            BatchStatus::Completed => "completed",
            BatchStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// Per-stage status on the batch-coarse stage axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Pending,
    Running,
    Completed,
    Error,
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StageStatus::Pending => "pending",
            StageStatus::Running => "running",
            StageStatus::Completed => "completed",
            StageStatus::Error => "error",
        };
        write!(f, "{s}")
    }
}

/// The five pipeline stages, in execution order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum StageKey {
    Research,
    Qualification,
    Composition,
    Timing,
    Summary,
}

impl StageKey {
    /// All stages in pipeline order.
    pub const ALL: [StageKey; 5] = [
        StageKey::Research,
        StageKey::Qualification,
        StageKey::Composition,
        StageKey::Timing,
        StageKey::Summary,
    ];

    /// Human-readable label for CLI output.
    pub fn label(self) -> &'static str {
        match self {
            StageKey::Research => "Lead Research",
            StageKey::Qualification => "Intent Qualification",
            StageKey::Composition => "Message Composition",
            StageKey::Timing => "Follow-up Timing",
            StageKey::Summary => "Activity Summary",
        }
    }

    /// One-line description for the stage catalog.
    pub fn description(self) -> &'static str {
        match self {
            StageKey::Research => "Analyzes firmographics and behavior metrics into insights",
            StageKey::Qualification => "Scores purchase intent from insights and engagement",
            StageKey::Composition => "Drafts a personalized subject line and message preview",
            StageKey::Timing => "Recommends follow-up date, time, and outreach approach",
            StageKey::Summary => "Aggregates the run into events, rates, and a timeline",
        }
    }

    /// Event name recorded by the summary stage for stages that produce an
    /// enrichment payload. The summary stage itself has none.
    pub fn event_name(self) -> Option<&'static str> {
        match self {
            StageKey::Research => Some("lead_research_update"),
            StageKey::Qualification => Some("intent_update"),
            StageKey::Composition => Some("email_strategy_update"),
            StageKey::Timing => Some("followup_timing_update"),
            StageKey::Summary => None,
        }
    }
}

impl std::fmt::Display for StageKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StageKey::Research => "research",
            StageKey::Qualification => "qualification",
            StageKey::Composition => "composition",
            StageKey::Timing => "timing",
            StageKey::Summary => "summary",
        };
        write!(f, "{s}")
    }
}

/// Completion percentage for a batch: `round(100 * processed / total)`.
/// An empty batch is trivially complete.
pub fn percent_complete(processed: u32, total: u32) -> u8 {
    if total == 0 {
        return 100;
    }
    ((processed as f64) * 100.0 / (total as f64)).round() as u8
}

/// The durable `_progress.json` document for one batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchProgress {
    pub batch_id: BatchId,
    pub status: BatchStatus,
    pub percent: u8,
    pub processed: u32,
    pub total: u32,
    pub stages: BTreeMap<StageKey, StageStatus>,
}

impl BatchProgress {
    /// Initial document for a freshly submitted batch: pending, all five
    /// stages pending, percent derived from `total`.
    pub fn pending(batch_id: BatchId, total: u32) -> Self {
        Self {
            batch_id,
            status: BatchStatus::Pending,
            percent: percent_complete(0, total),
            processed: 0,
            total,
            stages: StageKey::ALL
                .iter()
                .map(|k| (*k, StageStatus::Pending))
                .collect(),
        }
    }

    /// Apply a merge-style partial update: only supplied fields are
    /// overwritten, and the stage map is merged key-by-key.
    pub fn apply(&mut self, update: ProgressUpdate) {
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(percent) = update.percent {
            self.percent = percent;
        }
        if let Some(processed) = update.processed {
            self.processed = processed;
        }
        if let Some(total) = update.total {
            self.total = total;
        }
        for (key, stage_status) in update.stages {
            self.stages.insert(key, stage_status);
        }
    }
}

/// Partial progress update. Absent fields leave the stored document
/// untouched; stage entries overwrite only their own key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<BatchStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percent: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u32>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub stages: BTreeMap<StageKey, StageStatus>,
}

impl ProgressUpdate {
    /// Update that sets every stage to the same status.
    pub fn all_stages(status: StageStatus) -> Self {
        Self {
            stages: StageKey::ALL.iter().map(|k| (*k, status)).collect(),
            ..Self::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Tolerant field deserializers
// ---------------------------------------------------------------------------

fn de_u32_loose<'de, D>(deserializer: D) -> std::result::Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Ok(raw
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|f| f.is_finite() && *f >= 0.0)
        .map(|f| f as u32)
        .unwrap_or(0))
}

fn de_f64_loose<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Ok(raw
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .unwrap_or(0.0))
}

fn de_bool_loose<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Ok(matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes" | "y" | "t"
    ))
}

fn de_opt_score<'de, D>(deserializer: D) -> std::result::Result<Option<f32>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Ok(raw
        .trim()
        .parse::<f32>()
        .ok()
        .filter(|f| f.is_finite())
        .map(|f| f.clamp(0.0, 100.0)))
}

/// Uploads may carry arbitrary CRM status labels; anything unrecognized
/// reads as `New`. Submission resets the column regardless.
fn de_status_loose<'de, D>(deserializer: D) -> std::result::Result<LeadStatus, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Ok(match raw.trim().to_ascii_lowercase().as_str() {
        "processing" => LeadStatus::Processing,
        "ready" => LeadStatus::Ready,
        "error" => LeadStatus::Error,
        _ => LeadStatus::New,
    })
}

fn de_opt_datetime<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<NaiveDateTime>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Ok(parse_datetime_flexible(&raw))
}
