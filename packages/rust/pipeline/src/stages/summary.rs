//! Summary stage: pure aggregation of the run into events and a timeline.

use leadflow_shared::{ContactTimeline, EnrichmentState, LeadSummary, StageKey, StageReport};

use super::HistoryFeatures;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Aggregate one lead's run. No inference and no fallback path: the same
/// inputs always produce the same summary.
pub fn run(history: &HistoryFeatures, state: &mut EnrichmentState) -> StageReport {
    let event_types = state.event_types();
    state.summary = Some(LeadSummary {
        total_events: event_types.len() as u32 + history.replies,
        event_types,
        response_rate: history.response_rate,
        timeline: ContactTimeline {
            first_contact: format_stamp(history.first_contact),
            last_contact: format_stamp(history.last_contact),
            next_followup: state.timing.as_ref().map(|t| t.recommended_date.clone()),
        },
    });
    StageReport::completed(StageKey::Summary)
}

fn format_stamp(stamp: Option<chrono::NaiveDateTime>) -> String {
    stamp
        .map(|s| s.format(TIMESTAMP_FORMAT).to_string())
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
