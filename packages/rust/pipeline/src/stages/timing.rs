//! Timing stage: follow-up date, send time, and outreach approach.

use leadflow_inference::parse_stage;
use leadflow_shared::{EnrichmentState, FollowupTiming, LeadRecord, StageKey, StageReport};
use tracing::{debug, warn};

use super::{HistoryFeatures, StageContext};
use crate::prompts;

/// Recommend follow-up timing for one lead. Records without interaction
/// history skip inference entirely; there is no response pattern to reason
/// from, so the fallback is the honest answer.
pub async fn run(
    ctx: &StageContext,
    record: &LeadRecord,
    history: &HistoryFeatures,
    state: &mut EnrichmentState,
) -> StageReport {
    if history.is_empty() {
        state.timing = Some(FollowupTiming::fallback("no interaction history"));
        return StageReport::fallback(StageKey::Timing, "no interaction history");
    }

    let score = state.intent_score().unwrap_or(0.0);
    let raw = ctx
        .client
        .generate(&prompts::timing_prompt(record, history, score))
        .await;

    match parse_stage::<FollowupTiming>(&raw) {
        Ok(mut timing) => {
            timing.urgency = timing.urgency.clamp(0.0, 100.0);
            timing.response_probability = timing.response_probability.clamp(0.0, 1.0);
            if !timing.approach.consistent_with(timing.urgency) {
                // Warn-only: the model's pairing is kept as-is.
                warn!(
                    lead_id = %record.lead_id,
                    approach = %timing.approach,
                    urgency = timing.urgency,
                    "approach outside its urgency band"
                );
            }
            debug!(
                lead_id = %record.lead_id,
                date = %timing.recommended_date,
                approach = %timing.approach,
                "timing recommended"
            );
            state.timing = Some(timing);
            StageReport::completed(StageKey::Timing)
        }
        Err(e) => {
            warn!(lead_id = %record.lead_id, error = %e, "timing payload rejected");
            state.timing = Some(FollowupTiming::fallback(&e.to_string()));
            StageReport::fallback(StageKey::Timing, e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
