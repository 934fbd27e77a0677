//! Fixed-order stage execution for one record.

use leadflow_shared::{EnrichmentState, InteractionRecord, LeadRecord, StageKey};
use tracing::{debug, instrument};

use crate::stages::{self, HistoryFeatures, StageContext};

/// Run the five stages in pipeline order for one record.
///
/// Always all five, regardless of earlier fallbacks; the returned state
/// carries one report per stage. Never fails: a record that hits trouble
/// everywhere still comes back with fallback payloads in every slot.
#[instrument(skip_all, fields(lead_id = %record.lead_id))]
pub async fn run_stages(
    ctx: &StageContext,
    record: &LeadRecord,
    interactions: &[InteractionRecord],
) -> EnrichmentState {
    let mut state = EnrichmentState::new(record.lead_id.clone(), ctx.batch_id.clone());
    let history = HistoryFeatures::from_interactions(interactions);

    let mut reports = Vec::with_capacity(StageKey::ALL.len());
    reports.push(stages::research::run(ctx, record, &mut state).await);
    reports.push(stages::qualify::run(ctx, record, &history, &mut state).await);
    reports.push(stages::compose::run(ctx, record, &mut state).await);
    reports.push(stages::timing::run(ctx, record, &history, &mut state).await);
    reports.push(stages::summary::run(&history, &mut state));
    state.reports = reports;

    debug!(degraded = state.degraded(), "stage sequence complete");
    state
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
