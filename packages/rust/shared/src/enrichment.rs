//! Typed per-record enrichment state, accumulated across pipeline stages.
//!
//! Each stage writes exactly one slot and appends a [`StageReport`], so a
//! degraded run (fallback payloads) stays observable after the fact. The
//! whole state is what the intel store persists per lead.

use serde::{Deserialize, Serialize};

use crate::types::{BatchId, StageKey};

// ---------------------------------------------------------------------------
// Research
// ---------------------------------------------------------------------------

/// A single research insight derived from firmographics and behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    pub metric: String,
    pub value: String,
    pub reasoning: String,
}

/// Output slot of the research stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchInsights {
    pub insights: Vec<Insight>,
    pub recommendation: String,
}

impl ResearchInsights {
    /// Degraded payload installed when research analysis fails.
    pub fn fallback(reason: &str) -> Self {
        Self {
            insights: vec![Insight {
                metric: "Analysis Error".into(),
                value: "Low".into(),
                reasoning: reason.to_string(),
            }],
            recommendation: "Review lead manually before outreach.".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Qualification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalStrength {
    High,
    Medium,
    Low,
}

/// A buying signal backing the intent score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub signal: String,
    pub strength: SignalStrength,
    pub reasoning: String,
}

/// Output slot of the qualification stage. Score is kept in `[0, 100]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Qualification {
    pub intent_score: f32,
    pub signals: Vec<Signal>,
}

impl Qualification {
    /// Degraded payload: zero intent, one low-strength explanatory signal.
    pub fn fallback(reason: &str) -> Self {
        Self {
            intent_score: 0.0,
            signals: vec![Signal {
                signal: "Analysis failed".into(),
                strength: SignalStrength::Low,
                reasoning: reason.to_string(),
            }],
        }
    }
}

// ---------------------------------------------------------------------------
// Composition
// ---------------------------------------------------------------------------

/// Output slot of the composition stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageDraft {
    pub subject: String,
    pub email_preview: String,
    pub personalization_factors: Vec<String>,
}

impl MessageDraft {
    /// Degraded payload installed when drafting fails or is gated off.
    pub fn fallback() -> Self {
        Self {
            subject: "Error drafting email".into(),
            email_preview: "Failed to generate email.".into(),
            personalization_factors: vec!["Error".into()],
        }
    }
}

// ---------------------------------------------------------------------------
// Timing
// ---------------------------------------------------------------------------

/// Outreach approach, banded by urgency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Approach {
    SoftNudge,
    ValueAdd,
    SocialProof,
}

impl Approach {
    /// Band mapping: 0-30 soft nudge, 31-70 value add, 71-100 social proof.
    pub fn for_urgency(urgency: f32) -> Self {
        if urgency <= 30.0 {
            Approach::SoftNudge
        } else if urgency <= 70.0 {
            Approach::ValueAdd
        } else {
            Approach::SocialProof
        }
    }

    /// Whether this approach sits inside the band for `urgency`.
    pub fn consistent_with(self, urgency: f32) -> bool {
        self == Self::for_urgency(urgency)
    }
}

impl std::fmt::Display for Approach {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Approach::SoftNudge => "soft_nudge",
            Approach::ValueAdd => "value_add",
            Approach::SocialProof => "social_proof",
        };
        write!(f, "{s}")
    }
}

/// Output slot of the timing stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FollowupTiming {
    /// `YYYY-MM-DD`.
    pub recommended_date: String,
    /// `HH:MM`, 24-hour.
    pub send_time: String,
    pub approach: Approach,
    pub urgency: f32,
    pub reasoning: String,
    pub response_probability: f32,
}

impl FollowupTiming {
    /// Degraded payload. Urgency 25 keeps the soft-nudge pairing inside its
    /// band so the consistency check stays quiet on fallbacks.
    pub fn fallback(reason: &str) -> Self {
        Self {
            recommended_date: "2025-04-15".into(),
            send_time: "10:00".into(),
            approach: Approach::SoftNudge,
            urgency: 25.0,
            reasoning: reason.to_string(),
            response_probability: 0.1,
        }
    }
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

/// Contact timeline derived from the interaction history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContactTimeline {
    /// Earliest sent timestamp, or empty when there is no history.
    pub first_contact: String,
    /// Latest sent timestamp, or empty when there is no history.
    pub last_contact: String,
    /// Recommended date from the timing slot, when available.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_followup: Option<String>,
}

/// Output slot of the summary stage. Pure aggregation, no inference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadSummary {
    pub total_events: u32,
    pub event_types: Vec<String>,
    pub response_rate: f32,
    pub timeline: ContactTimeline,
}

// ---------------------------------------------------------------------------
// Stage reports
// ---------------------------------------------------------------------------

/// How a stage concluded: a full payload, or the stage fallback (with the
/// reason the primary path was abandoned).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum StageOutcome {
    Completed,
    Fallback { reason: String },
}

/// Ledger entry for one executed stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageReport {
    pub stage: StageKey,
    #[serde(flatten)]
    pub outcome: StageOutcome,
}

impl StageReport {
    pub fn completed(stage: StageKey) -> Self {
        Self {
            stage,
            outcome: StageOutcome::Completed,
        }
    }

    pub fn fallback(stage: StageKey, reason: impl Into<String>) -> Self {
        Self {
            stage,
            outcome: StageOutcome::Fallback {
                reason: reason.into(),
            },
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self.outcome, StageOutcome::Fallback { .. })
    }
}

// ---------------------------------------------------------------------------
// EnrichmentState
// ---------------------------------------------------------------------------

/// Accumulated enrichment for one lead across one batch run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentState {
    pub lead_id: String,
    pub batch_id: BatchId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub research: Option<ResearchInsights>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qualification: Option<Qualification>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<MessageDraft>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timing: Option<FollowupTiming>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<LeadSummary>,
    #[serde(default)]
    pub reports: Vec<StageReport>,
}

impl EnrichmentState {
    pub fn new(lead_id: impl Into<String>, batch_id: BatchId) -> Self {
        Self {
            lead_id: lead_id.into(),
            batch_id,
            research: None,
            qualification: None,
            message: None,
            timing: None,
            summary: None,
            reports: Vec::new(),
        }
    }

    /// Intent score from the qualification slot, if the stage has run.
    pub fn intent_score(&self) -> Option<f32> {
        self.qualification.as_ref().map(|q| q.intent_score)
    }

    /// Whether any executed stage degraded to its fallback.
    pub fn degraded(&self) -> bool {
        self.reports.iter().any(StageReport::is_fallback)
    }

    /// Event names for stages that produced an enrichment payload, in
    /// pipeline order. Fallback payloads count: the slot was written.
    pub fn event_types(&self) -> Vec<String> {
        let mut events = Vec::new();
        if self.research.is_some() {
            events.push(StageKey::Research);
        }
        if self.qualification.is_some() {
            events.push(StageKey::Qualification);
        }
        if self.message.is_some() {
            events.push(StageKey::Composition);
        }
        if self.timing.is_some() {
            events.push(StageKey::Timing);
        }
        events
            .into_iter()
            .filter_map(|k| k.event_name().map(String::from))
            .collect()
    }
}
