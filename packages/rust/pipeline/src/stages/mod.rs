//! The five enrichment stages, in pipeline order.
//!
//! Every stage has the same shape: read the record plus prior state, call
//! inference where the stage needs it, write exactly one slot on
//! [`EnrichmentState`], and return a [`StageReport`]. A stage that cannot
//! produce its payload installs the stage fallback instead. Stages never
//! return `Err` and never stop the sequence.
//!
//! [`EnrichmentState`]: leadflow_shared::EnrichmentState
//! [`StageReport`]: leadflow_shared::StageReport

pub mod compose;
pub mod qualify;
pub mod research;
pub mod summary;
pub mod timing;

use chrono::{Datelike, NaiveDateTime, Timelike, Weekday};

use leadflow_inference::InferenceClient;
use leadflow_shared::{BatchId, InteractionRecord};

/// Batch-scoped inputs handed to every stage.
#[derive(Debug, Clone)]
pub struct StageContext {
    pub client: InferenceClient,
    pub batch_id: BatchId,
    /// Minimum intent score before composition calls inference.
    pub compose_min_intent: f32,
}

// ---------------------------------------------------------------------------
// History features
// ---------------------------------------------------------------------------

const WEEKDAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

/// Features derived from one lead's interaction history. Computed once per
/// record and shared by qualification, timing, and summary.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryFeatures {
    /// Logged outbound emails (one per interaction row).
    pub sends: u32,
    pub opens: u32,
    pub replies: u32,
    /// `replies / sends`, zero when there is no history.
    pub response_rate: f32,
    /// Most frequent weekday among reply timestamps.
    pub best_weekday: Option<Weekday>,
    /// Most frequent hour of day (0-23) among reply timestamps.
    pub best_hour: Option<u32>,
    /// Mean send-to-reply delay in hours, over rows carrying both stamps.
    pub mean_reply_delay_hours: Option<f64>,
    pub first_contact: Option<NaiveDateTime>,
    pub last_contact: Option<NaiveDateTime>,
}

impl HistoryFeatures {
    pub fn from_interactions(interactions: &[InteractionRecord]) -> Self {
        let sends = interactions.len() as u32;
        if sends == 0 {
            return Self::default();
        }

        let opens = interactions.iter().filter(|r| r.opened).count() as u32;
        let replies = interactions.iter().filter(|r| r.replied()).count() as u32;

        let mut weekday_counts = [0u32; 7];
        let mut hour_counts = [0u32; 24];
        for reply in interactions.iter().filter_map(|r| r.replied_time) {
            weekday_counts[reply.weekday().num_days_from_monday() as usize] += 1;
            hour_counts[reply.hour() as usize] += 1;
        }

        let mut delays = Vec::new();
        for row in interactions {
            if let (Some(sent), Some(replied)) = (row.sent_time, row.replied_time) {
                let minutes = (replied - sent).num_minutes();
                if minutes >= 0 {
                    delays.push(minutes as f64 / 60.0);
                }
            }
        }
        let mean_reply_delay_hours = if delays.is_empty() {
            None
        } else {
            Some(delays.iter().sum::<f64>() / delays.len() as f64)
        };

        Self {
            sends,
            opens,
            replies,
            response_rate: replies as f32 / sends as f32,
            best_weekday: argmax(&weekday_counts).map(|i| WEEKDAYS[i]),
            best_hour: argmax(&hour_counts).map(|i| i as u32),
            mean_reply_delay_hours,
            first_contact: interactions.iter().filter_map(|r| r.sent_time).min(),
            last_contact: interactions.iter().filter_map(|r| r.sent_time).max(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sends == 0
    }
}

/// Index of the largest nonzero count; ties keep the earliest index.
fn argmax(counts: &[u32]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, &count) in counts.iter().enumerate() {
        if count == 0 {
            continue;
        }
        match best {
            Some(j) if counts[j] >= count => {}
            _ => best = Some(i),
        }
    }
    best
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn at(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 4, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn interaction(
        sent: Option<NaiveDateTime>,
        replied: Option<NaiveDateTime>,
        opened: bool,
    ) -> InteractionRecord {
        InteractionRecord {
            email_id: "E1".into(),
            lead_id: "L001".into(),
            sent_time: sent,
            replied_time: replied,
            response_status: String::new(),
            email_type: "outreach".into(),
            opened,
            engagement_score: 0.0,
        }
    }

    #[test]
    fn empty_history_is_all_zero() {
        let features = HistoryFeatures::from_interactions(&[]);
        assert!(features.is_empty());
        assert_eq!(features.response_rate, 0.0);
        assert_eq!(features.best_weekday, None);
        assert_eq!(features.best_hour, None);
        assert_eq!(features.mean_reply_delay_hours, None);
        assert_eq!(features.first_contact, None);
    }

    #[test]
    fn counts_and_response_rate() {
        // 2024-04-01 is a Monday.
        let rows = vec![
            interaction(Some(at(1, 9)), Some(at(1, 14)), true),
            interaction(Some(at(3, 9)), None, true),
            interaction(Some(at(8, 9)), Some(at(8, 10)), false),
            interaction(Some(at(10, 9)), None, false),
        ];
        let features = HistoryFeatures::from_interactions(&rows);

        assert_eq!(features.sends, 4);
        assert_eq!(features.opens, 2);
        assert_eq!(features.replies, 2);
        assert_eq!(features.response_rate, 0.5);
        assert_eq!(features.first_contact, Some(at(1, 9)));
        assert_eq!(features.last_contact, Some(at(10, 9)));
    }

    #[test]
    fn best_weekday_and_hour_are_reply_modes() {
        // Replies on two Mondays at 14:00 and one Wednesday at 10:00.
        let rows = vec![
            interaction(Some(at(1, 9)), Some(at(1, 14)), true),
            interaction(Some(at(8, 9)), Some(at(8, 14)), true),
            interaction(Some(at(3, 9)), Some(at(3, 10)), true),
        ];
        let features = HistoryFeatures::from_interactions(&rows);

        assert_eq!(features.best_weekday, Some(Weekday::Mon));
        assert_eq!(features.best_hour, Some(14));
    }

    #[test]
    fn mean_reply_delay_skips_incomplete_pairs() {
        let rows = vec![
            // 5 hours.
            interaction(Some(at(1, 9)), Some(at(1, 14)), true),
            // 1 hour.
            interaction(Some(at(8, 9)), Some(at(8, 10)), true),
            // No reply stamp: excluded from the mean.
            interaction(Some(at(3, 9)), None, false),
        ];
        let features = HistoryFeatures::from_interactions(&rows);

        let mean = features.mean_reply_delay_hours.unwrap();
        assert!((mean - 3.0).abs() < 1e-9);
    }

    #[test]
    fn reply_before_send_is_ignored_in_delay() {
        // Clock skew in exports: replied before sent.
        let rows = vec![interaction(Some(at(8, 9)), Some(at(1, 9)), true)];
        let features = HistoryFeatures::from_interactions(&rows);

        assert_eq!(features.replies, 1);
        assert_eq!(features.mean_reply_delay_hours, None);
    }

    #[test]
    fn status_only_reply_counts_without_timestamps() {
        let mut row = interaction(Some(at(1, 9)), None, true);
        row.response_status = "Replied".into();
        let features = HistoryFeatures::from_interactions(&[row]);

        assert_eq!(features.replies, 1);
        assert_eq!(features.best_weekday, None);
        assert_eq!(features.mean_reply_delay_hours, None);
    }
}
