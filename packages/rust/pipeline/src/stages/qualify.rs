//! Qualification stage: intent scoring from insights and engagement.

use leadflow_inference::parse_stage;
use leadflow_shared::{
    EnrichmentState, LeadRecord, Qualification, ResearchInsights, StageKey, StageReport,
};
use tracing::{debug, warn};

use super::{HistoryFeatures, StageContext};
use crate::prompts;

/// Score one lead's purchase intent. Reads the research slot written by the
/// previous stage; the score is clamped to `[0, 100]` before it lands.
pub async fn run(
    ctx: &StageContext,
    record: &LeadRecord,
    history: &HistoryFeatures,
    state: &mut EnrichmentState,
) -> StageReport {
    // Research always leaves a payload behind, fallback included.
    let prompt = match &state.research {
        Some(research) => prompts::qualification_prompt(record, research, history),
        None => prompts::qualification_prompt(
            record,
            &ResearchInsights::fallback("research stage did not run"),
            history,
        ),
    };
    let raw = ctx.client.generate(&prompt).await;

    match parse_stage::<Qualification>(&raw) {
        Ok(mut qualification) => {
            qualification.intent_score = qualification.intent_score.clamp(0.0, 100.0);
            debug!(
                lead_id = %record.lead_id,
                score = qualification.intent_score,
                "lead qualified"
            );
            state.qualification = Some(qualification);
            StageReport::completed(StageKey::Qualification)
        }
        Err(e) => {
            warn!(lead_id = %record.lead_id, error = %e, "qualification payload rejected");
            state.qualification = Some(Qualification::fallback(&e.to_string()));
            StageReport::fallback(StageKey::Qualification, e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use leadflow_inference::InferenceClient;
    use leadflow_shared::{BatchId, InferenceConfig, SignalStrength};
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn ctx(base_url: &str) -> StageContext {
        let config = InferenceConfig {
            base_url: base_url.into(),
            timeout_secs: 5,
            ..Default::default()
        };
        StageContext {
            client: InferenceClient::new(&config).expect("client"),
            batch_id: BatchId::from_str("BATCH_2025_06_01_3F9A21BC").unwrap(),
            compose_min_intent: 0.0,
        }
    }

    fn lead() -> LeadRecord {
        LeadRecord {
            lead_id: "L001".into(),
            name: "Ada Lovelace".into(),
            company: "Initech".into(),
            ..Default::default()
        }
    }

    async fn mock_generate(server: &MockServer, response: &str) {
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "response": response })),
            )
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn valid_payload_scores_lead() {
        let server = MockServer::start().await;
        mock_generate(
            &server,
            r#"{"intent_score": 82.5, "signals": [{"signal": "Repeat visits", "strength": "high", "reasoning": "7 in two weeks"}]}"#,
        )
        .await;

        let ctx = ctx(&server.uri());
        let mut state = EnrichmentState::new("L001", ctx.batch_id.clone());
        let report = run(&ctx, &lead(), &HistoryFeatures::default(), &mut state).await;

        assert!(!report.is_fallback());
        let q = state.qualification.expect("slot written");
        assert_eq!(q.intent_score, 82.5);
        assert_eq!(q.signals[0].strength, SignalStrength::High);
    }

    #[tokio::test]
    async fn out_of_range_score_is_clamped() {
        let server = MockServer::start().await;
        mock_generate(&server, r#"{"intent_score": 140, "signals": []}"#).await;

        let ctx = ctx(&server.uri());
        let mut state = EnrichmentState::new("L001", ctx.batch_id.clone());
        run(&ctx, &lead(), &HistoryFeatures::default(), &mut state).await;

        assert_eq!(state.qualification.unwrap().intent_score, 100.0);
    }

    #[tokio::test]
    async fn prompt_carries_prior_research() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_string_contains("Lead with the integration story"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(
                    serde_json::json!({ "response": r#"{"intent_score": 50, "signals": []}"# }),
                ),
            )
            .expect(1)
            .mount(&server)
            .await;

        let ctx = ctx(&server.uri());
        let mut state = EnrichmentState::new("L001", ctx.batch_id.clone());
        state.research = Some(ResearchInsights {
            insights: vec![],
            recommendation: "Lead with the integration story".into(),
        });
        let report = run(&ctx, &lead(), &HistoryFeatures::default(), &mut state).await;

        assert!(!report.is_fallback());
    }

    #[tokio::test]
    async fn malformed_payload_zeroes_intent() {
        let server = MockServer::start().await;
        mock_generate(&server, r#"{"score": "high"}"#).await;

        let ctx = ctx(&server.uri());
        let mut state = EnrichmentState::new("L001", ctx.batch_id.clone());
        let report = run(&ctx, &lead(), &HistoryFeatures::default(), &mut state).await;

        assert!(report.is_fallback());
        let q = state.qualification.expect("fallback slot written");
        assert_eq!(q.intent_score, 0.0);
        assert_eq!(q.signals.len(), 1);
        assert_eq!(q.signals[0].strength, SignalStrength::Low);
    }
}
