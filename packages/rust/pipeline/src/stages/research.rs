//! Research stage: firmographics and behavior metrics into insights.

use leadflow_inference::parse_stage;
use leadflow_shared::{EnrichmentState, LeadRecord, ResearchInsights, StageKey, StageReport};
use tracing::{debug, warn};

use super::StageContext;
use crate::prompts;

/// Analyze one lead. Writes the research slot; a rejected payload installs
/// the stage fallback and the report carries the reason.
pub async fn run(
    ctx: &StageContext,
    record: &LeadRecord,
    state: &mut EnrichmentState,
) -> StageReport {
    let raw = ctx.client.generate(&prompts::research_prompt(record)).await;

    match parse_stage::<ResearchInsights>(&raw) {
        Ok(insights) => {
            debug!(lead_id = %record.lead_id, insights = insights.insights.len(), "research complete");
            state.research = Some(insights);
            StageReport::completed(StageKey::Research)
        }
        Err(e) => {
            warn!(lead_id = %record.lead_id, error = %e, "research payload rejected");
            state.research = Some(ResearchInsights::fallback(&e.to_string()));
            StageReport::fallback(StageKey::Research, e.to_string())
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
    use leadflow_shared::{BatchId, InferenceConfig};
    use wiremock::matchers::{method, path};
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
            visits: 7,
            ..Default::default()
        }
    }

    fn state(ctx: &StageContext) -> EnrichmentState {
        EnrichmentState::new("L001", ctx.batch_id.clone())
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
    async fn valid_payload_fills_slot() {
        let server = MockServer::start().await;
        mock_generate(
            &server,
            r#"{"insights": [{"metric": "Site visits", "value": "7", "reasoning": "High"}], "recommendation": "Call soon"}"#,
        )
        .await;

        let ctx = ctx(&server.uri());
        let mut state = state(&ctx);
        let report = run(&ctx, &lead(), &mut state).await;

        assert!(!report.is_fallback());
        let research = state.research.expect("slot written");
        assert_eq!(research.insights.len(), 1);
        assert_eq!(research.recommendation, "Call soon");
    }

    #[tokio::test]
    async fn prose_wrapped_payload_still_parses() {
        let server = MockServer::start().await;
        mock_generate(
            &server,
            "Here you go:\n```json\n{\"insights\": [], \"recommendation\": \"Hold off\"}\n```",
        )
        .await;

        let ctx = ctx(&server.uri());
        let mut state = state(&ctx);
        let report = run(&ctx, &lead(), &mut state).await;

        assert!(!report.is_fallback());
        assert_eq!(state.research.unwrap().recommendation, "Hold off");
    }

    #[tokio::test]
    async fn malformed_payload_installs_fallback() {
        let server = MockServer::start().await;
        mock_generate(&server, "I could not produce insights for this lead.").await;

        let ctx = ctx(&server.uri());
        let mut state = state(&ctx);
        let report = run(&ctx, &lead(), &mut state).await;

        assert!(report.is_fallback());
        let research = state.research.expect("fallback slot written");
        assert_eq!(research.insights[0].metric, "Analysis Error");
        assert_eq!(research.insights[0].value, "Low");
    }

    #[tokio::test]
    async fn unreachable_model_degrades_to_fallback() {
        // Placeholder "{}" from the client lacks required keys.
        let ctx = ctx("http://127.0.0.1:9");
        let mut state = state(&ctx);
        let report = run(&ctx, &lead(), &mut state).await;

        assert!(report.is_fallback());
        assert!(state.research.is_some());
    }
}
