//! Composition stage: personalized subject line and message preview.

use leadflow_inference::parse_stage;
use leadflow_shared::{
    EnrichmentState, LeadRecord, MessageDraft, Qualification, ResearchInsights, StageKey,
    StageReport,
};
use tracing::{debug, warn};

use super::StageContext;
use crate::prompts;

/// Draft an outreach message for one lead. Below the configured intent
/// threshold the stage records a skip-style fallback without an inference
/// call; the record still flows through timing and summary.
pub async fn run(
    ctx: &StageContext,
    record: &LeadRecord,
    state: &mut EnrichmentState,
) -> StageReport {
    let score = state.intent_score().unwrap_or(0.0);
    if score < ctx.compose_min_intent {
        debug!(
            lead_id = %record.lead_id,
            score,
            threshold = ctx.compose_min_intent,
            "composition gated off"
        );
        state.message = Some(MessageDraft::fallback());
        return StageReport::fallback(StageKey::Composition, "intent below threshold");
    }

    let raw = ctx.client.generate(&build_prompt(record, state)).await;

    match parse_stage::<MessageDraft>(&raw) {
        Ok(draft) => {
            debug!(lead_id = %record.lead_id, subject = %draft.subject, "message drafted");
            state.message = Some(draft);
            StageReport::completed(StageKey::Composition)
        }
        Err(e) => {
            warn!(lead_id = %record.lead_id, error = %e, "composition payload rejected");
            state.message = Some(MessageDraft::fallback());
            StageReport::fallback(StageKey::Composition, e.to_string())
        }
    }
}

/// Both slots are always written by earlier stages; the fallbacks here only
/// matter when composition is exercised on its own.
fn build_prompt(record: &LeadRecord, state: &EnrichmentState) -> String {
    let research = state
        .research
        .clone()
        .unwrap_or_else(|| ResearchInsights::fallback("research stage did not run"));
    let qualification = state
        .qualification
        .clone()
        .unwrap_or_else(|| Qualification::fallback("qualification stage did not run"));
    prompts::composition_prompt(record, &research, &qualification)
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
            ..Default::default()
        }
    }

    fn qualified_state(ctx: &StageContext, score: f32) -> EnrichmentState {
        let mut state = EnrichmentState::new("L001", ctx.batch_id.clone());
        state.qualification = Some(Qualification {
            intent_score: score,
            signals: vec![],
        });
        state
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
    async fn valid_payload_writes_draft() {
        let server = MockServer::start().await;
        mock_generate(
            &server,
            r#"{"subject": "Quick question about Initech", "email_preview": "Hi Ada, saw your team evaluating us.", "personalization_factors": ["Repeat visits"]}"#,
        )
        .await;

        let ctx = ctx(&server.uri());
        let mut state = qualified_state(&ctx, 80.0);
        let report = run(&ctx, &lead(), &mut state).await;

        assert!(!report.is_fallback());
        let draft = state.message.expect("slot written");
        assert_eq!(draft.subject, "Quick question about Initech");
        assert_eq!(draft.personalization_factors, vec!["Repeat visits".to_string()]);
    }

    #[tokio::test]
    async fn below_threshold_skips_inference() {
        // expect(0) turns any stray inference call into a verify failure.
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let mut ctx = ctx(&server.uri());
        ctx.compose_min_intent = 50.0;
        let mut state = qualified_state(&ctx, 20.0);
        let report = run(&ctx, &lead(), &mut state).await;

        assert!(report.is_fallback());
        assert_eq!(
            state.message.expect("fallback draft").subject,
            "Error drafting email"
        );
    }

    #[tokio::test]
    async fn missing_qualification_counts_as_zero_intent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let mut ctx = ctx(&server.uri());
        ctx.compose_min_intent = 10.0;
        let mut state = EnrichmentState::new("L001", ctx.batch_id.clone());
        let report = run(&ctx, &lead(), &mut state).await;

        assert!(report.is_fallback());
    }

    #[tokio::test]
    async fn malformed_payload_installs_error_draft() {
        let server = MockServer::start().await;
        mock_generate(&server, "Sorry, I cannot write this email.").await;

        let ctx = ctx(&server.uri());
        let mut state = qualified_state(&ctx, 80.0);
        let report = run(&ctx, &lead(), &mut state).await;

        assert!(report.is_fallback());
        let draft = state.message.expect("fallback slot written");
        assert_eq!(draft.subject, "Error drafting email");
        assert_eq!(draft.email_preview, "Failed to generate email.");
        assert_eq!(draft.personalization_factors, vec!["Error".to_string()]);
    }
}
