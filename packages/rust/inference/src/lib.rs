//! HTTP text-generation client and model payload extraction.
//!
//! This crate provides:
//! - [`InferenceClient`]: a bounded-timeout client whose [`generate`] call
//!   never fails (transport problems degrade to a placeholder response)
//! - [`extract`]: the response-unwrapping parser stages use to pull a JSON
//!   payload out of whatever text the model produced
//!
//! [`generate`]: InferenceClient::generate

pub mod extract;

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use leadflow_shared::{InferenceConfig, LeadFlowError, Result, resolve_api_key};

pub use extract::{ExtractError, extract_json_payload, parse_stage};

/// User-Agent string for inference requests.
const USER_AGENT: &str = concat!("LeadFlow/", env!("CARGO_PKG_VERSION"));

/// Returned by [`InferenceClient::generate`] whenever the service cannot
/// produce text. Parses as an empty JSON object, so stage payload parsing
/// fails cleanly into the stage's fallback.
pub const PLACEHOLDER_RESPONSE: &str = "{}";

/// Body shape of the generation endpoint's response.
#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: Option<String>,
}

/// Client for the text-generation service.
///
/// Construction can fail (bad base URL, client build); generation cannot.
/// The pipeline depends on that asymmetry: a dead or misbehaving model
/// service degrades every stage to its fallback but never stops a batch.
#[derive(Debug, Clone)]
pub struct InferenceClient {
    client: Client,
    endpoint: Url,
    model: String,
    max_tokens: u32,
    temperature: f32,
    api_key: Option<String>,
}

impl InferenceClient {
    /// Build a client from config. Resolves the bearer token from the
    /// configured env var, if any.
    pub fn new(config: &InferenceConfig) -> Result<Self> {
        let base = config.base_url.trim_end_matches('/');
        let endpoint = Url::parse(&format!("{base}/api/generate"))
            .map_err(|e| LeadFlowError::Inference(format!("invalid base_url {base:?}: {e}")))?;

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LeadFlowError::Inference(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            api_key: resolve_api_key(config),
        })
    }

    /// Override the bearer token (tests, callers with out-of-band keys).
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Generate text for `prompt`.
    ///
    /// Never fails: transport errors, non-success statuses, timeouts, and
    /// missing response fields all log a warning and return
    /// [`PLACEHOLDER_RESPONSE`].
    pub async fn generate(&self, prompt: &str) -> String {
        let body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": {
                "num_predict": self.max_tokens,
                "temperature": self.temperature,
            },
        });

        let mut request = self.client.post(self.endpoint.clone()).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "inference request failed, using placeholder");
                return PLACEHOLDER_RESPONSE.to_string();
            }
        };

        let status = response.status();
        if !status.is_success() {
            warn!(%status, "inference service returned error status, using placeholder");
            return PLACEHOLDER_RESPONSE.to_string();
        }

        match response.json::<GenerateResponse>().await {
            Ok(GenerateResponse {
                response: Some(text),
            }) => {
                debug!(chars = text.len(), "inference response received");
                text
            }
            Ok(GenerateResponse { response: None }) => {
                warn!("inference response missing `response` field, using placeholder");
                PLACEHOLDER_RESPONSE.to_string()
            }
            Err(e) => {
                warn!(error = %e, "unreadable inference response body, using placeholder");
                PLACEHOLDER_RESPONSE.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn test_config(base_url: &str) -> InferenceConfig {
        InferenceConfig {
            base_url: base_url.to_string(),
            model: "test-model".into(),
            timeout_secs: 1,
            api_key_env: String::new(),
            max_tokens: 64,
            temperature: 0.0,
        }
    }

    #[test]
    fn rejects_invalid_base_url() {
        let config = test_config("not a url");
        assert!(InferenceClient::new(&config).is_err());
    }

    #[tokio::test]
    async fn generate_returns_response_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_partial_json(serde_json::json!({
                "model": "test-model",
                "stream": false,
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "response": "{\"intent_score\": 80, \"signals\": []}",
            })))
            .mount(&server)
            .await;

        let client = InferenceClient::new(&test_config(&server.uri())).unwrap();
        let text = client.generate("score this lead").await;
        assert!(text.contains("intent_score"));
    }

    #[tokio::test]
    async fn error_status_yields_placeholder() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = InferenceClient::new(&test_config(&server.uri())).unwrap();
        assert_eq!(client.generate("prompt").await, PLACEHOLDER_RESPONSE);
    }

    #[tokio::test]
    async fn unreachable_service_yields_placeholder() {
        // Nothing listening on this port.
        let client = InferenceClient::new(&test_config("http://127.0.0.1:9")).unwrap();
        assert_eq!(client.generate("prompt").await, PLACEHOLDER_RESPONSE);
    }

    #[tokio::test]
    async fn missing_response_field_yields_placeholder() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"done": true})),
            )
            .mount(&server)
            .await;

        let client = InferenceClient::new(&test_config(&server.uri())).unwrap();
        assert_eq!(client.generate("prompt").await, PLACEHOLDER_RESPONSE);
    }

    #[tokio::test]
    async fn slow_service_times_out_to_placeholder() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"response": "late"}))
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        // 1s client timeout vs 5s response delay.
        let client = InferenceClient::new(&test_config(&server.uri())).unwrap();
        assert_eq!(client.generate("prompt").await, PLACEHOLDER_RESPONSE);
    }

    #[tokio::test]
    async fn bearer_token_sent_when_configured() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(header("authorization", "Bearer secret-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "response": "authorized",
            })))
            .mount(&server)
            .await;

        let client = InferenceClient::new(&test_config(&server.uri()))
            .unwrap()
            .with_api_key("secret-token");
        assert_eq!(client.generate("prompt").await, "authorized");
    }
}
