//! Gemini `generateContent` client

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::{Inference, InferenceRequest, Interpreter};
use crate::config::AiConfig;
use crate::utils::errors::{BillyError, Result};
use crate::utils::helpers::truncate_text;
use crate::utils::logging::log_api_error;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<RequestContent<'a>>,
    generation_config: GenerationConfig<'a>,
}

#[derive(Serialize)]
struct RequestContent<'a> {
    role: &'static str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig<'a> {
    temperature: f32,
    max_output_tokens: u32,
    response_mime_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_schema: Option<&'a Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<ResponseContent>,
}

#[derive(Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    total_token_count: u64,
}

/// HTTP client for the Gemini API
#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    retries: u32,
}

impl GeminiClient {
    pub fn new(config: &AiConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            http,
            endpoint: format!(
                "{}/v1beta/models/{}:generateContent",
                config.base_url.trim_end_matches('/'),
                config.model
            ),
            api_key: config.api_key.clone(),
            retries: config.request_retries.max(1),
        })
    }

    async fn generate(&self, request: &InferenceRequest) -> Result<Inference> {
        let body = GenerateContentRequest {
            contents: vec![RequestContent {
                role: "user",
                parts: request
                    .prompt_parts
                    .iter()
                    .map(|text| RequestPart { text: text.as_str() })
                    .collect(),
            }],
            generation_config: GenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.max_tokens,
                response_mime_type: if request.schema.is_some() {
                    "application/json"
                } else {
                    "text/plain"
                },
                response_schema: request.schema.as_ref(),
            },
        };

        let response = self
            .http
            .post(&self.endpoint)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status.is_server_error() {
            return Err(BillyError::ServiceUnavailable(format!(
                "Interpretation service returned {}",
                status
            )));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(BillyError::Interpretation(format!(
                "Interpretation service returned {}: {}",
                status,
                truncate_text(&text, 200)
            )));
        }

        let parsed: GenerateContentResponse = response.json().await?;
        let tokens = parsed
            .usage_metadata
            .map(|usage| usage.total_token_count)
            .unwrap_or(0);
        let text: String = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| content.parts.into_iter().filter_map(|p| p.text).collect())
            .ok_or_else(|| BillyError::Interpretation("Empty interpretation response".to_string()))?;

        let content = if request.schema.is_some() {
            serde_json::from_str(&text).map_err(|e| {
                BillyError::Interpretation(format!("Unparseable structured answer: {}", e))
            })?
        } else {
            Value::String(text)
        };

        debug!(tokens = tokens, "Interpretation completed");
        Ok(Inference { tokens, content })
    }
}

#[async_trait]
impl Interpreter for GeminiClient {
    async fn infer(&self, request: InferenceRequest) -> Result<Inference> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.generate(&request).await {
                Ok(inference) => return Ok(inference),
                Err(e) if e.is_transient() && attempt < self.retries => {
                    warn!(attempt = attempt, error = %e, "Transient interpretation failure, retrying");
                }
                Err(e) if e.is_transient() => {
                    log_api_error("gemini", &e.to_string(), Some("retries exhausted"));
                    return Err(BillyError::Interpretation(format!(
                        "Gave up after {} attempts: {}",
                        attempt, e
                    )));
                }
                Err(e) => {
                    log_api_error("gemini", &e.to_string(), None);
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const GENERATE_PATH: &str = "/v1beta/models/test-model:generateContent";

    fn config(base_url: &str) -> AiConfig {
        AiConfig {
            base_url: base_url.to_string(),
            api_key: "test-key".to_string(),
            model: "test-model".to_string(),
            request_retries: 3,
            request_timeout_seconds: 5,
        }
    }

    fn answer(text: &str, tokens: u64) -> serde_json::Value {
        json!({
            "candidates": [{ "content": { "role": "model", "parts": [{ "text": text }] } }],
            "usageMetadata": { "totalTokenCount": tokens }
        })
    }

    #[tokio::test]
    async fn parses_structured_answer_and_tokens() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .and(header("x-goog-api-key", "test-key"))
            .and(body_partial_json(json!({
                "generationConfig": { "responseMimeType": "application/json" }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(answer(r#"{"value": true}"#, 42)))
            .expect(1)
            .mount(&server)
            .await;

        let client = GeminiClient::new(&config(&server.uri())).unwrap();
        let request = InferenceRequest::new(vec!["yes or no".into(), "sure".into()])
            .with_schema(json!({ "type": "OBJECT" }));

        let inference = client.infer(request).await.unwrap();
        assert_eq!(inference.tokens, 42);
        assert_eq!(inference.content, json!({ "value": true }));
    }

    #[tokio::test]
    async fn plain_text_answers_are_strings() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(answer("You're welcome!", 7)))
            .mount(&server)
            .await;

        let client = GeminiClient::new(&config(&server.uri())).unwrap();
        let inference = client
            .infer(InferenceRequest::new(vec!["thanks".into()]))
            .await
            .unwrap();
        assert_eq!(inference.content, json!("You're welcome!"));
    }

    #[tokio::test]
    async fn retries_server_errors_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(answer("ok", 3)))
            .expect(1)
            .mount(&server)
            .await;

        let client = GeminiClient::new(&config(&server.uri())).unwrap();
        let inference = client
            .infer(InferenceRequest::new(vec!["hi".into()]))
            .await
            .unwrap();
        assert_eq!(inference.tokens, 3);
    }

    #[tokio::test]
    async fn gives_up_after_configured_retries() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let client = GeminiClient::new(&config(&server.uri())).unwrap();
        let result = client.infer(InferenceRequest::new(vec!["hi".into()])).await;
        assert_matches!(result, Err(BillyError::Interpretation(msg)) if msg.contains("3 attempts"));
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad schema"))
            .expect(1)
            .mount(&server)
            .await;

        let client = GeminiClient::new(&config(&server.uri())).unwrap();
        let result = client.infer(InferenceRequest::new(vec!["hi".into()])).await;
        assert_matches!(result, Err(BillyError::Interpretation(msg)) if msg.contains("bad schema"));
    }

    #[tokio::test]
    async fn connection_failures_surface_as_interpretation_errors() {
        let client = GeminiClient::new(&config("http://127.0.0.1:9")).unwrap();
        let result = client.infer(InferenceRequest::new(vec!["hi".into()])).await;
        assert_matches!(result, Err(BillyError::Interpretation(_)));
    }
}
