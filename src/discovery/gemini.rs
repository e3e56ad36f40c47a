use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::app::{MurmurError, Result};
use crate::discovery::retry::parse_retry_after;
use crate::discovery::{AiConfig, LanguageModel, ModelError};

const API_KEY_HEADER: &str = "x-goog-api-key";

/// Client for the Gemini `generateContent` endpoint
pub struct GeminiClient {
    http_client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    response_mime_type: &'static str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: String,
}

impl GeminiClient {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
        http_client: Client,
    ) -> Self {
        Self {
            http_client,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        }
    }

    /// Build from config, reading the key from the configured variable
    pub fn from_config(config: &AiConfig) -> Result<Self> {
        let api_key = config
            .api_key()
            .ok_or_else(|| MurmurError::Service(format!("{} not set", config.api_key_env)))?;
        let http_client = Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self::new(
            api_key,
            config.api_base.clone(),
            config.model.clone(),
            http_client,
        ))
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }
}

#[async_trait]
impl LanguageModel for GeminiClient {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> std::result::Result<String, ModelError> {
        let request = GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![Part { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.1,
                response_mime_type: "application/json",
            },
        };

        debug!(model = %self.model, prompt_chars = prompt.len(), "Calling Gemini");

        let response = self
            .http_client
            .post(self.endpoint())
            .header(API_KEY_HEADER, self.api_key.as_str())
            .json(&request)
            .send()
            .await
            .map_err(|e| ModelError::Transient(e.without_url().to_string()))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = parse_retry_after(
                response
                    .headers()
                    .get(RETRY_AFTER)
                    .and_then(|v| v.to_str().ok()),
            );
            return Err(ModelError::RateLimited { retry_after });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = format!("HTTP {}: {}", status, body.chars().take(300).collect::<String>());
            return Err(if status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT {
                ModelError::Transient(message)
            } else {
                ModelError::Fatal(message)
            });
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| {
                ModelError::Transient(format!("unreadable response: {}", e.without_url()))
            })?;

        let text: String = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().map(|p| p.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(ModelError::Transient("empty model response".into()));
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> GeminiClient {
        GeminiClient::new("test-key", server.uri(), "gemini-test", Client::new())
    }

    #[tokio::test]
    async fn test_generate_reads_first_candidate() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-test:generateContent"))
            .and(header("x-goog-api-key", "test-key"))
            .and(body_partial_json(serde_json::json!({
                "generationConfig": {"responseMimeType": "application/json"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{"content": {"parts": [{"text": "[{\"item\": \"li\"}]"}]}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let text = client(&server).generate("find comments").await.unwrap();
        assert_eq!(text, r#"[{"item": "li"}]"#);
    }

    #[tokio::test]
    async fn test_rate_limit_carries_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "7"))
            .mount(&server)
            .await;

        let err = client(&server).generate("x").await.unwrap_err();
        assert_eq!(
            err,
            ModelError::RateLimited {
                retry_after: Some(Duration::from_secs(7))
            }
        );
    }

    #[tokio::test]
    async fn test_server_error_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let err = client(&server).generate("x").await.unwrap_err();
        assert!(matches!(err, ModelError::Transient(_)));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_client_error_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string("API key invalid"))
            .mount(&server)
            .await;

        let err = client(&server).generate("x").await.unwrap_err();
        assert!(matches!(err, ModelError::Fatal(ref m) if m.contains("API key invalid")));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_empty_candidates_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        let err = client(&server).generate("x").await.unwrap_err();
        assert!(matches!(err, ModelError::Transient(_)));
    }

    #[tokio::test]
    async fn test_transport_error_does_not_leak_key() {
        let client = GeminiClient::new(
            "secret-key-123",
            "http://127.0.0.1:1",
            "gemini-test",
            Client::new(),
        );

        let err = client.generate("x").await.unwrap_err();
        match err {
            ModelError::Transient(message) => assert!(!message.contains("secret-key-123")),
            other => panic!("expected transient error, got {:?}", other),
        }
    }
}
