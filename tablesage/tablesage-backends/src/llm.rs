//! Text generation over an OpenAI-compatible chat completions API.

use crate::error::GenerationError;
use crate::traits::TextGenerator;
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tablesage_core::config::LlmConfig;
use tracing::{debug, info};

/// Chat completion client. Each prompt is sent as a single user message.
pub struct HttpTextGenerator {
    client: Client,
    endpoint: String,
    model: String,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Debug, Deserialize)]
struct ChatMessageResponse {
    #[serde(default)]
    content: Option<String>,
}

impl HttpTextGenerator {
    /// Generator for the primary model.
    pub fn new(config: &LlmConfig) -> Result<Self, GenerationError> {
        Self::with_model(config, &config.model)
    }

    /// Generator for the smaller extraction model.
    pub fn extraction(config: &LlmConfig) -> Result<Self, GenerationError> {
        Self::with_model(config, &config.extraction_model)
    }

    fn with_model(config: &LlmConfig, model: &str) -> Result<Self, GenerationError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = &config.api_key {
            let value = HeaderValue::from_str(&format!("Bearer {}", key))
                .map_err(|e| GenerationError::Http(e.to_string()))?;
            headers.insert(AUTHORIZATION, value);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()?;

        info!("Initialized text generator with model: {}", model);

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            model: model.to_string(),
            temperature: config.temperature,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl TextGenerator for HttpTextGenerator {
    async fn complete(&self, prompt: &str) -> Result<String, GenerationError> {
        debug!(model = %self.model, prompt_chars = prompt.chars().count(), "Requesting completion");

        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.temperature,
        };

        let response = self.client.post(&self.endpoint).json(&body).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(GenerationError::Response(format!("HTTP {}: {}", status, text)));
        }

        let text = response.text().await?;
        let parsed: ChatResponse =
            serde_json::from_str(&text).map_err(|e| GenerationError::Malformed(e.to_string()))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| GenerationError::Malformed("response has no choices".to_string()))?
            .message
            .content
            .unwrap_or_default();

        let content = content.trim();
        if content.is_empty() {
            return Err(GenerationError::EmptyOutput);
        }

        Ok(content.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> LlmConfig {
        LlmConfig {
            endpoint: format!("{}/v1/chat/completions", server.uri()),
            api_key: Some("test-key".to_string()),
            timeout_secs: 5,
            ..LlmConfig::default()
        }
    }

    #[tokio::test]
    async fn test_complete_returns_trimmed_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("Authorization", "Bearer test-key"))
            .and(body_partial_json(serde_json::json!({"model": "llama-3.3-70b-versatile"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": "  Try Joe's Pizza.  "}}]
            })))
            .mount(&server)
            .await;

        let generator = HttpTextGenerator::new(&config_for(&server)).unwrap();
        let text = generator.complete("where is pizza?").await.unwrap();
        assert_eq!(text, "Try Joe's Pizza.");
    }

    #[tokio::test]
    async fn test_extraction_generator_uses_small_model() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({"model": "llama3-8b-8192"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "- **Cafe A**: vegan"}}]
            })))
            .mount(&server)
            .await;

        let generator = HttpTextGenerator::extraction(&config_for(&server)).unwrap();
        assert_eq!(generator.model(), "llama3-8b-8192");
        assert!(generator.complete("extract").await.is_ok());
    }

    #[tokio::test]
    async fn test_error_status_and_blank_output() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("\"content\":\"fail\""))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_string_contains("\"content\":\"blank\""))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "   "}}]
            })))
            .mount(&server)
            .await;

        let generator = HttpTextGenerator::new(&config_for(&server)).unwrap();
        assert!(matches!(
            generator.complete("fail").await,
            Err(GenerationError::Response(_))
        ));
        assert!(matches!(
            generator.complete("blank").await,
            Err(GenerationError::EmptyOutput)
        ));
    }
}
