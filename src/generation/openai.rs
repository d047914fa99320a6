use super::{GenerationSettings, Generator};
use crate::error::{Result, ScriptRagError};
use crate::resilience::{error_from_response, error_from_transport};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const PROVIDER: &str = "openai";
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Client for OpenAI-compatible chat completion endpoints
pub struct OpenAiGenerator {
    client: Client,
    endpoint: String,
    model: String,
    settings: GenerationSettings,
}

impl OpenAiGenerator {
    pub fn new(
        api_key: &str,
        model: &str,
        base_url: Option<&str>,
        settings: GenerationSettings,
        timeout: Duration,
    ) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(ScriptRagError::permanent(PROVIDER, "missing OpenAI API key"));
        }

        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {}", api_key.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth)
                .map_err(|_| ScriptRagError::permanent(PROVIDER, "invalid OpenAI API key"))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| ScriptRagError::permanent(PROVIDER, e.to_string()))?;

        let endpoint = format!(
            "{}/chat/completions",
            base_url.unwrap_or(DEFAULT_BASE_URL).trim_end_matches('/')
        );

        Ok(Self {
            client,
            endpoint,
            model: model.to_string(),
            settings,
        })
    }
}

#[async_trait]
impl Generator for OpenAiGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let body = ChatRequest {
            model: &self.model,
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_output_tokens,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        let resp = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| error_from_transport(PROVIDER, e))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(error_from_response(PROVIDER, status, &text));
        }

        let parsed: ChatResponse = resp
            .json()
            .await
            .map_err(|e| ScriptRagError::permanent(PROVIDER, format!("bad response: {}", e)))?;

        parsed
            .choices
            .into_iter()
            .find_map(|choice| choice.message.content)
            .filter(|answer| !answer.trim().is_empty())
            .ok_or_else(|| ScriptRagError::permanent(PROVIDER, "response missing text content"))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    max_tokens: usize,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_custom_base_url() {
        let generator = OpenAiGenerator::new(
            "sk-test",
            "gpt-4o-mini",
            Some("http://localhost:11434/v1/"),
            GenerationSettings::default(),
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(generator.endpoint, "http://localhost:11434/v1/chat/completions");
    }

    #[test]
    fn test_missing_key() {
        let result = OpenAiGenerator::new(
            "",
            "gpt-4o-mini",
            None,
            GenerationSettings::default(),
            Duration::from_secs(5),
        );
        assert!(result.is_err());
    }
}
