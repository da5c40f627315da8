//! OpenAI Client
//!
//! LLM client implementation for OpenAI-compatible chat completions APIs.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::client::LlmClient;
use crate::error::LlmError;

/// Default OpenAI model
const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Default chat completions endpoint; OPENAI_BASE_URL overrides it wholesale,
/// which is how self-hosted OpenAI-compatible servers are pointed at.
const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// OpenAI API client
#[derive(Clone)]
pub struct OpenAiClient {
    api_key: String,
    endpoint: String,
    client: reqwest::Client,
    model: String,
    timeout: Duration,
}

impl OpenAiClient {
    /// Create a new OpenAI client with the given API key
    pub fn new(api_key: String) -> Self {
        let model = std::env::var("OPENAI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let endpoint =
            std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string());
        Self {
            api_key,
            endpoint,
            client: reqwest::Client::new(),
            model,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Create with a specific model
    pub fn with_model(api_key: String, model: &str) -> Self {
        Self {
            model: model.to_string(),
            ..Self::new(api_key)
        }
    }

    /// Point at a different OpenAI-compatible endpoint (full URL)
    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.to_string();
        self
    }

    /// Set the per-request deadline
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Internal API call implementation
    async fn call_api(&self, system_prompt: &str, user_prompt: &str) -> Result<String, LlmError> {
        let body = serde_json::json!({
            "model": &self.model,
            "messages": [
                {"role": "system", "content": system_prompt},
                {"role": "user", "content": user_prompt}
            ],
            "temperature": 0.1,
            "max_tokens": 300
        });

        let response = self
            .client
            .post(&self.endpoint)
            .timeout(self.timeout)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api { status, body });
        }

        #[derive(Deserialize)]
        struct Message {
            content: String,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: Message,
        }
        #[derive(Deserialize)]
        struct ApiResponse {
            choices: Vec<Choice>,
        }

        let api_response: ApiResponse = response.json().await?;
        api_response
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .ok_or(LlmError::MissingContent)
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn chat(&self, system_prompt: &str, user_prompt: &str) -> Result<String, LlmError> {
        self.call_api(system_prompt, user_prompt).await
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn backend_name(&self) -> &str {
        "openai"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_client() {
        let client = OpenAiClient::new("test-key".to_string());
        assert_eq!(client.model_name(), DEFAULT_MODEL);
        assert_eq!(client.backend_name(), "openai");
    }

    #[test]
    fn test_with_model() {
        let client = OpenAiClient::with_model("test-key".to_string(), "gpt-4o");
        assert_eq!(client.model_name(), "gpt-4o");
    }

    #[test]
    fn test_with_timeout() {
        let client = OpenAiClient::new("test-key".to_string())
            .with_timeout(Duration::from_secs(5));
        assert_eq!(client.timeout, Duration::from_secs(5));
    }
}
