//! Ollama Client
//!
//! LLM client implementation for a locally served Ollama model.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::client::LlmClient;
use crate::error::LlmError;

/// Default local model
const DEFAULT_MODEL: &str = "llama3.1:8b-instruct-q4_K_M";

/// Default Ollama endpoint
const DEFAULT_BASE_URL: &str = "http://localhost:11434";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Ollama API client
#[derive(Clone)]
pub struct OllamaClient {
    base_url: String,
    client: reqwest::Client,
    model: String,
    timeout: Duration,
}

impl OllamaClient {
    /// Create a client from OLLAMA_BASE_URL / OLLAMA_MODEL, with defaults
    pub fn new() -> Self {
        let model = std::env::var("OLLAMA_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let base_url =
            std::env::var("OLLAMA_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        Self {
            base_url,
            client: reqwest::Client::new(),
            model,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Set a specific model
    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    /// Point at a different Ollama server
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Set the per-request deadline
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for OllamaClient {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ChatMessage,
}

/// Pull the reply text out of an `/api/chat` response body. Ollama reports
/// failures as `{"error": "..."}` with status 200 in some versions, so a body
/// without `message.content` maps to `MissingContent` rather than a decode
/// panic somewhere downstream.
fn parse_reply(body: &str) -> Result<String, LlmError> {
    let parsed: ChatResponse =
        serde_json::from_str(body).map_err(|_| LlmError::MissingContent)?;
    Ok(parsed.message.content)
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn chat(&self, system_prompt: &str, user_prompt: &str) -> Result<String, LlmError> {
        let body = serde_json::json!({
            "model": &self.model,
            "messages": [
                {"role": "system", "content": system_prompt},
                {"role": "user", "content": user_prompt}
            ],
            "stream": false,
            "options": {
                "temperature": 0.2,
                "num_predict": 512
            }
        });

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api { status, body });
        }

        let text = response.text().await?;
        parse_reply(&text)
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn backend_name(&self) -> &str {
        "ollama"
    }
}
