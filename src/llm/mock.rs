//! Mock Client
//!
//! Canned-response client for offline runs and tests. Never touches the
//! network.

use async_trait::async_trait;

use super::client::LlmClient;
use crate::error::LlmError;

const DEFAULT_RESPONSE: &str =
    "SELECT object_name, country, launch_date FROM satcat ORDER BY launch_date DESC LIMIT 10";

/// LLM client that replies with a fixed string
#[derive(Debug, Clone)]
pub struct MockClient {
    response: String,
}

impl MockClient {
    pub fn new() -> Self {
        Self {
            response: DEFAULT_RESPONSE.to_string(),
        }
    }

    /// Reply with a specific canned string instead of the default
    pub fn with_response(response: &str) -> Self {
        Self {
            response: response.to_string(),
        }
    }
}

impl Default for MockClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmClient for MockClient {
    async fn chat(&self, _system_prompt: &str, _user_prompt: &str) -> Result<String, LlmError> {
        Ok(self.response.clone())
    }

    fn model_name(&self) -> &str {
        "canned"
    }

    fn backend_name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replies_with_default() {
        let client = MockClient::new();
        let reply = client.chat("system", "user").await.unwrap();
        assert!(reply.starts_with("SELECT"));
        assert_eq!(client.backend_name(), "mock");
    }

    #[tokio::test]
    async fn replies_with_override() {
        let client = MockClient::with_response("SELECT 1");
        assert_eq!(client.chat("s", "u").await.unwrap(), "SELECT 1");
    }
}
