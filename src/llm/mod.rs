//! LLM integration: backend selection, chat clients, and the two pipeline
//! adapters built on top of them (SQL generation and answer drafting).

mod backend;
mod client;
mod generator;
mod mock;
mod ollama;
mod openai;
mod summarizer;

pub use backend::{LlmBackend, ParseBackendError};
pub use client::LlmClient;
pub use generator::SqlGenerator;
pub use mock::MockClient;
pub use ollama::OllamaClient;
pub use openai::OpenAiClient;
pub use summarizer::ResultSummarizer;

use std::sync::Arc;

use crate::config::LlmConfig;

/// The clients a process has available, one slot per backend.
///
/// Built once at startup; per-request backend hints pick a slot instead of
/// constructing new clients. The OpenAI slot is absent when no API key is
/// configured.
pub struct ClientSet {
    default_backend: LlmBackend,
    mock: Arc<dyn LlmClient>,
    ollama: Arc<dyn LlmClient>,
    openai: Option<Arc<dyn LlmClient>>,
}

impl ClientSet {
    pub fn new(
        default_backend: LlmBackend,
        mock: Arc<dyn LlmClient>,
        ollama: Arc<dyn LlmClient>,
        openai: Option<Arc<dyn LlmClient>>,
    ) -> Self {
        Self {
            default_backend,
            mock,
            ollama,
            openai,
        }
    }

    /// Every slot served by the same client, mock as default. Used by tests
    /// and offline tooling.
    pub fn single(client: Arc<dyn LlmClient>) -> Self {
        Self::new(
            LlmBackend::Mock,
            Arc::clone(&client),
            client,
            None,
        )
    }

    pub fn from_config(config: &LlmConfig) -> Self {
        let openai = config.openai_api_key.as_ref().map(|key| {
            Arc::new(
                OpenAiClient::with_model(key.clone(), &config.openai_model)
                    .with_endpoint(&config.openai_base_url)
                    .with_timeout(config.request_timeout),
            ) as Arc<dyn LlmClient>
        });
        Self {
            default_backend: config.backend,
            mock: Arc::new(MockClient::new()),
            ollama: Arc::new(
                OllamaClient::new()
                    .with_base_url(&config.ollama_base_url)
                    .with_model(&config.ollama_model)
                    .with_timeout(config.request_timeout),
            ),
            openai,
        }
    }

    pub fn default_backend(&self) -> LlmBackend {
        self.default_backend
    }

    /// Client for a specific backend, `None` when that backend is not
    /// configured in this process.
    pub fn get(&self, backend: LlmBackend) -> Option<Arc<dyn LlmClient>> {
        match backend {
            LlmBackend::Mock => Some(Arc::clone(&self.mock)),
            LlmBackend::Ollama => Some(Arc::clone(&self.ollama)),
            LlmBackend::OpenAi => self.openai.as_ref().map(Arc::clone),
        }
    }

    pub fn default_client(&self) -> Arc<dyn LlmClient> {
        self.get(self.default_backend)
            .unwrap_or_else(|| Arc::clone(&self.mock))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_set_defaults_to_mock() {
        let set = ClientSet::single(Arc::new(MockClient::new()));
        assert_eq!(set.default_backend(), LlmBackend::Mock);
        assert_eq!(set.default_client().backend_name(), "mock");
    }

    #[test]
    fn unconfigured_openai_slot_is_none() {
        let set = ClientSet::single(Arc::new(MockClient::new()));
        assert!(set.get(LlmBackend::OpenAi).is_none());
        assert!(set.get(LlmBackend::Ollama).is_some());
    }
}
