//! LLM Client Abstraction
//!
//! Common trait the generation and summarization adapters talk through, so
//! the backend (mock, Ollama, OpenAI-compatible) is swappable per request.

use async_trait::async_trait;

use crate::error::LlmError;

/// Common interface for chat-capable LLM backends
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send a system + user prompt pair, get the reply text back.
    async fn chat(&self, system_prompt: &str, user_prompt: &str) -> Result<String, LlmError>;

    /// Get the model name used by this client
    fn model_name(&self) -> &str;

    /// Get the backend name ("mock", "ollama", "openai")
    fn backend_name(&self) -> &str;
}
