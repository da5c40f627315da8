//! Backend Selection
//!
//! Enum for selecting between LLM backends (mock, Ollama, OpenAI).

use std::str::FromStr;

/// LLM backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LlmBackend {
    /// Canned responses, no network (default)
    #[default]
    Mock,
    /// Local model served by Ollama
    Ollama,
    /// OpenAI-compatible chat completions endpoint
    OpenAi,
}

impl LlmBackend {
    /// Create from the LLM_BACKEND environment variable
    ///
    /// Valid values: "mock", "ollama", "openai", "gpt"
    /// Defaults to Mock if not set
    pub fn from_env() -> Result<Self, ParseBackendError> {
        let value = std::env::var("LLM_BACKEND").unwrap_or_else(|_| "mock".to_string());
        value.parse()
    }

    /// Get display name
    pub fn name(&self) -> &'static str {
        match self {
            LlmBackend::Mock => "mock",
            LlmBackend::Ollama => "ollama",
            LlmBackend::OpenAi => "openai",
        }
    }
}

/// Error type for parsing LlmBackend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseBackendError(String);

impl std::fmt::Display for ParseBackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ParseBackendError {}

impl FromStr for LlmBackend {
    type Err = ParseBackendError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mock" => Ok(LlmBackend::Mock),
            "ollama" => Ok(LlmBackend::Ollama),
            "openai" | "gpt" => Ok(LlmBackend::OpenAi),
            other => Err(ParseBackendError(format!(
                "unknown backend '{}'. Valid values: mock, ollama, openai",
                other
            ))),
        }
    }
}

impl std::fmt::Display for LlmBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_str() {
        assert_eq!("mock".parse::<LlmBackend>().unwrap(), LlmBackend::Mock);
        assert_eq!("MOCK".parse::<LlmBackend>().unwrap(), LlmBackend::Mock);
        assert_eq!("ollama".parse::<LlmBackend>().unwrap(), LlmBackend::Ollama);
        assert_eq!("openai".parse::<LlmBackend>().unwrap(), LlmBackend::OpenAi);
        assert_eq!("gpt".parse::<LlmBackend>().unwrap(), LlmBackend::OpenAi);
        assert!("invalid".parse::<LlmBackend>().is_err());
    }

    #[test]
    fn test_default() {
        assert_eq!(LlmBackend::default(), LlmBackend::Mock);
    }

    #[test]
    fn test_display_matches_wire_name() {
        assert_eq!(LlmBackend::Ollama.to_string(), "ollama");
    }
}
