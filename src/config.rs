//! Service configuration, read once at startup.
//!
//! Everything comes from the environment (`.env` is loaded by the binary
//! before this runs). Invalid values fail startup instead of being silently
//! defaulted.

use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::llm::LlmBackend;
use crate::pipeline::PipelineConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("required environment variable {0} is not set")]
    Missing(&'static str),
    #[error("invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

/// Top-level configuration for the service.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DbConfig,
    pub llm: LlmConfig,
    pub pipeline: PipelineConfig,
    pub executor: ExecutorConfig,
    pub catalog: CatalogConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: String,
    pub max_connections: u32,
    /// Fail fast when the pool is saturated rather than queueing requests.
    pub acquire_timeout_ms: u64,
}

impl DbConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }
}

/// LLM adapter settings shared by the generation and summary clients.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub backend: LlmBackend,
    pub ollama_base_url: String,
    pub ollama_model: String,
    /// Full chat-completions endpoint, overridable for proxies.
    pub openai_base_url: String,
    pub openai_model: String,
    pub openai_api_key: Option<String>,
    pub request_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Hard cap on rows returned to the caller, independent of any LIMIT.
    pub max_rows: usize,
    pub statement_timeout_ms: u64,
}

#[derive(Debug, Clone)]
pub struct CatalogConfig {
    pub cache_ttl_secs: u64,
}

impl CatalogConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let backend = LlmBackend::from_env().map_err(|e| ConfigError::Invalid {
            var: "LLM_BACKEND",
            reason: e.to_string(),
        })?;
        let openai_api_key = optional("OPENAI_API_KEY");
        if backend == LlmBackend::OpenAi && openai_api_key.is_none() {
            return Err(ConfigError::Missing("OPENAI_API_KEY"));
        }

        Ok(Self {
            server: ServerConfig {
                port: parse_env("PORT", 8080)?,
            },
            database: DbConfig {
                url: required("DATABASE_URL")?,
                max_connections: parse_env("SATQL_DB_MAX_CONNECTIONS", 5)?,
                acquire_timeout_ms: parse_env("SATQL_DB_ACQUIRE_TIMEOUT_MS", 500)?,
            },
            llm: LlmConfig {
                backend,
                ollama_base_url: string_or("OLLAMA_BASE_URL", "http://localhost:11434"),
                ollama_model: string_or("OLLAMA_MODEL", "llama3.1:8b-instruct-q4_K_M"),
                openai_base_url: string_or(
                    "OPENAI_BASE_URL",
                    "https://api.openai.com/v1/chat/completions",
                ),
                openai_model: string_or("OPENAI_MODEL", "gpt-4o-mini"),
                openai_api_key,
                request_timeout: Duration::from_secs(parse_env("SATQL_LLM_TIMEOUT_SECS", 30)?),
            },
            pipeline: PipelineConfig {
                max_attempts: parse_env("SATQL_MAX_ATTEMPTS", 3)?,
                default_limit: parse_env("SATQL_DEFAULT_LIMIT", 100)?,
            },
            executor: ExecutorConfig {
                max_rows: parse_env("SATQL_MAX_ROWS", 500)?,
                statement_timeout_ms: parse_env("SATQL_STATEMENT_TIMEOUT_MS", 5000)?,
            },
            catalog: CatalogConfig {
                cache_ttl_secs: parse_env("SATQL_SCHEMA_CACHE_TTL_SECS", 300)?,
            },
        })
    }
}

fn required(var: &'static str) -> Result<String, ConfigError> {
    std::env::var(var).map_err(|_| ConfigError::Missing(var))
}

fn optional(var: &'static str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.is_empty())
}

fn string_or(var: &'static str, default: &str) -> String {
    std::env::var(var).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T>(var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    parse_with(var, std::env::var(var).ok(), default)
}

fn parse_with<T>(var: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        Some(raw) => raw.trim().parse().map_err(|e| ConfigError::Invalid {
            var,
            reason: format!("{e} (got {raw:?})"),
        }),
        None => Ok(default),
    }
}
