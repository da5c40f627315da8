//! SQL Generation Adapter
//!
//! Turns a question plus schema grounding into one candidate SQL string.
//! Everything produced here is untrusted input to the guard; this module
//! only shapes prompts and cleans up model output, it makes no safety
//! judgement.

use async_trait::async_trait;
use std::sync::Arc;

use super::{ClientSet, LlmClient};
use crate::error::GenerationError;
use crate::pipeline::{GenerationRequest, GenerationResult, QueryGenerator};

const SYSTEM_PROMPT: &str = "You are an expert data analyst producing a single, safe PostgreSQL SELECT query.\n\
- Only output a single SQL statement; no explanations.\n\
- Use existing columns; do not invent.\n\
- Prefer LIMIT 100 unless the question requests exact counts.";

/// Generation adapter over the configured client set.
pub struct SqlGenerator {
    clients: Arc<ClientSet>,
}

impl SqlGenerator {
    pub fn new(clients: Arc<ClientSet>) -> Self {
        Self { clients }
    }

    /// Pick the client for this request. A parseable hint selects its slot;
    /// anything else falls back to the default with a warning rather than
    /// failing the request.
    fn resolve_client(
        &self,
        hint: Option<&str>,
        warnings: &mut Vec<String>,
    ) -> Arc<dyn LlmClient> {
        let Some(hint) = hint else {
            return self.clients.default_client();
        };
        match hint.parse() {
            Ok(backend) => match self.clients.get(backend) {
                Some(client) => client,
                None => {
                    warnings.push(format!(
                        "backend '{}' is not configured, using {}",
                        backend,
                        self.clients.default_backend()
                    ));
                    self.clients.default_client()
                }
            },
            Err(_) => {
                warnings.push(format!(
                    "unknown backend '{}', using {}",
                    hint,
                    self.clients.default_backend()
                ));
                self.clients.default_client()
            }
        }
    }
}

#[async_trait]
impl QueryGenerator for SqlGenerator {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResult, GenerationError> {
        let mut warnings = Vec::new();
        let client = self.resolve_client(request.backend_hint.as_deref(), &mut warnings);
        tracing::debug!(
            "generating sql via {} backend ({})",
            client.backend_name(),
            client.model_name()
        );

        let user_prompt = build_user_prompt(request);
        let reply = client
            .chat(SYSTEM_PROMPT, &user_prompt)
            .await
            .map_err(GenerationError::Unavailable)?;

        let candidate_sql = clean_candidate(&reply);
        if candidate_sql.is_empty() {
            return Err(GenerationError::Malformed(
                "empty response after cleanup".to_string(),
            ));
        }

        Ok(GenerationResult {
            candidate_sql,
            warnings,
        })
    }
}

fn build_user_prompt(request: &GenerationRequest) -> String {
    let mut prompt = format!(
        "Question: {}\n\nSchema (may be partial):\n{}",
        request.question, request.schema_context
    );
    if let Some(prior_error) = &request.prior_error {
        prompt = format!(
            "{}\n\n[GUARDRAIL FEEDBACK - Please fix these issues]\n{}",
            prompt, prior_error
        );
    }
    prompt
}

/// Normalize raw model output into a bare statement: drop markdown fences,
/// stray backticks, and a leading `SQL:` label.
fn clean_candidate(raw: &str) -> String {
    let mut sql = strip_code_blocks(raw);
    sql = sql.trim().trim_matches('`').trim().to_string();
    if sql.to_ascii_lowercase().starts_with("sql") {
        if let Some((_, rest)) = sql.split_once(':') {
            sql = rest.trim().to_string();
        }
    }
    sql
}

fn strip_code_blocks(text: &str) -> String {
    let text = text.trim();
    if text.starts_with("```") {
        let lines: Vec<&str> = text.lines().collect();
        if lines.len() > 2 {
            // Skip first line (```...) and last line (```)
            return lines[1..lines.len() - 1].join("\n");
        }
    }
    text.to_string()
}
