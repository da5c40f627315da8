//! Result Summarizer Adapter
//!
//! Drafts a short natural-language answer from the executed result. The
//! pipeline treats this as best-effort: any failure here is logged and
//! replaced with a deterministic fallback, never surfaced to the caller.

use async_trait::async_trait;
use std::sync::Arc;

use super::{ClientSet, LlmBackend};
use crate::error::SummaryError;
use crate::exec::{CellValue, TableData};
use crate::pipeline::AnswerDrafter;

const SYSTEM_PROMPT: &str = "You are a data assistant. Given a natural language question, \
the SQL used, and the result rows (JSON), write a short, clear answer in one or two sentences.";

/// Keeps the drafting prompt bounded on wide results.
const MAX_ROWS_JSON_CHARS: usize = 4_000;

/// Answer-drafting adapter over the configured client set.
///
/// Always uses the default backend; per-request hints apply to generation
/// only.
pub struct ResultSummarizer {
    clients: Arc<ClientSet>,
}

impl ResultSummarizer {
    pub fn new(clients: Arc<ClientSet>) -> Self {
        Self { clients }
    }
}

#[async_trait]
impl AnswerDrafter for ResultSummarizer {
    async fn draft_answer(
        &self,
        question: &str,
        sql: &str,
        table: &TableData,
    ) -> Result<String, SummaryError> {
        // The mock backend answers from the data alone, no model call.
        if self.clients.default_backend() == LlmBackend::Mock {
            return Ok(mock_answer(table));
        }

        let user_prompt = format!(
            "Question: {}\nSQL: {}\nRows JSON: {}",
            question,
            sql,
            truncated_rows_json(table)
        );
        let client = self.clients.default_client();
        let text = client
            .chat(SYSTEM_PROMPT, &user_prompt)
            .await
            .map_err(SummaryError)?;
        Ok(text.trim().to_string())
    }
}

fn mock_answer(table: &TableData) -> String {
    let count = table.row_count();
    let Some(first) = table.rows.first() else {
        return "Found 0 rows.".to_string();
    };
    let sample = table
        .headers
        .iter()
        .zip(first)
        .map(|(header, cell)| format!("{}={}", header, render_cell(cell)))
        .collect::<Vec<_>>()
        .join(", ");
    format!("Found {} rows. Example: {}", count, sample)
}

fn render_cell(cell: &CellValue) -> String {
    match cell {
        CellValue::Null => "null".to_string(),
        CellValue::Integer(i) => i.to_string(),
        CellValue::Float(f) => f.to_string(),
        CellValue::Text(s) => s.clone(),
        CellValue::Boolean(b) => b.to_string(),
        CellValue::Timestamp(ts) => ts.to_rfc3339(),
    }
}

/// Result rows as an array of column-keyed objects, truncated for the
/// prompt.
fn truncated_rows_json(table: &TableData) -> String {
    let objects: Vec<serde_json::Value> = table
        .rows
        .iter()
        .map(|row| {
            let mut object = serde_json::Map::new();
            for (header, cell) in table.headers.iter().zip(row) {
                object.insert(
                    header.clone(),
                    serde_json::to_value(cell).unwrap_or(serde_json::Value::Null),
                );
            }
            serde_json::Value::Object(object)
        })
        .collect();
    let json = serde_json::to_string(&objects).unwrap_or_else(|_| "[]".to_string());
    if json.len() <= MAX_ROWS_JSON_CHARS {
        json
    } else {
        json.chars().take(MAX_ROWS_JSON_CHARS).collect()
    }
}
