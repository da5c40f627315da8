//! Repair loop: generate, validate, execute, with bounded retries.
//!
//! The loop owns the ordering guarantee that makes the system safe: no
//! candidate reaches the executor without passing the guard, and every
//! rejection or execution failure is fed back into the next generation
//! attempt as plain text. Attempts are a bounded `for` loop over one schema
//! snapshot; nothing is spawned, so cancelling the caller cancels the run.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use satql_guard::SelectGuard;

use crate::catalog::{SchemaCatalog, SchemaSnapshot};
use crate::error::{
    AttemptError, CatalogError, ExecError, GenerationError, PipelineError, SummaryError,
};
use crate::exec::{ReadOnlyExecutor, TableData};

/// Input to one generation attempt, rebuilt fresh per attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub question: String,
    /// Rendered schema grounding, one `table(column type)` line per column.
    pub schema_context: String,
    pub backend_hint: Option<String>,
    /// Feedback from the previous attempt's rejection or failure.
    pub prior_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationResult {
    pub candidate_sql: String,
    pub warnings: Vec<String>,
}

/// Produces candidate SQL. Implemented by the LLM adapter; scripted in
/// tests.
#[async_trait]
pub trait QueryGenerator: Send + Sync {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResult, GenerationError>;
}

/// Runs validated statements under resource bounds.
#[async_trait]
pub trait StatementExecutor: Send + Sync {
    async fn execute(&self, sql: &str) -> Result<TableData, ExecError>;
}

#[async_trait]
impl StatementExecutor for ReadOnlyExecutor {
    async fn execute(&self, sql: &str) -> Result<TableData, ExecError> {
        ReadOnlyExecutor::execute(self, sql).await
    }
}

/// Drafts the final answer; failures here never fail the run.
#[async_trait]
pub trait AnswerDrafter: Send + Sync {
    async fn draft_answer(
        &self,
        question: &str,
        sql: &str,
        table: &TableData,
    ) -> Result<String, SummaryError>;
}

/// Source of schema snapshots. The catalog implements it against Postgres;
/// tests serve a fixed snapshot.
#[async_trait]
pub trait SchemaSource: Send + Sync {
    async fn snapshot(&self) -> Result<Arc<SchemaSnapshot>, CatalogError>;
}

#[async_trait]
impl SchemaSource for SchemaCatalog {
    async fn snapshot(&self) -> Result<Arc<SchemaSnapshot>, CatalogError> {
        SchemaCatalog::snapshot(self).await
    }
}

/// How one failed attempt ended. Successful attempts are not recorded; the
/// success payload describes them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AttemptDisposition {
    /// The guard refused the candidate.
    Rejected { kind: String, detail: String },
    /// The database refused or failed the validated statement.
    ExecutionFailed { kind: String, detail: String },
}

/// Diagnostic record of one failed attempt, serialized into error payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttemptRecord {
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prior_error: Option<String>,
    pub candidate_sql: String,
    pub disposition: AttemptDisposition,
}

/// Successful run: the SQL that actually executed, its result, and the
/// drafted answer.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub sql: String,
    pub table: TableData,
    /// Advisory notes accumulated across every attempt of the run.
    pub warnings: Vec<String>,
    pub answer: String,
    /// Attempts consumed, counting the successful one.
    pub attempts: usize,
}

/// Failed run: the terminal error plus the per-attempt diagnostics.
#[derive(Debug)]
pub struct RunFailure {
    pub error: PipelineError,
    pub attempts: Vec<AttemptRecord>,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Retry budget; each retry is a full regeneration.
    pub max_attempts: usize,
    /// LIMIT injected into candidates that carry none.
    pub default_limit: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            default_limit: SelectGuard::DEFAULT_LIMIT,
        }
    }
}

/// The question-to-answer pipeline.
pub struct QueryPipeline {
    schema: Arc<dyn SchemaSource>,
    generator: Arc<dyn QueryGenerator>,
    executor: Arc<dyn StatementExecutor>,
    drafter: Arc<dyn AnswerDrafter>,
    config: PipelineConfig,
}

impl QueryPipeline {
    pub fn new(
        schema: Arc<dyn SchemaSource>,
        generator: Arc<dyn QueryGenerator>,
        executor: Arc<dyn StatementExecutor>,
        drafter: Arc<dyn AnswerDrafter>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            schema,
            generator,
            executor,
            drafter,
            config,
        }
    }

    /// Answer `question` within the attempt budget.
    ///
    /// One snapshot grounds the whole run: the generation context and the
    /// guard's allow list come from the same capture, so a concurrent schema
    /// refresh cannot split a run across two views.
    pub async fn run(
        &self,
        question: &str,
        backend_hint: Option<&str>,
    ) -> Result<RunOutcome, RunFailure> {
        let snapshot = match self.schema.snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::error!("schema snapshot unavailable: {}", e);
                return Err(RunFailure {
                    error: PipelineError::Catalog(e),
                    attempts: Vec::new(),
                });
            }
        };
        let guard = SelectGuard::new(snapshot.table_names())
            .with_default_limit(self.config.default_limit);
        let schema_context = snapshot.to_ddl();

        let mut attempts: Vec<AttemptRecord> = Vec::new();
        let mut warnings: Vec<String> = Vec::new();
        let mut prior_error: Option<String> = None;
        let mut last_failure: Option<AttemptError> = None;

        for index in 0..self.config.max_attempts {
            let request = GenerationRequest {
                question: question.to_string(),
                schema_context: schema_context.clone(),
                backend_hint: backend_hint.map(str::to_string),
                prior_error: prior_error.take(),
            };

            let generated = match self.generator.generate(&request).await {
                Ok(generated) => generated,
                Err(e) => {
                    // No candidate to repair; retrying the same outage only
                    // burns the budget.
                    tracing::error!("generation failed (attempt {}): {}", index + 1, e);
                    return Err(RunFailure {
                        error: PipelineError::Generation(e),
                        attempts,
                    });
                }
            };
            warnings.extend(generated.warnings);
            tracing::debug!(
                "candidate sql (attempt {}): {}",
                index + 1,
                generated.candidate_sql
            );

            let validated = match guard.validate(&generated.candidate_sql) {
                Ok(validated) => validated,
                Err(rejection) => {
                    tracing::warn!(
                        "guard rejected candidate (attempt {}): {}",
                        index + 1,
                        rejection
                    );
                    attempts.push(AttemptRecord {
                        index,
                        prior_error: request.prior_error.clone(),
                        candidate_sql: generated.candidate_sql,
                        disposition: AttemptDisposition::Rejected {
                            kind: rejection.kind().to_string(),
                            detail: rejection.to_string(),
                        },
                    });
                    prior_error = Some(format!("{}: {}", rejection.kind(), rejection));
                    last_failure = Some(AttemptError::Rejected(rejection));
                    continue;
                }
            };

            if validated.limit_injected {
                warnings.push(format!(
                    "no LIMIT clause; default LIMIT {} applied",
                    self.config.default_limit
                ));
            }

            match self.executor.execute(&validated.sql).await {
                Ok(table) => {
                    let answer = match self
                        .drafter
                        .draft_answer(question, &validated.sql, &table)
                        .await
                    {
                        Ok(answer) => answer,
                        Err(e) => {
                            tracing::warn!("answer drafting failed, using fallback: {}", e);
                            format!("Query returned {} row(s).", table.row_count())
                        }
                    };
                    tracing::info!(
                        "answered on attempt {} with {} row(s)",
                        index + 1,
                        table.row_count()
                    );
                    return Ok(RunOutcome {
                        sql: validated.sql,
                        table,
                        warnings,
                        answer,
                        attempts: index + 1,
                    });
                }
                Err(exec_err) => {
                    tracing::warn!("execution failed (attempt {}): {}", index + 1, exec_err);
                    attempts.push(AttemptRecord {
                        index,
                        prior_error: request.prior_error.clone(),
                        candidate_sql: generated.candidate_sql,
                        disposition: AttemptDisposition::ExecutionFailed {
                            kind: exec_err.kind().to_string(),
                            detail: exec_err.to_string(),
                        },
                    });
                    prior_error = Some(format!("{}: {}", exec_err.kind(), exec_err));
                    last_failure = Some(AttemptError::Execution(exec_err));
                }
            }
        }

        let last = last_failure.unwrap_or_else(|| {
            AttemptError::Execution(ExecError::ResourceExhausted(
                "attempt budget is zero".to_string(),
            ))
        });
        tracing::warn!(
            "attempt budget exhausted after {} attempt(s): {}",
            attempts.len(),
            last
        );
        Err(RunFailure {
            error: PipelineError::Exhausted {
                attempts: attempts.len(),
                last,
            },
            attempts,
        })
    }
}
