//! Error types for the question-to-answer pipeline.
//!
//! Each concern carries its own `thiserror` enum; they converge into
//! [`PipelineError`] at the pipeline boundary. Every error exposes a stable
//! snake_case `kind()` used on the wire and in retry feedback, and the
//! top-level error maps to an HTTP status for the API layer.

use thiserror::Error;

// Re-export the guard's rejection type; the canonical definition lives there.
pub use satql_guard::GuardError;

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Transport-level failure talking to an LLM backend.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("backend request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("backend returned status {status}: {body}")]
    Api { status: u16, body: String },

    #[error("backend response had no message content")]
    MissingContent,
}

/// The schema catalog could not produce a snapshot.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("schema introspection failed: {0}")]
    Introspection(#[from] sqlx::Error),

    #[error("schema snapshot is empty: no user tables visible")]
    EmptySchema,
}

impl CatalogError {
    pub fn kind(&self) -> &'static str {
        "catalog_unavailable"
    }
}

/// SQL generation did not yield a candidate.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("query generation failed: {0}")]
    Unavailable(#[from] LlmError),

    #[error("generator response had no usable SQL: {0}")]
    Malformed(String),
}

impl GenerationError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unavailable(_) => "generation_unavailable",
            Self::Malformed(_) => "generation_malformed",
        }
    }
}

/// Execution of a validated statement failed.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("statement timed out after {0} ms")]
    Timeout(u64),

    #[error("no database connection available: {0}")]
    ResourceExhausted(String),

    #[error("execution failed: {0}")]
    Execution(String),
}

impl ExecError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "timeout",
            Self::ResourceExhausted(_) => "resource_exhausted",
            Self::Execution(_) => "execution_error",
        }
    }
}

/// Answer drafting failed. The pipeline fails open on this, so it is logged
/// and replaced by the deterministic fallback, never surfaced to the caller.
#[derive(Debug, Error)]
#[error("answer drafting failed: {0}")]
pub struct SummaryError(#[from] pub LlmError);

/// A failure that consumed one attempt inside the repair loop: either the
/// guard rejected the candidate or the database refused to run it.
#[derive(Debug, Error)]
pub enum AttemptError {
    #[error(transparent)]
    Rejected(#[from] GuardError),

    #[error(transparent)]
    Execution(#[from] ExecError),
}

impl AttemptError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Rejected(e) => e.kind(),
            Self::Execution(e) => e.kind(),
        }
    }
}

/// Terminal pipeline failure.
///
/// Guard rejections and execution errors never appear here directly; they are
/// retried and only surface inside [`PipelineError::Exhausted`] once the
/// attempt budget is spent.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("schema catalog unavailable: {0}")]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error("no safe result after {attempts} attempt(s), last failure: {last}")]
    Exhausted { attempts: usize, last: AttemptError },
}

impl PipelineError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Catalog(_) => "catalog_unavailable",
            Self::Generation(e) => e.kind(),
            Self::Exhausted { .. } => "exhausted",
        }
    }

    /// HTTP status for the API layer. An exhausted run takes its status from
    /// whatever failed the final attempt: a guard rejection means the
    /// question is unanswerable as asked (422), while repeated timeouts or a
    /// saturated pool are the server's fault.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Catalog(_) => 503,
            Self::Generation(_) => 502,
            Self::Exhausted { last, .. } => match last {
                AttemptError::Rejected(_) => 422,
                AttemptError::Execution(ExecError::Timeout(_)) => 504,
                AttemptError::Execution(ExecError::ResourceExhausted(_)) => 503,
                AttemptError::Execution(ExecError::Execution(_)) => 500,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── kind: stable wire identifiers ─────────────────────────────

    #[test]
    fn kind_catalog_unavailable() {
        assert_eq!(CatalogError::EmptySchema.kind(), "catalog_unavailable");
    }

    #[test]
    fn kind_generation_unavailable() {
        let e = GenerationError::Unavailable(LlmError::MissingContent);
        assert_eq!(e.kind(), "generation_unavailable");
    }

    #[test]
    fn kind_generation_malformed() {
        let e = GenerationError::Malformed("empty".into());
        assert_eq!(e.kind(), "generation_malformed");
    }

    #[test]
    fn kind_exec_variants() {
        assert_eq!(ExecError::Timeout(5000).kind(), "timeout");
        assert_eq!(
            ExecError::ResourceExhausted("pool".into()).kind(),
            "resource_exhausted"
        );
        assert_eq!(ExecError::Execution("boom".into()).kind(), "execution_error");
    }

    #[test]
    fn kind_attempt_delegates() {
        let rejected = AttemptError::Rejected(GuardError::MultiStatement(2));
        assert_eq!(rejected.kind(), "multi_statement");
        let execution = AttemptError::Execution(ExecError::Timeout(100));
        assert_eq!(execution.kind(), "timeout");
    }

    #[test]
    fn kind_pipeline_variants() {
        let catalog = PipelineError::Catalog(CatalogError::EmptySchema);
        assert_eq!(catalog.kind(), "catalog_unavailable");

        let generation =
            PipelineError::Generation(GenerationError::Malformed("x".into()));
        assert_eq!(generation.kind(), "generation_malformed");

        let exhausted = PipelineError::Exhausted {
            attempts: 3,
            last: AttemptError::Rejected(GuardError::UnknownTable("users".into())),
        };
        assert_eq!(exhausted.kind(), "exhausted");
    }

    // ── http_status: exhaustive variant coverage ──────────────────

    #[test]
    fn http_status_catalog() {
        let e = PipelineError::Catalog(CatalogError::EmptySchema);
        assert_eq!(e.http_status(), 503);
    }

    #[test]
    fn http_status_generation() {
        let unavailable =
            PipelineError::Generation(GenerationError::Unavailable(LlmError::MissingContent));
        assert_eq!(unavailable.http_status(), 502);

        let malformed =
            PipelineError::Generation(GenerationError::Malformed("no sql".into()));
        assert_eq!(malformed.http_status(), 502);
    }

    #[test]
    fn http_status_exhausted_on_rejection() {
        let e = PipelineError::Exhausted {
            attempts: 3,
            last: AttemptError::Rejected(GuardError::NotReadOnly("DELETE".into())),
        };
        assert_eq!(e.http_status(), 422);
    }

    #[test]
    fn http_status_exhausted_on_timeout() {
        let e = PipelineError::Exhausted {
            attempts: 3,
            last: AttemptError::Execution(ExecError::Timeout(5000)),
        };
        assert_eq!(e.http_status(), 504);
    }

    #[test]
    fn http_status_exhausted_on_pool() {
        let e = PipelineError::Exhausted {
            attempts: 3,
            last: AttemptError::Execution(ExecError::ResourceExhausted("pool timed out".into())),
        };
        assert_eq!(e.http_status(), 503);
    }

    #[test]
    fn http_status_exhausted_on_execution() {
        let e = PipelineError::Exhausted {
            attempts: 3,
            last: AttemptError::Execution(ExecError::Execution("column does not exist".into())),
        };
        assert_eq!(e.http_status(), 500);
    }

    // ── Display ───────────────────────────────────────────────────

    #[test]
    fn display_exhausted_names_last_failure() {
        let e = PipelineError::Exhausted {
            attempts: 3,
            last: AttemptError::Rejected(GuardError::MultiStatement(2)),
        };
        assert_eq!(
            e.to_string(),
            "no safe result after 3 attempt(s), last failure: expected exactly one statement, found 2"
        );
    }

    #[test]
    fn display_generation_is_transparent() {
        let e = PipelineError::Generation(GenerationError::Malformed("empty response".into()));
        assert_eq!(
            e.to_string(),
            "generator response had no usable SQL: empty response"
        );
    }

    #[test]
    fn display_summary_wraps_llm() {
        let e = SummaryError(LlmError::MissingContent);
        assert_eq!(
            e.to_string(),
            "answer drafting failed: backend response had no message content"
        );
    }

    #[test]
    fn display_llm_api() {
        let e = LlmError::Api {
            status: 429,
            body: "rate limited".into(),
        };
        assert_eq!(e.to_string(), "backend returned status 429: rate limited");
    }
}
