//! satql - natural-language questions over a satellite catalog, safely
//!
//! Turns questions like "which satellites launched last year are still in
//! orbit?" into SQL, refuses everything that is not a single read-only
//! SELECT over known tables, executes under row and time bounds, and drafts
//! a short answer from the result.
//!
//! All generation flows through one repair loop:
//! Question -> LLM candidate -> guard verdict -> bounded execution -> answer,
//! with guard rejections fed back into the next generation attempt.
//!
//! ## Quick Start
//!
//! ```rust
//! use satql::SelectGuard;
//!
//! let guard = SelectGuard::new(["satcat", "gp_history"]);
//! assert!(guard.validate("SELECT object_name FROM satcat LIMIT 5").is_ok());
//! assert!(guard.validate("DROP TABLE satcat").is_err());
//! ```

// Core error handling
pub mod error;

// Startup configuration
pub mod config;

// Schema introspection and the cached snapshot
pub mod catalog;

// Bounded read-only execution against Postgres
pub mod exec;

// LLM backends, SQL generation, and answer drafting
pub mod llm;

// The generate/validate/execute repair loop
pub mod pipeline;

// REST API routes
pub mod api;

// Public re-exports for the pipeline surface
pub use catalog::{ColumnInfo, SchemaCatalog, SchemaSnapshot};
pub use config::{AppConfig, ConfigError};
pub use error::{
    AttemptError, CatalogError, ExecError, GenerationError, GuardError, LlmError, PipelineError,
    PipelineResult, SummaryError,
};
pub use exec::{CellValue, ReadOnlyExecutor, TableData};
pub use llm::{ClientSet, LlmBackend, LlmClient, ResultSummarizer, SqlGenerator};
pub use pipeline::{
    AnswerDrafter, AttemptDisposition, AttemptRecord, GenerationRequest, GenerationResult,
    PipelineConfig, QueryGenerator, QueryPipeline, RunFailure, RunOutcome, SchemaSource,
    StatementExecutor,
};

// Guard re-exports, single canonical definition lives in satql-guard
pub use satql_guard::{SelectGuard, ValidatedSql};
