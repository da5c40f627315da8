//! REST API routes for the question-to-answer pipeline
//!
//! Endpoints:
//! - POST /api/run    - Answer a natural-language question over the catalog
//! - GET  /api/schema - Current schema snapshot
//! - GET  /health     - Service health and configured backend

use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::catalog::{SchemaCatalog, SchemaSnapshot};
use crate::exec::CellValue;
use crate::llm::ClientSet;
use crate::pipeline::{AttemptRecord, QueryPipeline};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct RunRequest {
    pub question: String,
    /// Per-request backend override; the configured default when absent.
    pub backend: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RunResponse {
    pub sql: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
    pub warnings: Vec<String>,
    pub answer: String,
    pub attempts: usize,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub detail: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attempts: Vec<AttemptRecord>,
}

#[derive(Debug, Serialize)]
pub struct SchemaResponse {
    pub tables: Vec<TableSchema>,
}

#[derive(Debug, Serialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnSchema>,
}

#[derive(Debug, Serialize)]
pub struct ColumnSchema {
    pub name: String,
    pub data_type: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub backend: String,
    pub model: String,
}

// ============================================================================
// State
// ============================================================================

#[derive(Clone)]
pub struct ApiState {
    pub pipeline: Arc<QueryPipeline>,
    pub catalog: Arc<SchemaCatalog>,
    pub clients: Arc<ClientSet>,
}

impl ApiState {
    pub fn new(
        pipeline: Arc<QueryPipeline>,
        catalog: Arc<SchemaCatalog>,
        clients: Arc<ClientSet>,
    ) -> Self {
        Self {
            pipeline,
            catalog,
            clients,
        }
    }
}

// ============================================================================
// Router
// ============================================================================

pub fn create_api_router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/run", post(run_question))
        .route("/api/schema", get(get_schema))
        .route("/health", get(health_check))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/run - Answer a question over the catalog
async fn run_question(
    State(state): State<ApiState>,
    Json(req): Json<RunRequest>,
) -> Result<Json<RunResponse>, (StatusCode, Json<ErrorResponse>)> {
    tracing::info!("run request: {}", req.question);

    match state
        .pipeline
        .run(&req.question, req.backend.as_deref())
        .await
    {
        Ok(outcome) => Ok(Json(RunResponse {
            sql: outcome.sql,
            headers: outcome.table.headers,
            rows: outcome.table.rows,
            warnings: outcome.warnings,
            answer: outcome.answer,
            attempts: outcome.attempts,
        })),
        Err(failure) => {
            let status = error_status(failure.error.http_status());
            Err((
                status,
                Json(ErrorResponse {
                    error: failure.error.kind().to_string(),
                    detail: failure.error.to_string(),
                    attempts: failure.attempts,
                }),
            ))
        }
    }
}

/// GET /api/schema - Current schema snapshot
async fn get_schema(
    State(state): State<ApiState>,
) -> Result<Json<SchemaResponse>, (StatusCode, Json<ErrorResponse>)> {
    match state.catalog.snapshot().await {
        Ok(snapshot) => Ok(Json(SchemaResponse {
            tables: group_by_table(&snapshot),
        })),
        Err(e) => Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse {
                error: e.kind().to_string(),
                detail: e.to_string(),
                attempts: Vec::new(),
            }),
        )),
    }
}

/// GET /health - Health check and configured backend
async fn health_check(State(state): State<ApiState>) -> Json<HealthResponse> {
    let client = state.clients.default_client();
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        backend: client.backend_name().to_string(),
        model: client.model_name().to_string(),
    })
}

// ============================================================================
// Helpers
// ============================================================================

fn error_status(code: u16) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

fn group_by_table(snapshot: &SchemaSnapshot) -> Vec<TableSchema> {
    let mut tables: Vec<TableSchema> = Vec::new();
    for col in snapshot.columns() {
        let column = ColumnSchema {
            name: col.column.clone(),
            data_type: col.data_type.clone(),
        };
        match tables.iter_mut().find(|t| t.name == col.table) {
            Some(table) => table.columns.push(column),
            None => tables.push(TableSchema {
                name: col.table.clone(),
                columns: vec![column],
            }),
        }
    }
    tables
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ColumnInfo;
    use crate::pipeline::AttemptDisposition;

    fn snapshot() -> SchemaSnapshot {
        let col = |table: &str, column: &str, data_type: &str| ColumnInfo {
            table: table.to_string(),
            column: column.to_string(),
            data_type: data_type.to_string(),
        };
        SchemaSnapshot::from_columns(vec![
            col("satcat", "norad_cat_id", "integer"),
            col("satcat", "object_name", "text"),
            col("gp_history", "epoch", "timestamp with time zone"),
            col("satcat", "launch_date", "date"),
        ])
    }

    #[test]
    fn groups_columns_by_table() {
        let tables = group_by_table(&snapshot());
        assert_eq!(tables.len(), 2);
        assert_eq!(tables[0].name, "satcat");
        assert_eq!(tables[0].columns.len(), 3);
        assert_eq!(tables[0].columns[2].name, "launch_date");
        assert_eq!(tables[1].name, "gp_history");
        assert_eq!(tables[1].columns[0].data_type, "timestamp with time zone");
    }

    #[test]
    fn run_request_backend_is_optional() {
        let req: RunRequest =
            serde_json::from_str(r#"{"question": "how many satellites?"}"#).unwrap();
        assert_eq!(req.question, "how many satellites?");
        assert!(req.backend.is_none());

        let req: RunRequest =
            serde_json::from_str(r#"{"question": "q", "backend": "ollama"}"#).unwrap();
        assert_eq!(req.backend.as_deref(), Some("ollama"));
    }

    #[test]
    fn run_response_serializes_cells_untagged() {
        let resp = RunResponse {
            sql: "SELECT object_name FROM satcat LIMIT 1".to_string(),
            headers: vec!["object_name".to_string(), "apogee_km".to_string()],
            rows: vec![vec![
                CellValue::Text("ISS (ZARYA)".to_string()),
                CellValue::Integer(420),
            ]],
            warnings: vec![],
            answer: "One row.".to_string(),
            attempts: 1,
        };
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["rows"][0][0], "ISS (ZARYA)");
        assert_eq!(json["rows"][0][1], 420);
        assert_eq!(json["attempts"], 1);
    }

    #[test]
    fn error_response_omits_empty_attempts() {
        let body = ErrorResponse {
            error: "catalog_unavailable".to_string(),
            detail: "schema introspection returned no columns".to_string(),
            attempts: Vec::new(),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("attempts").is_none());

        let body = ErrorResponse {
            error: "exhausted".to_string(),
            detail: "no safe result after 3 attempt(s)".to_string(),
            attempts: vec![AttemptRecord {
                index: 0,
                prior_error: None,
                candidate_sql: "DELETE FROM satcat".to_string(),
                disposition: AttemptDisposition::Rejected {
                    kind: "not_read_only".to_string(),
                    detail: "only read-only SELECT queries are allowed, found DELETE".to_string(),
                },
            }],
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["attempts"][0]["candidate_sql"], "DELETE FROM satcat");
    }

    #[test]
    fn error_status_maps_known_codes() {
        assert_eq!(error_status(422), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(error_status(504), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(error_status(0), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
