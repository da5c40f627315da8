//! Execution engine: runs validated statements read-only under bounds.
//!
//! The engine performs no safety judgement of its own; it expects statements
//! that already passed the guard. Its job is containment: a read-only
//! transaction, a server-side statement timeout scoped to that transaction,
//! a hard row cap applied while streaming, and a client-side deadline as the
//! backstop for a dead connection.

use std::time::Duration;

use chrono::{DateTime, NaiveTime, Utc};
use futures::TryStreamExt;
use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;
use sqlx::postgres::{PgColumn, PgRow};
use sqlx::{Column, PgPool, Row, TypeInfo};

use crate::error::ExecError;

/// The server-side statement timeout should fire first with a clean SQLSTATE;
/// the client deadline only catches a connection that stopped responding.
const CLIENT_DEADLINE_SLACK_MS: u64 = 1_000;

/// One result cell. Serializes untagged, so rows go over the wire as plain
/// JSON scalars; timestamps render as RFC 3339 strings.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CellValue {
    Null,
    Integer(i64),
    Float(f64),
    Text(String),
    Boolean(bool),
    Timestamp(DateTime<Utc>),
}

/// Materialized query result. Headers follow the column order of the first
/// row; an empty result has empty headers and no rows.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct TableData {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

impl TableData {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// Bounded read-only statement runner over a shared connection pool.
#[derive(Clone)]
pub struct ReadOnlyExecutor {
    pool: PgPool,
    max_rows: usize,
    statement_timeout_ms: u64,
}

impl ReadOnlyExecutor {
    pub fn new(pool: PgPool, max_rows: usize, statement_timeout_ms: u64) -> Self {
        Self {
            pool,
            max_rows,
            statement_timeout_ms,
        }
    }

    /// Run `sql` and materialize up to `max_rows` rows.
    ///
    /// Every exit path returns the connection to the pool before the caller
    /// continues; the transaction is rolled back on drop since a read-only
    /// transaction has nothing to commit.
    pub async fn execute(&self, sql: &str) -> Result<TableData, ExecError> {
        let deadline =
            Duration::from_millis(self.statement_timeout_ms + CLIENT_DEADLINE_SLACK_MS);
        match tokio::time::timeout(deadline, self.run(sql)).await {
            Ok(result) => result,
            Err(_) => Err(ExecError::Timeout(self.statement_timeout_ms)),
        }
    }

    async fn run(&self, sql: &str) -> Result<TableData, ExecError> {
        let classify = |e: sqlx::Error| classify_sqlx_error(e, self.statement_timeout_ms);

        tracing::debug!("executing validated sql: {}", sql);
        let mut tx = self.pool.begin().await.map_err(classify)?;

        // SET LOCAL scopes both settings to this transaction, so nothing
        // leaks onto the pooled connection.
        sqlx::query("SET TRANSACTION READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(classify)?;
        sqlx::query(&format!(
            "SET LOCAL statement_timeout = {}",
            self.statement_timeout_ms
        ))
        .execute(&mut *tx)
        .await
        .map_err(classify)?;

        let mut table = TableData::default();
        let mut stream = sqlx::query(sql).fetch(&mut *tx);
        while let Some(row) = stream.try_next().await.map_err(classify)? {
            if table.headers.is_empty() {
                table.headers = row
                    .columns()
                    .iter()
                    .map(|c| c.name().to_string())
                    .collect();
            }
            table.rows.push(decode_row(&row));
            // Hard cap, independent of whatever LIMIT the SQL carries.
            if table.rows.len() >= self.max_rows {
                break;
            }
        }
        drop(stream);

        tracing::debug!("execution returned {} row(s)", table.row_count());
        Ok(table)
    }
}

/// Map a sqlx failure onto the engine's error kinds. Pool acquisition
/// timeouts fail fast as resource exhaustion; SQLSTATE 57014 is the server
/// cancelling the statement at our own timeout.
fn classify_sqlx_error(err: sqlx::Error, timeout_ms: u64) -> ExecError {
    match err {
        sqlx::Error::PoolTimedOut => {
            ExecError::ResourceExhausted("connection pool timed out".to_string())
        }
        sqlx::Error::Database(db) if db.code().as_deref() == Some("57014") => {
            ExecError::Timeout(timeout_ms)
        }
        other => ExecError::Execution(other.to_string()),
    }
}

fn decode_row(row: &PgRow) -> Vec<CellValue> {
    row.columns()
        .iter()
        .map(|column| decode_cell(row, column))
        .collect()
}

/// Postgres type-name dispatch; anything unknown decodes as `Null` rather
/// than failing the whole row.
fn decode_cell(row: &PgRow, column: &PgColumn) -> CellValue {
    let idx = column.ordinal();
    let decoded: Option<CellValue> = match column.type_info().name() {
        "INT2" => row
            .try_get::<Option<i16>, _>(idx)
            .ok()
            .flatten()
            .map(|i| CellValue::Integer(i64::from(i))),
        "INT4" => row
            .try_get::<Option<i32>, _>(idx)
            .ok()
            .flatten()
            .map(|i| CellValue::Integer(i64::from(i))),
        "INT8" => row
            .try_get::<Option<i64>, _>(idx)
            .ok()
            .flatten()
            .map(CellValue::Integer),
        "FLOAT4" => row
            .try_get::<Option<f32>, _>(idx)
            .ok()
            .flatten()
            .map(|f| CellValue::Float(f64::from(f))),
        "FLOAT8" => row
            .try_get::<Option<f64>, _>(idx)
            .ok()
            .flatten()
            .map(CellValue::Float),
        "NUMERIC" => row
            .try_get::<Option<rust_decimal::Decimal>, _>(idx)
            .ok()
            .flatten()
            .map(|d| match d.to_f64() {
                Some(f) => CellValue::Float(f),
                None => CellValue::Text(d.to_string()),
            }),
        "TEXT" | "VARCHAR" | "CHAR" | "NAME" => row
            .try_get::<Option<String>, _>(idx)
            .ok()
            .flatten()
            .map(CellValue::Text),
        "BOOL" => row
            .try_get::<Option<bool>, _>(idx)
            .ok()
            .flatten()
            .map(CellValue::Boolean),
        "TIMESTAMPTZ" => row
            .try_get::<Option<DateTime<Utc>>, _>(idx)
            .ok()
            .flatten()
            .map(CellValue::Timestamp),
        "TIMESTAMP" => row
            .try_get::<Option<chrono::NaiveDateTime>, _>(idx)
            .ok()
            .flatten()
            .map(|dt| CellValue::Timestamp(dt.and_utc())),
        "DATE" => row
            .try_get::<Option<chrono::NaiveDate>, _>(idx)
            .ok()
            .flatten()
            .map(|d| CellValue::Timestamp(d.and_time(NaiveTime::MIN).and_utc())),
        "UUID" => row
            .try_get::<Option<uuid::Uuid>, _>(idx)
            .ok()
            .flatten()
            .map(|u| CellValue::Text(u.to_string())),
        "JSON" | "JSONB" => row
            .try_get::<Option<serde_json::Value>, _>(idx)
            .ok()
            .flatten()
            .map(|v| CellValue::Text(v.to_string())),
        _ => None,
    };
    decoded.unwrap_or(CellValue::Null)
}
