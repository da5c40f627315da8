//! Schema catalog: introspects the database and serves immutable snapshots.
//!
//! A snapshot is captured in a single `information_schema` query and shared
//! as one `Arc`, so a pipeline run always grounds on exactly one consistent
//! view of the schema. Snapshots are cached with a TTL; staleness within the
//! TTL is accepted, two snapshots are never merged.

use std::sync::Arc;
use std::time::{Duration, Instant};

use sqlx::{PgPool, Row};
use tokio::sync::RwLock;

use crate::error::CatalogError;

/// User tables and columns, excluding system schemas. Ordinal ordering keeps
/// the rendered grounding text stable between refreshes.
const INTROSPECTION_SQL: &str = r#"
SELECT c.table_name, c.column_name, c.data_type
FROM information_schema.columns c
JOIN information_schema.tables t
  ON c.table_schema = t.table_schema AND c.table_name = t.table_name
WHERE t.table_type = 'BASE TABLE'
  AND c.table_schema NOT IN ('pg_catalog', 'information_schema', 'pg_toast')
ORDER BY c.table_schema, c.table_name, c.ordinal_position
"#;

/// One column of one user table, in schema order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub table: String,
    pub column: String,
    pub data_type: String,
}

/// Immutable capture of the visible user tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaSnapshot {
    columns: Vec<ColumnInfo>,
}

impl SchemaSnapshot {
    pub fn from_columns(columns: Vec<ColumnInfo>) -> Self {
        Self { columns }
    }

    pub fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Distinct table names in first-appearance order. This is the allow
    /// list handed to the SQL guard.
    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for col in &self.columns {
            if names.last().map(String::as_str) != Some(col.table.as_str())
                && !names.contains(&col.table)
            {
                names.push(col.table.clone());
            }
        }
        names
    }

    /// Grounding text for generation, one line per column:
    /// `table_name(column_name data_type)`.
    pub fn to_ddl(&self) -> String {
        self.columns
            .iter()
            .map(|c| format!("{}({} {})", c.table, c.column, c.data_type))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

struct CachedSnapshot {
    snapshot: Arc<SchemaSnapshot>,
    captured_at: Instant,
}

impl CachedSnapshot {
    fn is_fresh(&self, ttl: Duration) -> bool {
        self.captured_at.elapsed() < ttl
    }
}

/// TTL-cached source of schema snapshots.
pub struct SchemaCatalog {
    pool: PgPool,
    ttl: Duration,
    cached: RwLock<Option<CachedSnapshot>>,
}

impl SchemaCatalog {
    pub fn new(pool: PgPool, ttl: Duration) -> Self {
        Self {
            pool,
            ttl,
            cached: RwLock::new(None),
        }
    }

    /// Current snapshot, refreshed from the database when the cached one has
    /// expired. Within the TTL every caller gets the same `Arc`.
    pub async fn snapshot(&self) -> Result<Arc<SchemaSnapshot>, CatalogError> {
        {
            let cached = self.cached.read().await;
            if let Some(entry) = cached.as_ref() {
                if entry.is_fresh(self.ttl) {
                    return Ok(Arc::clone(&entry.snapshot));
                }
            }
        }

        let mut cached = self.cached.write().await;
        // Another task may have refreshed while we waited for the lock.
        if let Some(entry) = cached.as_ref() {
            if entry.is_fresh(self.ttl) {
                return Ok(Arc::clone(&entry.snapshot));
            }
        }

        let snapshot = Arc::new(self.introspect().await?);
        *cached = Some(CachedSnapshot {
            snapshot: Arc::clone(&snapshot),
            captured_at: Instant::now(),
        });
        Ok(snapshot)
    }

    async fn introspect(&self) -> Result<SchemaSnapshot, CatalogError> {
        let rows = sqlx::query(INTROSPECTION_SQL)
            .fetch_all(&self.pool)
            .await?;

        let mut columns = Vec::with_capacity(rows.len());
        for row in &rows {
            columns.push(ColumnInfo {
                table: row.try_get("table_name")?,
                column: row.try_get("column_name")?,
                data_type: row.try_get("data_type")?,
            });
        }
        if columns.is_empty() {
            return Err(CatalogError::EmptySchema);
        }

        let snapshot = SchemaSnapshot::from_columns(columns);
        tracing::debug!(
            "schema snapshot refreshed: {} table(s), {} column(s)",
            snapshot.table_names().len(),
            snapshot.columns().len()
        );
        Ok(snapshot)
    }
}
