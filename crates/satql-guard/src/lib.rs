//! Read-only SELECT guard for generated SQL.
//!
//! Every candidate statement the generator produces is untrusted input, no
//! matter what the prompt said. This crate is the trust boundary that decides
//! whether a candidate may reach the database: it parses the candidate with a
//! real SQL grammar, rejects anything that is not a single read-only query
//! against allow-listed tables, and injects a default row limit when the
//! candidate has none.
//!
//! The policy is deliberately conservative. A statement that mutates state
//! must never be accepted, even when that means rejecting the occasional safe
//! query. Verdicts are deterministic: the same candidate against the same
//! guard always yields the same result.
//!
//! Kept free of database and HTTP dependencies so the same checks can run in
//! more than one process when a deployment wants redundant validation.

use std::collections::BTreeSet;
use std::ops::ControlFlow;

use sqlparser::ast::{
    Expr, ObjectName, Query, SetExpr, Statement, Value, Visit, Visitor,
};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use thiserror::Error;

/// Why a candidate was rejected.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GuardError {
    #[error("could not parse SQL: {0}")]
    Unparseable(String),

    #[error("expected exactly one statement, found {0}")]
    MultiStatement(usize),

    #[error("only read-only SELECT queries are allowed, found {0}")]
    NotReadOnly(String),

    #[error("table '{0}' is not in the allowed schema")]
    UnknownTable(String),
}

impl GuardError {
    /// Stable identifier, used in error payloads and in the feedback given
    /// back to the generator on retry.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unparseable(_) => "unparseable",
            Self::MultiStatement(_) => "multi_statement",
            Self::NotReadOnly(_) => "not_read_only",
            Self::UnknownTable(_) => "unknown_table",
        }
    }
}

/// A candidate that passed every check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedSql {
    /// The statement to execute: the candidate text itself, or the candidate
    /// re-rendered with the default limit when it carried none.
    pub sql: String,
    /// True when the default limit was injected.
    pub limit_injected: bool,
}

/// Validation policy: the table allow list plus the default row limit.
#[derive(Debug, Clone)]
pub struct SelectGuard {
    allowed: BTreeSet<String>,
    default_limit: u64,
}

impl SelectGuard {
    pub const DEFAULT_LIMIT: u64 = 100;

    /// Build a guard from table names. Matching is case-insensitive; names
    /// may be bare (`satcat`) or schema-qualified (`orbital.gp_history`).
    pub fn new<I, S>(allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            allowed: allowed
                .into_iter()
                .map(|t| t.as_ref().to_ascii_lowercase())
                .collect(),
            default_limit: Self::DEFAULT_LIMIT,
        }
    }

    pub fn with_default_limit(mut self, limit: u64) -> Self {
        self.default_limit = limit;
        self
    }

    pub fn default_limit(&self) -> u64 {
        self.default_limit
    }

    /// Tables this guard accepts, lowercased and sorted.
    pub fn allowed_tables(&self) -> impl Iterator<Item = &str> {
        self.allowed.iter().map(String::as_str)
    }

    /// Decide whether `candidate` may be executed.
    ///
    /// Checks, in order: the candidate parses, it is exactly one statement,
    /// that statement is a plain query with no mutation anywhere in its tree,
    /// and every referenced table is on the allow list (CTE aliases are in
    /// scope and do not count as table references). A passing candidate with
    /// no `LIMIT`/`FETCH` gets the default limit injected; one that already
    /// has a limit passes through byte-identical.
    pub fn validate(&self, candidate: &str) -> Result<ValidatedSql, GuardError> {
        let dialect = PostgreSqlDialect {};
        let mut statements = Parser::parse_sql(&dialect, candidate)
            .map_err(|e| GuardError::Unparseable(e.to_string()))?;

        if statements.is_empty() {
            return Err(GuardError::Unparseable("empty statement".to_string()));
        }
        if statements.len() > 1 {
            return Err(GuardError::MultiStatement(statements.len()));
        }

        let query = match statements.remove(0) {
            Statement::Query(query) => query,
            other => {
                return Err(GuardError::NotReadOnly(statement_verb(&other).to_string()));
            }
        };

        let mut walker = ReadOnlyWalker {
            allowed: &self.allowed,
            ctes: BTreeSet::new(),
        };
        if let ControlFlow::Break(err) = query.visit(&mut walker) {
            return Err(err);
        }

        if query.limit.is_some() || query.fetch.is_some() {
            return Ok(ValidatedSql {
                sql: candidate.to_string(),
                limit_injected: false,
            });
        }

        let mut query = query;
        query.limit = Some(Expr::Value(Value::Number(
            self.default_limit.to_string(),
            false,
        )));
        Ok(ValidatedSql {
            sql: Statement::Query(query).to_string(),
            limit_injected: true,
        })
    }
}

/// AST walk over every query, nested statement, and table reference.
///
/// Uses sqlparser's derived visitor so every nesting position (subqueries,
/// CTE bodies, set operations, expressions) is covered mechanically; a
/// hand-rolled recursion would have to enumerate each expression shape that
/// can carry a subquery and silently miss new ones.
struct ReadOnlyWalker<'a> {
    allowed: &'a BTreeSet<String>,
    /// CTE aliases seen so far; referencing one is not a table reference.
    /// Collected flat rather than scoped: an out-of-scope alias reference
    /// fails at execution, which is the safe direction.
    ctes: BTreeSet<String>,
}

impl Visitor for ReadOnlyWalker<'_> {
    type Break = GuardError;

    fn pre_visit_query(&mut self, query: &Query) -> ControlFlow<GuardError> {
        if let Some(with) = &query.with {
            for cte in &with.cte_tables {
                self.ctes.insert(cte.alias.name.value.to_ascii_lowercase());
            }
        }
        if !query.locks.is_empty() {
            return ControlFlow::Break(GuardError::NotReadOnly(
                "a locking clause (FOR UPDATE / FOR SHARE)".to_string(),
            ));
        }
        match query.body.as_ref() {
            SetExpr::Select(select) => {
                if select.into.is_some() {
                    return ControlFlow::Break(GuardError::NotReadOnly(
                        "SELECT INTO".to_string(),
                    ));
                }
            }
            SetExpr::Insert(_) => {
                return ControlFlow::Break(GuardError::NotReadOnly("INSERT".to_string()));
            }
            SetExpr::Update(_) => {
                return ControlFlow::Break(GuardError::NotReadOnly("UPDATE".to_string()));
            }
            // `TABLE t` shorthand names its table in plain strings, so the
            // relation visit below never sees it. Check it here.
            SetExpr::Table(table) => {
                let mut parts: Vec<String> = Vec::new();
                if let Some(schema) = &table.schema_name {
                    parts.push(schema.to_ascii_lowercase());
                }
                if let Some(name) = &table.table_name {
                    parts.push(name.to_ascii_lowercase());
                }
                let key = normalize_table_key(parts);
                if !self.allowed.contains(&key) && !self.ctes.contains(&key) {
                    return ControlFlow::Break(GuardError::UnknownTable(key));
                }
            }
            SetExpr::Query(_) | SetExpr::SetOperation { .. } | SetExpr::Values(_) => {}
        }
        ControlFlow::Continue(())
    }

    fn pre_visit_statement(&mut self, statement: &Statement) -> ControlFlow<GuardError> {
        if !matches!(statement, Statement::Query(_)) {
            return ControlFlow::Break(GuardError::NotReadOnly(
                statement_verb(statement).to_string(),
            ));
        }
        ControlFlow::Continue(())
    }

    fn pre_visit_relation(&mut self, relation: &ObjectName) -> ControlFlow<GuardError> {
        let key = relation_key(relation);
        if self.ctes.contains(&key) || self.allowed.contains(&key) {
            return ControlFlow::Continue(());
        }
        ControlFlow::Break(GuardError::UnknownTable(key))
    }
}

/// Lowercased lookup key for a table reference. A `public.` qualifier is
/// stripped; any other qualifier must match the allow list verbatim.
fn relation_key(name: &ObjectName) -> String {
    normalize_table_key(
        name.0
            .iter()
            .map(|ident| ident.value.to_ascii_lowercase())
            .collect(),
    )
}

fn normalize_table_key(parts: Vec<String>) -> String {
    match parts.as_slice() {
        [schema, table] if schema == "public" => table.clone(),
        _ => parts.join("."),
    }
}

/// Human-readable verb for the rejection detail.
fn statement_verb(statement: &Statement) -> &'static str {
    match statement {
        Statement::Insert { .. } => "INSERT",
        Statement::Update { .. } => "UPDATE",
        Statement::Delete { .. } => "DELETE",
        Statement::Drop { .. } => "DROP",
        Statement::Truncate { .. } => "TRUNCATE",
        Statement::AlterTable { .. } => "ALTER TABLE",
        Statement::CreateTable { .. } => "CREATE TABLE",
        Statement::CreateView { .. } => "CREATE VIEW",
        Statement::CreateIndex { .. } => "CREATE INDEX",
        Statement::CreateSchema { .. } => "CREATE SCHEMA",
        Statement::CreateDatabase { .. } => "CREATE DATABASE",
        Statement::Copy { .. } => "COPY",
        Statement::Grant { .. } => "GRANT",
        Statement::Revoke { .. } => "REVOKE",
        Statement::StartTransaction { .. } => "BEGIN",
        Statement::Commit { .. } => "COMMIT",
        Statement::Rollback { .. } => "ROLLBACK",
        Statement::SetVariable { .. } => "SET",
        Statement::Execute { .. } => "EXECUTE",
        Statement::Prepare { .. } => "PREPARE",
        Statement::Explain { .. } => "EXPLAIN",
        Statement::Analyze { .. } => "ANALYZE",
        Statement::Merge { .. } => "MERGE",
        Statement::Call { .. } => "CALL",
        _ => "a non-SELECT statement",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard() -> SelectGuard {
        SelectGuard::new(["satcat", "gp_history"])
    }

    // ── acceptance ───────────────────────────────────────────────

    #[test]
    fn accepts_simple_select_unchanged() {
        let sql = "SELECT object_name FROM satcat LIMIT 5";
        let out = guard().validate(sql).unwrap();
        assert_eq!(out.sql, sql);
        assert!(!out.limit_injected);
    }

    #[test]
    fn accepts_order_by_with_limit() {
        let sql = "SELECT * FROM satcat ORDER BY launch_date DESC LIMIT 5";
        let out = guard().validate(sql).unwrap();
        assert_eq!(out.sql, sql);
        assert!(!out.limit_injected);
    }

    #[test]
    fn accepts_join_between_allowed_tables() {
        let sql = "SELECT s.object_name, g.epoch \
                   FROM satcat s JOIN gp_history g ON g.norad_cat_id = s.norad_cat_id \
                   LIMIT 10";
        assert!(guard().validate(sql).is_ok());
    }

    #[test]
    fn accepts_cte_alias_as_relation() {
        let sql = "WITH recent AS (SELECT * FROM satcat ORDER BY launch_date DESC LIMIT 20) \
                   SELECT object_name FROM recent LIMIT 5";
        assert!(guard().validate(sql).is_ok());
    }

    #[test]
    fn accepts_subquery_over_allowed_table() {
        let sql = "SELECT object_name FROM satcat \
                   WHERE norad_cat_id IN (SELECT norad_cat_id FROM gp_history) LIMIT 10";
        assert!(guard().validate(sql).is_ok());
    }

    #[test]
    fn accepts_union_of_allowed_tables() {
        let sql = "SELECT norad_cat_id FROM satcat UNION SELECT norad_cat_id FROM gp_history LIMIT 10";
        assert!(guard().validate(sql).is_ok());
    }

    #[test]
    fn accepts_public_schema_qualifier() {
        let sql = "SELECT object_name FROM public.satcat LIMIT 1";
        assert!(guard().validate(sql).is_ok());
    }

    #[test]
    fn table_matching_is_case_insensitive() {
        let sql = "SELECT Object_Name FROM SatCat LIMIT 1";
        assert!(guard().validate(sql).is_ok());
        let upper = SelectGuard::new(["SATCAT"]);
        assert!(upper.validate("SELECT object_name FROM satcat LIMIT 1").is_ok());
    }

    #[test]
    fn trailing_semicolon_is_still_one_statement() {
        let sql = "SELECT object_name FROM satcat LIMIT 1;";
        let out = guard().validate(sql).unwrap();
        assert_eq!(out.sql, sql);
    }

    // ── default limit injection ──────────────────────────────────

    #[test]
    fn injects_default_limit_when_absent() {
        let out = guard().validate("SELECT object_name FROM satcat").unwrap();
        assert!(out.limit_injected);
        assert!(out.sql.contains("LIMIT 100"), "got: {}", out.sql);
        assert!(out.sql.to_lowercase().contains("satcat"));
    }

    #[test]
    fn injects_configured_limit() {
        let g = guard().with_default_limit(25);
        let out = g.validate("SELECT object_name FROM satcat").unwrap();
        assert!(out.limit_injected);
        assert!(out.sql.contains("LIMIT 25"), "got: {}", out.sql);
    }

    #[test]
    fn injects_limit_on_union_without_one() {
        let sql = "SELECT norad_cat_id FROM satcat UNION ALL SELECT norad_cat_id FROM gp_history";
        let out = guard().validate(sql).unwrap();
        assert!(out.limit_injected);
        assert!(out.sql.contains("LIMIT 100"), "got: {}", out.sql);
    }

    #[test]
    fn leaves_fetch_first_untouched() {
        let sql = "SELECT object_name FROM satcat FETCH FIRST 10 ROWS ONLY";
        let out = guard().validate(sql).unwrap();
        assert_eq!(out.sql, sql);
        assert!(!out.limit_injected);
    }

    #[test]
    fn keeps_lowercase_candidate_byte_identical_when_limited() {
        let sql = "select object_name from satcat limit 7";
        let out = guard().validate(sql).unwrap();
        assert_eq!(out.sql, sql);
    }

    // ── statement-chaining and non-SELECT rejection ──────────────

    #[test]
    fn rejects_appended_second_statement() {
        let err = guard()
            .validate("SELECT * FROM satcat; DROP TABLE satcat;")
            .unwrap_err();
        assert_eq!(err, GuardError::MultiStatement(2));
        assert_eq!(err.kind(), "multi_statement");
    }

    #[test]
    fn rejects_two_selects() {
        let err = guard()
            .validate("SELECT 1; SELECT 2")
            .unwrap_err();
        assert!(matches!(err, GuardError::MultiStatement(2)));
    }

    #[test]
    fn rejects_delete() {
        let err = guard()
            .validate("DELETE FROM satcat WHERE norad_cat_id = 1")
            .unwrap_err();
        assert!(matches!(err, GuardError::NotReadOnly(_)));
        assert_eq!(err.kind(), "not_read_only");
    }

    #[test]
    fn rejects_every_mutation_verb() {
        let candidates = [
            "INSERT INTO satcat (norad_cat_id) VALUES (1)",
            "UPDATE satcat SET object_name = 'X' WHERE norad_cat_id = 1",
            "DROP TABLE satcat",
            "TRUNCATE TABLE satcat",
            "ALTER TABLE satcat ADD COLUMN note TEXT",
            "CREATE TABLE copycat (id INT)",
            "GRANT SELECT ON satcat TO public",
            "BEGIN",
        ];
        for sql in candidates {
            let err = guard().validate(sql).unwrap_err();
            assert!(
                matches!(err, GuardError::NotReadOnly(_)),
                "{sql:?} should be rejected as not read-only, got {err:?}"
            );
        }
    }

    #[test]
    fn rejects_dml_hidden_in_cte() {
        // Whether the parser accepts the shape or not, it must never pass.
        let sql = "WITH gone AS (DELETE FROM satcat RETURNING *) SELECT * FROM gone";
        assert!(guard().validate(sql).is_err());
    }

    #[test]
    fn rejects_select_into() {
        let err = guard()
            .validate("SELECT * INTO satcat_backup FROM satcat")
            .unwrap_err();
        assert!(matches!(err, GuardError::NotReadOnly(_)));
    }

    #[test]
    fn rejects_locking_clause() {
        let err = guard()
            .validate("SELECT * FROM satcat LIMIT 1 FOR UPDATE")
            .unwrap_err();
        assert!(matches!(err, GuardError::NotReadOnly(_)));
    }

    // ── allow-list enforcement ───────────────────────────────────

    #[test]
    fn rejects_unknown_table() {
        let err = guard().validate("SELECT * FROM users").unwrap_err();
        assert_eq!(err, GuardError::UnknownTable("users".to_string()));
        assert_eq!(err.kind(), "unknown_table");
    }

    #[test]
    fn rejects_unknown_table_in_subquery() {
        let err = guard()
            .validate("SELECT * FROM satcat WHERE norad_cat_id IN (SELECT id FROM secrets)")
            .unwrap_err();
        assert_eq!(err, GuardError::UnknownTable("secrets".to_string()));
    }

    #[test]
    fn rejects_unknown_table_in_join() {
        let err = guard()
            .validate("SELECT * FROM satcat s JOIN launches l ON l.id = s.norad_cat_id")
            .unwrap_err();
        assert_eq!(err, GuardError::UnknownTable("launches".to_string()));
    }

    #[test]
    fn rejects_system_catalog_reference() {
        let err = guard()
            .validate("SELECT * FROM pg_catalog.pg_tables")
            .unwrap_err();
        assert_eq!(
            err,
            GuardError::UnknownTable("pg_catalog.pg_tables".to_string())
        );
    }

    #[test]
    fn rejects_unlisted_table_function() {
        let err = guard()
            .validate("SELECT * FROM generate_series(1, 10)")
            .unwrap_err();
        assert!(matches!(err, GuardError::UnknownTable(_)));
    }

    // ── parse failures and determinism ───────────────────────────

    #[test]
    fn rejects_unparseable_input() {
        let err = guard().validate("SELEC object_name FORM satcat").unwrap_err();
        assert!(matches!(err, GuardError::Unparseable(_)));
        assert_eq!(err.kind(), "unparseable");
    }

    #[test]
    fn rejects_empty_input() {
        assert!(matches!(
            guard().validate("").unwrap_err(),
            GuardError::Unparseable(_)
        ));
        assert!(matches!(
            guard().validate("   ").unwrap_err(),
            GuardError::Unparseable(_)
        ));
    }

    #[test]
    fn verdicts_are_idempotent() {
        let g = guard();
        for sql in [
            "SELECT object_name FROM satcat",
            "SELECT * FROM satcat; DROP TABLE satcat;",
            "DELETE FROM satcat",
            "SELECT * FROM nowhere",
        ] {
            assert_eq!(g.validate(sql), g.validate(sql));
        }
    }
}
