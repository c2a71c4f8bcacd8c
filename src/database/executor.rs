//! Query guard and executor
//!
//! Runs exactly one SQL statement against the store and returns normalized
//! rows or a [`StructuredError`]. Nothing crosses this boundary as a panic or
//! a raised error: store failures, guard rejections, and pool faults all come
//! back as the error variant of [`QueryOutcome`].
//!
//! The guard is a coarse lexical filter over mutating keywords. It can
//! false-positive on keywords inside string literals and false-negative on a
//! side-effecting routine called from a SELECT; that approximation is the
//! accepted contract, not a bug.

use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::{Column, Postgres, Row};
use tracing::{debug, warn};

use super::pool::{PgConnectionFactory, PoolManager};

/// Keywords whose presence anywhere in the uppercased statement rejects it.
const FORBIDDEN_KEYWORDS: [&str; 6] = ["DELETE", "DROP", "TRUNCATE", "INSERT", "UPDATE", "ALTER"];

/// One result row: column name (lowercased) to scalar value, in column order.
pub type RowMap = serde_json::Map<String, Value>;

/// Ordered query result. Row order matches the store; no implicit limit.
pub type RowSet = Vec<RowMap>;

/// Non-exceptional error value returned in place of query results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{message}")]
pub struct StructuredError {
    pub message: String,
}

impl StructuredError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Result of running one statement.
pub type QueryOutcome = Result<RowSet, StructuredError>;

/// The swappable execution seam: orchestrator, schema introspection, and test
/// stubs all talk to the store through this trait.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Run one statement with positional bind parameters.
    async fn execute_query_with(&self, sql: &str, binds: &[Value]) -> QueryOutcome;

    /// Run one statement without binds.
    async fn execute_query(&self, sql: &str) -> QueryOutcome {
        self.execute_query_with(sql, &[]).await
    }
}

#[async_trait]
impl<T: QueryExecutor + ?Sized> QueryExecutor for Arc<T> {
    async fn execute_query_with(&self, sql: &str, binds: &[Value]) -> QueryOutcome {
        (**self).execute_query_with(sql, binds).await
    }
}

/// Runs an already-guarded statement against a concrete backend.
#[async_trait]
pub trait StatementRunner: Send + Sync {
    async fn run(&self, sql: &str, binds: &[Value]) -> QueryOutcome;
}

/// Reject mutating statements before they reach the store.
///
/// Substring match over the uppercased text, not a parse. Returns the
/// rejection to hand back to the caller, or `None` when the statement passes.
pub fn guard_statement(sql: &str) -> Option<StructuredError> {
    let upper = sql.to_uppercase();
    FORBIDDEN_KEYWORDS
        .iter()
        .find(|keyword| upper.contains(*keyword))
        .map(|keyword| {
            StructuredError::new(format!(
                "Security warning: only read queries are permitted (statement contains {keyword})"
            ))
        })
}

/// Strip trailing statement terminators; the store rejects them on bound
/// execution.
fn normalize_statement(sql: &str) -> String {
    let mut statement = sql.trim();
    while let Some(stripped) = statement.strip_suffix(';') {
        statement = stripped.trim_end();
    }
    statement.to_string()
}

/// Lowercase row keys so one case convention holds regardless of backend.
fn normalize_row_keys(rows: RowSet) -> RowSet {
    rows.into_iter()
        .map(|row| {
            row.into_iter()
                .map(|(key, value)| (key.to_lowercase(), value))
                .collect()
        })
        .collect()
}

/// Guard + normalize + delegate. The production stack wraps a
/// [`PgStatementRunner`]; tests wrap counting stubs.
pub struct GuardedExecutor<R> {
    runner: R,
}

impl<R: StatementRunner> GuardedExecutor<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl<R: StatementRunner> QueryExecutor for GuardedExecutor<R> {
    async fn execute_query_with(&self, sql: &str, binds: &[Value]) -> QueryOutcome {
        if let Some(rejection) = guard_statement(sql) {
            warn!(sql, "guard rejected statement");
            return Err(rejection);
        }

        let statement = normalize_statement(sql);
        if statement.is_empty() {
            return Err(StructuredError::new("empty statement"));
        }

        debug!(sql = %statement, "executing statement");
        let rows = self.runner.run(&statement, binds).await?;
        Ok(normalize_row_keys(rows))
    }
}

/// Statement runner backed by a pooled PostgreSQL connection.
///
/// Statements run in autocommit mode: only reads pass the guard above, but a
/// caller bypassing the guard programmatically would still get deterministic
/// commit semantics per statement. That path is a latent capability, not an
/// exercised one.
pub struct PgStatementRunner {
    pool: Arc<PoolManager<PgConnectionFactory>>,
}

impl PgStatementRunner {
    pub fn new(pool: Arc<PoolManager<PgConnectionFactory>>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StatementRunner for PgStatementRunner {
    async fn run(&self, sql: &str, binds: &[Value]) -> QueryOutcome {
        let mut lease = self
            .pool
            .acquire()
            .await
            .map_err(|e| StructuredError::new(e.to_string()))?;

        let mut query = sqlx::query(sql);
        for bind in binds {
            query = bind_value(query, bind);
        }

        // The lease returns to the pool when it drops, on success and error
        // alike.
        let rows = query
            .fetch_all(&mut *lease)
            .await
            .map_err(|e| StructuredError::new(e.to_string()))?;

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            out.push(decode_row(row)?);
        }
        Ok(out)
    }
}

fn bind_value<'q>(
    query: Query<'q, Postgres, PgArguments>,
    value: &'q Value,
) -> Query<'q, Postgres, PgArguments> {
    match value {
        Value::Null => query.bind(Option::<String>::None),
        Value::Bool(b) => query.bind(*b),
        Value::Number(n) if n.is_i64() => query.bind(n.as_i64()),
        Value::Number(n) => query.bind(n.as_f64()),
        Value::String(s) => query.bind(s.as_str()),
        other => query.bind(other.clone()),
    }
}

fn decode_row(row: &PgRow) -> Result<RowMap, StructuredError> {
    let mut map = RowMap::new();
    for column in row.columns() {
        let value = decode_column(row, column).map_err(|e| {
            StructuredError::new(format!("failed to decode column {}: {e}", column.name()))
        })?;
        map.insert(column.name().to_lowercase(), value);
    }
    Ok(map)
}

fn decode_column(row: &PgRow, column: &sqlx::postgres::PgColumn) -> Result<Value, sqlx::Error> {
    use sqlx::TypeInfo;

    let idx = column.ordinal();
    let value = match column.type_info().name() {
        "INT2" => row.try_get::<Option<i16>, _>(idx)?.map_or(Value::Null, |v| json!(v)),
        "INT4" => row.try_get::<Option<i32>, _>(idx)?.map_or(Value::Null, |v| json!(v)),
        "INT8" => row.try_get::<Option<i64>, _>(idx)?.map_or(Value::Null, |v| json!(v)),
        "FLOAT4" => row.try_get::<Option<f32>, _>(idx)?.map_or(Value::Null, |v| json!(v)),
        "FLOAT8" => row.try_get::<Option<f64>, _>(idx)?.map_or(Value::Null, |v| json!(v)),
        "NUMERIC" => row
            .try_get::<Option<Decimal>, _>(idx)?
            .map_or(Value::Null, |d| match d.to_f64() {
                Some(f) => json!(f),
                None => json!(d.to_string()),
            }),
        "BOOL" => row.try_get::<Option<bool>, _>(idx)?.map_or(Value::Null, |v| json!(v)),
        "DATE" => row
            .try_get::<Option<chrono::NaiveDate>, _>(idx)?
            .map_or(Value::Null, |v| json!(v.to_string())),
        "TIME" => row
            .try_get::<Option<chrono::NaiveTime>, _>(idx)?
            .map_or(Value::Null, |v| json!(v.to_string())),
        "TIMESTAMP" => row
            .try_get::<Option<chrono::NaiveDateTime>, _>(idx)?
            .map_or(Value::Null, |v| json!(v.to_string())),
        "TIMESTAMPTZ" => row
            .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(idx)?
            .map_or(Value::Null, |v| json!(v.to_rfc3339())),
        "UUID" => row
            .try_get::<Option<uuid::Uuid>, _>(idx)?
            .map_or(Value::Null, |v| json!(v.to_string())),
        "JSON" | "JSONB" => row
            .try_get::<Option<Value>, _>(idx)?
            .unwrap_or(Value::Null),
        // TEXT, VARCHAR, CHAR, NAME and anything else textual.
        _ => row
            .try_get::<Option<String>, _>(idx)?
            .map_or(Value::Null, |v| json!(v)),
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Runner that records every statement reaching the store.
    struct RecordingRunner {
        calls: AtomicUsize,
        rows: RowSet,
    }

    impl RecordingRunner {
        fn new(rows: RowSet) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                rows,
            }
        }
    }

    #[async_trait]
    impl StatementRunner for RecordingRunner {
        async fn run(&self, _sql: &str, _binds: &[Value]) -> QueryOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.rows.clone())
        }
    }

    fn row(pairs: &[(&str, Value)]) -> RowMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[tokio::test]
    async fn guard_rejects_every_mutating_keyword() {
        let statements = [
            "DROP TABLE emp",
            "delete from emp",
            "SELECT 1; TRUNCATE emp",
            "INSERT INTO emp VALUES (1)",
            "update emp set x = 1",
            "ALTER TABLE emp ADD c INT",
        ];

        for sql in statements {
            let executor = GuardedExecutor::new(RecordingRunner::new(vec![]));
            let result = executor.execute_query(sql).await;
            assert!(result.is_err(), "guard should reject {sql:?}");
            assert_eq!(
                executor.runner.calls.load(Ordering::SeqCst),
                0,
                "store must never be contacted for {sql:?}"
            );
        }
    }

    #[tokio::test]
    async fn guard_false_positives_on_keyword_in_literal() {
        // Accepted limitation of the lexical filter.
        let executor = GuardedExecutor::new(RecordingRunner::new(vec![]));
        let result = executor
            .execute_query("SELECT * FROM notes WHERE body = 'please UPDATE me'")
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn trailing_terminators_are_stripped() {
        struct CapturingRunner(std::sync::Mutex<String>);

        #[async_trait]
        impl StatementRunner for CapturingRunner {
            async fn run(&self, sql: &str, _binds: &[Value]) -> QueryOutcome {
                *self.0.lock().unwrap() = sql.to_string();
                Ok(vec![])
            }
        }

        let executor = GuardedExecutor::new(CapturingRunner(std::sync::Mutex::new(String::new())));
        executor.execute_query("SELECT 1 ; ;").await.unwrap();
        assert_eq!(*executor.runner.0.lock().unwrap(), "SELECT 1");
    }

    #[tokio::test]
    async fn bound_statements_are_guarded_and_normalized() {
        struct BindCapturingRunner(std::sync::Mutex<Vec<(String, Vec<Value>)>>);

        #[async_trait]
        impl StatementRunner for BindCapturingRunner {
            async fn run(&self, sql: &str, binds: &[Value]) -> QueryOutcome {
                self.0.lock().unwrap().push((sql.to_string(), binds.to_vec()));
                Ok(vec![])
            }
        }

        let executor =
            GuardedExecutor::new(BindCapturingRunner(std::sync::Mutex::new(Vec::new())));

        executor
            .execute_query_with("SELECT * FROM emp WHERE age > $1;", &[json!(30)])
            .await
            .unwrap();

        let rejected = executor
            .execute_query_with("DELETE FROM emp WHERE id = $1", &[json!(1)])
            .await;
        assert!(rejected.is_err());

        let calls = executor.runner.0.lock().unwrap();
        assert_eq!(calls.len(), 1, "the rejected statement must not run");
        assert_eq!(calls[0].0, "SELECT * FROM emp WHERE age > $1");
        assert_eq!(calls[0].1, vec![json!(30)]);
    }

    #[tokio::test]
    async fn empty_statement_is_an_error() {
        let executor = GuardedExecutor::new(RecordingRunner::new(vec![]));
        let result = executor.execute_query("  ; ").await;
        assert_eq!(
            result,
            Err(StructuredError::new("empty statement"))
        );
    }

    #[tokio::test]
    async fn row_keys_are_lowercased_preserving_order() {
        let rows = vec![
            row(&[("A", json!(1)), ("B", json!(2))]),
            row(&[("A", json!(3)), ("B", json!(4))]),
        ];
        let executor = GuardedExecutor::new(RecordingRunner::new(rows));

        let result = executor.execute_query("SELECT A, B FROM T").await.unwrap();
        assert_eq!(result.len(), 2);
        let keys: Vec<&String> = result[0].keys().collect();
        assert_eq!(keys, ["a", "b"]);
        assert_eq!(result[0]["a"], json!(1));
        assert_eq!(result[1]["b"], json!(4));
    }
}
