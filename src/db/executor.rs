//! Query execution engine.
//!
//! Two deliberately separate paths:
//!
//! - `execute` binds values through the driver (never interpolated into SQL
//!   text) and runs a single statement against a leased connection.
//! - `split_script` + `execute_statement` form the script path: validated,
//!   version-controlled multi-statement text applied one statement at a time,
//!   unprepared. Only the repair runner uses it; ad-hoc queries cannot reach
//!   it.
//!
//! Database-specific implementations live in parallel submodules, one per
//! backend, each providing the same interface adapted to its type system.

use crate::db::pool::{DbConn, DiagnosticPool, PooledConnection};
use crate::db::types::RowToJson;
use crate::error::{ToolkitError, ToolkitResult};
use crate::models::{DatabaseType, QueryParam, QueryRequest, QueryResult};
use futures_util::StreamExt;
use sqlparser::dialect::{Dialect, MySqlDialect, PostgreSqlDialect, SQLiteDialect};
use sqlparser::parser::Parser;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, warn};

/// Query executor that handles statement execution over leased connections.
pub struct QueryExecutor {
    default_timeout: Duration,
    default_limit: u32,
}

impl QueryExecutor {
    /// Create a new query executor with default settings.
    pub fn new() -> Self {
        Self {
            default_timeout: Duration::from_secs(
                crate::models::DEFAULT_QUERY_TIMEOUT_SECS as u64,
            ),
            default_limit: crate::models::DEFAULT_ROW_LIMIT,
        }
    }

    /// Create a new query executor with custom settings.
    pub fn with_defaults(timeout_secs: u64, row_limit: u32) -> Self {
        Self {
            default_timeout: Duration::from_secs(timeout_secs),
            default_limit: row_limit.min(crate::models::MAX_ROW_LIMIT),
        }
    }

    /// Execute a parameterized query on a leased connection.
    pub async fn execute(
        &self,
        conn: &mut PooledConnection,
        request: &QueryRequest,
    ) -> ToolkitResult<QueryResult> {
        let start = Instant::now();
        let row_limit = request
            .limit
            .map(|l| l.clamp(1, crate::models::MAX_ROW_LIMIT))
            .unwrap_or(self.default_limit);
        let query_timeout = request
            .timeout_secs
            .map(|t| Duration::from_secs(t as u64))
            .unwrap_or(self.default_timeout);

        debug!(
            sql = %request.sql,
            params = request.params.len(),
            limit = row_limit,
            timeout_secs = query_timeout.as_secs(),
            "Executing query"
        );

        match conn.conn_mut() {
            DbConn::MySql(c) => {
                let rows =
                    mysql::fetch_rows(c, &request.sql, &request.params, row_limit, query_timeout)
                        .await?;
                Ok(process_rows(rows, row_limit, start))
            }
            DbConn::Postgres(c) => {
                let rows = postgres::fetch_rows(
                    c,
                    &request.sql,
                    &request.params,
                    row_limit,
                    query_timeout,
                )
                .await?;
                Ok(process_rows(rows, row_limit, start))
            }
            DbConn::SQLite(c) => {
                let rows =
                    sqlite::fetch_rows(c, &request.sql, &request.params, row_limit, query_timeout)
                        .await?;
                Ok(process_rows(rows, row_limit, start))
            }
        }
    }

    /// Acquire a connection from the pool and execute, retrying exactly once
    /// on connection loss with a freshly acquired connection. All other
    /// failures surface immediately.
    pub async fn execute_on_pool(
        &self,
        pool: &DiagnosticPool,
        request: &QueryRequest,
    ) -> ToolkitResult<QueryResult> {
        let mut conn = pool.acquire().await?;
        match self.execute(&mut conn, request).await {
            Err(e) if e.is_connection_loss() => {
                warn!(
                    error = %e,
                    "Connection lost mid-query - retrying once on a fresh connection"
                );
                drop(conn);
                let mut conn = pool.acquire().await?;
                self.execute(&mut conn, request).await
            }
            other => other,
        }
    }

    /// Execute one statement unprepared and return affected rows.
    ///
    /// Script path only: no parameter binding, so the text must come from a
    /// validated script source, never from ad-hoc input.
    pub async fn execute_statement(
        &self,
        conn: &mut PooledConnection,
        sql: &str,
        query_timeout: Option<Duration>,
    ) -> ToolkitResult<u64> {
        use sqlx::Executor;

        let query_timeout = query_timeout.unwrap_or(self.default_timeout);

        debug!(sql = %sql, timeout_secs = query_timeout.as_secs(), "Executing statement");

        let affected = match conn.conn_mut() {
            DbConn::MySql(c) => match timeout(query_timeout, (&mut **c).execute(sql)).await {
                Ok(Ok(done)) => done.rows_affected(),
                Ok(Err(e)) => return Err(ToolkitError::from(e)),
                Err(_) => {
                    return Err(timeout_error("statement execution", query_timeout));
                }
            },
            DbConn::Postgres(c) => match timeout(query_timeout, (&mut **c).execute(sql)).await {
                Ok(Ok(done)) => done.rows_affected(),
                Ok(Err(e)) => return Err(ToolkitError::from(e)),
                Err(_) => {
                    return Err(timeout_error("statement execution", query_timeout));
                }
            },
            DbConn::SQLite(c) => match timeout(query_timeout, (&mut **c).execute(sql)).await {
                Ok(Ok(done)) => done.rows_affected(),
                Ok(Err(e)) => return Err(ToolkitError::from(e)),
                Err(_) => {
                    return Err(timeout_error("statement execution", query_timeout));
                }
            },
        };

        Ok(affected)
    }
}

impl Default for QueryExecutor {
    fn default() -> Self {
        Self::new()
    }
}

/// Get the SQL dialect for the given database type.
fn dialect_for(db_type: DatabaseType) -> Box<dyn Dialect> {
    match db_type {
        DatabaseType::PostgreSQL => Box::new(PostgreSqlDialect {}),
        DatabaseType::MySQL => Box::new(MySqlDialect {}),
        DatabaseType::SQLite => Box::new(SQLiteDialect {}),
    }
}

/// Validate multi-statement script text and split it into statements.
///
/// Parsing the whole body up front means a script with a syntax error in its
/// last statement is rejected before the first statement runs.
pub fn split_script(sql: &str, db_type: DatabaseType) -> ToolkitResult<Vec<String>> {
    let dialect = dialect_for(db_type);
    let statements = Parser::parse_sql(dialect.as_ref(), sql).map_err(|e| {
        ToolkitError::query_syntax(format!("Script failed validation: {}", e), None)
    })?;

    if statements.is_empty() {
        return Err(ToolkitError::query_syntax("Script contains no statements", None));
    }

    Ok(statements.iter().map(|s| s.to_string()).collect())
}

/// Process fetched rows into a QueryResult.
fn process_rows<R: RowToJson>(rows: Vec<R>, row_limit: u32, start: Instant) -> QueryResult {
    let execution_time_ms = start.elapsed().as_millis() as u64;

    if rows.is_empty() {
        return QueryResult::empty(execution_time_ms);
    }

    let columns = rows[0].column_descriptors();
    let total_rows = rows.len();
    let truncated = total_rows > row_limit as usize;
    let rows_to_take = (row_limit as usize).min(total_rows);

    let json_rows: Vec<serde_json::Map<String, serde_json::Value>> = rows
        .iter()
        .take(rows_to_take)
        .map(|r| r.to_json_map())
        .collect();

    if truncated {
        warn!(total_rows, limit = row_limit, "Query result truncated");
    }

    QueryResult {
        columns,
        rows: json_rows,
        rows_affected: None,
        truncated,
        execution_time_ms,
    }
}

fn collect_rows<R>(results: Vec<Result<R, sqlx::Error>>) -> ToolkitResult<Vec<R>> {
    let mut rows = Vec::with_capacity(results.len());
    for result in results {
        rows.push(result.map_err(ToolkitError::from)?);
    }
    Ok(rows)
}

fn timeout_error(operation: &str, timeout: Duration) -> ToolkitError {
    ToolkitError::timeout(operation, timeout.as_secs())
}

// Database-specific implementations. The code structure is intentionally
// parallel to make differences obvious.

mod mysql {
    use super::*;
    use sqlx::mysql::{MySqlArguments, MySqlRow};
    use sqlx::pool::PoolConnection;

    pub async fn fetch_rows(
        conn: &mut PoolConnection<sqlx::MySql>,
        sql: &str,
        params: &[QueryParam],
        row_limit: u32,
        query_timeout: Duration,
    ) -> ToolkitResult<Vec<MySqlRow>> {
        // Fetch one past the limit so truncation is detectable without
        // draining the whole result set.
        let fetch_limit = row_limit as usize + 1;
        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_param(query, param);
        }
        let rows_future = query.fetch(&mut **conn).take(fetch_limit).collect::<Vec<_>>();

        match timeout(query_timeout, rows_future).await {
            Ok(results) => collect_rows(results),
            Err(_) => Err(timeout_error("query execution", query_timeout)),
        }
    }

    fn bind_param<'q>(
        query: sqlx::query::Query<'q, sqlx::MySql, MySqlArguments>,
        param: &'q QueryParam,
    ) -> sqlx::query::Query<'q, sqlx::MySql, MySqlArguments> {
        match param {
            QueryParam::Null => query.bind(None::<String>),
            QueryParam::Bool(v) => query.bind(*v),
            QueryParam::Int(v) => query.bind(*v),
            QueryParam::Float(v) => query.bind(*v),
            QueryParam::String(v) => query.bind(v.as_str()),
            QueryParam::Bytes(v) => query.bind(v.as_slice()),
        }
    }
}

mod postgres {
    use super::*;
    use sqlx::pool::PoolConnection;
    use sqlx::postgres::{PgArguments, PgRow};

    pub async fn fetch_rows(
        conn: &mut PoolConnection<sqlx::Postgres>,
        sql: &str,
        params: &[QueryParam],
        row_limit: u32,
        query_timeout: Duration,
    ) -> ToolkitResult<Vec<PgRow>> {
        let fetch_limit = row_limit as usize + 1;
        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_param(query, param);
        }
        let rows_future = query.fetch(&mut **conn).take(fetch_limit).collect::<Vec<_>>();

        match timeout(query_timeout, rows_future).await {
            Ok(results) => collect_rows(results),
            Err(_) => Err(timeout_error("query execution", query_timeout)),
        }
    }

    fn bind_param<'q>(
        query: sqlx::query::Query<'q, sqlx::Postgres, PgArguments>,
        param: &'q QueryParam,
    ) -> sqlx::query::Query<'q, sqlx::Postgres, PgArguments> {
        match param {
            QueryParam::Null => query.bind(None::<String>),
            QueryParam::Bool(v) => query.bind(*v),
            QueryParam::Int(v) => query.bind(*v),
            QueryParam::Float(v) => query.bind(*v),
            QueryParam::String(v) => query.bind(v.as_str()),
            QueryParam::Bytes(v) => query.bind(v.as_slice()),
        }
    }
}

mod sqlite {
    use super::*;
    use sqlx::pool::PoolConnection;
    use sqlx::sqlite::{SqliteArguments, SqliteRow};

    pub async fn fetch_rows(
        conn: &mut PoolConnection<sqlx::Sqlite>,
        sql: &str,
        params: &[QueryParam],
        row_limit: u32,
        query_timeout: Duration,
    ) -> ToolkitResult<Vec<SqliteRow>> {
        let fetch_limit = row_limit as usize + 1;
        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_param(query, param);
        }
        let rows_future = query.fetch(&mut **conn).take(fetch_limit).collect::<Vec<_>>();

        match timeout(query_timeout, rows_future).await {
            Ok(results) => collect_rows(results),
            Err(_) => Err(timeout_error("query execution", query_timeout)),
        }
    }

    fn bind_param<'q>(
        query: sqlx::query::Query<'q, sqlx::Sqlite, SqliteArguments<'q>>,
        param: &'q QueryParam,
    ) -> sqlx::query::Query<'q, sqlx::Sqlite, SqliteArguments<'q>> {
        match param {
            QueryParam::Null => query.bind(None::<String>),
            QueryParam::Bool(v) => query.bind(*v),
            QueryParam::Int(v) => query.bind(*v),
            QueryParam::Float(v) => query.bind(*v),
            QueryParam::String(v) => query.bind(v.as_str()),
            QueryParam::Bytes(v) => query.bind(v.as_slice()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_executor_defaults() {
        let executor = QueryExecutor::new();
        assert_eq!(
            executor.default_timeout,
            Duration::from_secs(crate::models::DEFAULT_QUERY_TIMEOUT_SECS as u64)
        );
        assert_eq!(executor.default_limit, crate::models::DEFAULT_ROW_LIMIT);
    }

    #[test]
    fn test_executor_limit_capped() {
        let executor = QueryExecutor::with_defaults(30, u32::MAX);
        assert_eq!(executor.default_limit, crate::models::MAX_ROW_LIMIT);
    }

    #[test]
    fn test_split_script_multiple_statements() {
        let script = "UPDATE missiles SET type = 'Kamikaze Drone' WHERE name = 'shahed'; \
                      DELETE FROM scratch_rows WHERE stale = 1;";
        let statements = split_script(script, DatabaseType::SQLite).unwrap();
        assert_eq!(statements.len(), 2);
        assert!(statements[0].starts_with("UPDATE"));
        assert!(statements[1].starts_with("DELETE"));
    }

    #[test]
    fn test_split_script_rejects_invalid_sql() {
        let result = split_script("UPDATE WHERE oops", DatabaseType::SQLite);
        assert!(matches!(result, Err(ToolkitError::QuerySyntax { .. })));
    }

    #[test]
    fn test_split_script_rejects_empty() {
        let result = split_script("", DatabaseType::SQLite);
        assert!(matches!(result, Err(ToolkitError::QuerySyntax { .. })));

        let result = split_script("   \n  ", DatabaseType::MySQL);
        assert!(matches!(result, Err(ToolkitError::QuerySyntax { .. })));
    }

    #[test]
    fn test_split_script_rejects_late_error_before_any_execution() {
        // The second statement is broken; validation must fail the whole
        // script up front.
        let script = "UPDATE missiles SET type = 'x'; SELEC oops;";
        let result = split_script(script, DatabaseType::SQLite);
        assert!(result.is_err());
    }
}
