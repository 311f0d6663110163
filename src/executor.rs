//! Executor abstraction over `may_postgres`.
//!
//! Every SQL statement the crate issues goes through [`Executor`], so the
//! store layer and migrations work the same against a bare client or an open
//! [`Transaction`](crate::transaction::Transaction).

use may_postgres::types::ToSql;
use may_postgres::{Client, Error as PostgresError, Row};
use std::fmt;
use std::time::Instant;

#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;
#[cfg(feature = "metrics")]
use crate::metrics::METRICS;

/// Storage-level error type
#[derive(Debug)]
pub enum DbError {
    /// `PostgreSQL` error from `may_postgres`
    PostgresError(PostgresError),
    /// Query execution error
    QueryError(String),
    /// Row parsing/conversion error
    ParseError(String),
    /// Other execution errors
    Other(String),
}

impl fmt::Display for DbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DbError::PostgresError(e) => write!(f, "PostgreSQL error: {e}"),
            DbError::QueryError(s) => write!(f, "Query error: {s}"),
            DbError::ParseError(s) => write!(f, "Parse error: {s}"),
            DbError::Other(s) => write!(f, "Execution error: {s}"),
        }
    }
}

impl std::error::Error for DbError {}

impl From<PostgresError> for DbError {
    fn from(err: PostgresError) -> Self {
        DbError::PostgresError(err)
    }
}

impl DbError {
    /// True when the error is a unique violation raised by `constraint`.
    ///
    /// `may_postgres` reports constraint details inside the rendered database
    /// error, so both the display and debug forms are inspected.
    pub fn is_unique_violation(&self, constraint: &str) -> bool {
        match self {
            DbError::PostgresError(e) => {
                let display = e.to_string();
                let debug = format!("{e:?}");
                let mentions = display.contains(constraint) || debug.contains(constraint);
                let duplicate = display.contains("duplicate key")
                    || debug.contains("duplicate key")
                    || debug.contains("23505");
                mentions && duplicate
            }
            _ => false,
        }
    }
}

/// Trait for executing database operations
///
/// Implemented by [`PgExecutor`] and by open transactions, so callers can be
/// written once against `&dyn Executor`.
pub trait Executor {
    /// Execute a statement and return the number of rows affected.
    fn execute(&self, query: &str, params: &[&dyn ToSql]) -> Result<u64, DbError>;

    /// Execute a query that must return exactly one row.
    fn query_one(&self, query: &str, params: &[&dyn ToSql]) -> Result<Row, DbError>;

    /// Execute a query and return all rows.
    fn query_all(&self, query: &str, params: &[&dyn ToSql]) -> Result<Vec<Row>, DbError>;

    /// Execute a query that returns zero or one row.
    fn query_opt(&self, query: &str, params: &[&dyn ToSql]) -> Result<Option<Row>, DbError> {
        let mut rows = self.query_all(query, params)?;
        match rows.len() {
            0 => Ok(None),
            1 => Ok(rows.pop()),
            n => Err(DbError::QueryError(format!(
                "expected at most one row, got {n}"
            ))),
        }
    }
}

impl<E: Executor + ?Sized> Executor for &E {
    fn execute(&self, query: &str, params: &[&dyn ToSql]) -> Result<u64, DbError> {
        (**self).execute(query, params)
    }

    fn query_one(&self, query: &str, params: &[&dyn ToSql]) -> Result<Row, DbError> {
        (**self).query_one(query, params)
    }

    fn query_all(&self, query: &str, params: &[&dyn ToSql]) -> Result<Vec<Row>, DbError> {
        (**self).query_all(query, params)
    }
}

/// Executor backed directly by a `may_postgres::Client`
pub struct PgExecutor {
    client: Client,
}

impl PgExecutor {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Start a transaction on this session.
    pub fn begin(
        &self,
    ) -> Result<crate::transaction::Transaction, crate::transaction::TransactionError> {
        crate::transaction::Transaction::new(self.client.clone())
    }

    /// Run `SELECT 1` against the connection.
    pub fn check_health(&self) -> Result<bool, DbError> {
        crate::connection::check_connection_health(&self.client)
            .map_err(|e| DbError::Other(format!("Health check error: {e}")))
    }
}

/// Runs `op` with the shared span/metrics bookkeeping every executor applies.
pub(crate) fn instrumented<T>(
    query: &str,
    op: impl FnOnce() -> Result<T, PostgresError>,
) -> Result<T, DbError> {
    #[cfg(feature = "tracing")]
    let _span = tracing_helpers::execute_query_span(query).entered();
    #[cfg(not(feature = "tracing"))]
    let _ = query;

    let start = Instant::now();
    let result = op().map_err(|e| {
        #[cfg(feature = "metrics")]
        METRICS.record_query_error();
        log::debug!("query failed: {e}");
        DbError::PostgresError(e)
    });

    let duration = start.elapsed();
    #[cfg(feature = "metrics")]
    METRICS.record_query_duration(duration);
    #[cfg(not(feature = "metrics"))]
    let _ = duration;

    result
}

impl Executor for PgExecutor {
    fn execute(&self, query: &str, params: &[&dyn ToSql]) -> Result<u64, DbError> {
        instrumented(query, || self.client.execute(query, params))
    }

    fn query_one(&self, query: &str, params: &[&dyn ToSql]) -> Result<Row, DbError> {
        instrumented(query, || self.client.query_one(query, params))
    }

    fn query_all(&self, query: &str, params: &[&dyn ToSql]) -> Result<Vec<Row>, DbError> {
        instrumented(query, || self.client.query(query, params))
    }
}
