//! Transactions over a `may_postgres` client.
//!
//! A [`Transaction`] implements [`Executor`], so store code written against
//! `&dyn Executor` runs unchanged inside one. Dropping a transaction that was
//! neither committed nor rolled back rolls it back, so a pooled session is
//! never handed on mid-transaction.

use crate::executor::{instrumented, DbError, Executor};
use may_postgres::types::ToSql;
use may_postgres::{Client, Error as PostgresError, Row};
use std::fmt;

#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

/// Transaction error type
#[derive(Debug)]
pub enum TransactionError {
    /// PostgreSQL error from may_postgres
    PostgresError(PostgresError),
    /// Transaction already committed or rolled back
    TransactionClosed,
}

impl fmt::Display for TransactionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionError::PostgresError(e) => write!(f, "PostgreSQL error: {e}"),
            TransactionError::TransactionClosed => {
                write!(f, "Transaction has already been committed or rolled back")
            }
        }
    }
}

impl std::error::Error for TransactionError {}

impl From<PostgresError> for TransactionError {
    fn from(err: PostgresError) -> Self {
        TransactionError::PostgresError(err)
    }
}

impl From<TransactionError> for DbError {
    fn from(err: TransactionError) -> Self {
        match err {
            TransactionError::PostgresError(e) => DbError::PostgresError(e),
            TransactionError::TransactionClosed => DbError::Other("Transaction closed".to_string()),
        }
    }
}

/// A database transaction
///
/// Finish it with [`commit`](Transaction::commit) or
/// [`rollback`](Transaction::rollback); both consume it.
pub struct Transaction {
    client: Client,
    closed: bool,
}

impl Transaction {
    pub(crate) fn new(client: Client) -> Result<Self, TransactionError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::begin_transaction_span().entered();

        client.execute("BEGIN", &[]).map_err(TransactionError::from)?;
        Ok(Self {
            client,
            closed: false,
        })
    }

    pub fn commit(mut self) -> Result<(), TransactionError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::commit_transaction_span().entered();

        self.finish("COMMIT")
    }

    pub fn rollback(mut self) -> Result<(), TransactionError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::rollback_transaction_span().entered();

        self.finish("ROLLBACK")
    }

    fn finish(&mut self, sql: &str) -> Result<(), TransactionError> {
        if self.closed {
            return Err(TransactionError::TransactionClosed);
        }
        // closed even on error: the session has left the transaction or is broken
        self.closed = true;
        self.client.execute(sql, &[]).map_err(TransactionError::from)?;
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), DbError> {
        if self.closed {
            Err(DbError::Other("Transaction is closed".to_string()))
        } else {
            Ok(())
        }
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if !self.closed {
            log::warn!("transaction dropped while open, rolling back");
            if let Err(e) = self.finish("ROLLBACK") {
                log::error!("rollback on drop failed: {e}");
            }
        }
    }
}

impl Executor for Transaction {
    fn execute(&self, query: &str, params: &[&dyn ToSql]) -> Result<u64, DbError> {
        self.ensure_open()?;
        instrumented(query, || self.client.execute(query, params))
    }

    fn query_one(&self, query: &str, params: &[&dyn ToSql]) -> Result<Row, DbError> {
        self.ensure_open()?;
        instrumented(query, || self.client.query_one(query, params))
    }

    fn query_all(&self, query: &str, params: &[&dyn ToSql]) -> Result<Vec<Row>, DbError> {
        self.ensure_open()?;
        instrumented(query, || self.client.query(query, params))
    }
}
