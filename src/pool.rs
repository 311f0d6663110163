//! Fixed-size pool of `may_postgres` connections.
//!
//! A checkout owns one database session until it is dropped, so a
//! transaction opened on it never shares the session with another caller.
//! At most `max_connections` sessions are checked out at once; further
//! callers wait up to `pool_timeout_seconds`. Idle sessions are health
//! checked before reuse and replaced when the check fails.

use may::sync::Semphore;
use may_postgres::types::ToSql;
use may_postgres::{Client, Row};
use std::ops::Deref;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use crate::config::DatabaseConfig;
use crate::connection::{connect, validate_connection_string, ConnectionError};
use crate::executor::{DbError, Executor, PgExecutor};

pub struct PgPool {
    url: String,
    idle: Mutex<Vec<Client>>,
    permits: Semphore,
    max_connections: usize,
    acquire_timeout: Duration,
}

impl PgPool {
    /// Open the pool with one live session so a bad URL fails here.
    pub fn open(url: &str, config: &DatabaseConfig) -> Result<Self, ConnectionError> {
        validate_connection_string(url)?;
        let max_connections = usize::try_from(config.max_connections)
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| {
                ConnectionError::Other(format!(
                    "max_connections must be positive, got {}",
                    config.max_connections
                ))
            })?;
        let first = connect(url)?;
        log::info!("connection pool opened with up to {max_connections} sessions");
        Ok(Self {
            url: url.to_string(),
            idle: Mutex::new(vec![first]),
            permits: Semphore::new(max_connections),
            max_connections,
            acquire_timeout: Duration::from_secs(config.pool_timeout_seconds),
        })
    }

    /// Check out a session, waiting for one to free up if all are in use.
    pub fn acquire(&self) -> Result<PooledConnection<'_>, ConnectionError> {
        if !self.permits.wait_timeout(self.acquire_timeout) {
            log::warn!(
                "all {} pooled sessions busy for {:?}",
                self.max_connections,
                self.acquire_timeout
            );
            return Err(ConnectionError::Other(format!(
                "no connection free within {}s",
                self.acquire_timeout.as_secs()
            )));
        }
        match self.checkout() {
            Ok(executor) => Ok(PooledConnection {
                pool: self,
                executor,
                reusable: true,
            }),
            Err(err) => {
                self.permits.post();
                Err(err)
            }
        }
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    pub fn idle_connections(&self) -> usize {
        self.idle_list().len()
    }

    fn idle_list(&self) -> std::sync::MutexGuard<'_, Vec<Client>> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn checkout(&self) -> Result<PgExecutor, ConnectionError> {
        loop {
            let Some(client) = self.idle_list().pop() else {
                break;
            };
            let executor = PgExecutor::new(client);
            match executor.check_health() {
                Ok(true) => return Ok(executor),
                Ok(false) => log::warn!("pooled session failed its health check, replacing it"),
                Err(e) => log::warn!("pooled session is gone, replacing it: {e}"),
            }
        }
        Ok(PgExecutor::new(connect(&self.url)?))
    }
}

/// Each statement runs on whichever session is free. Use
/// [`PgPool::acquire`] when several statements must share a session.
impl Executor for PgPool {
    fn execute(&self, query: &str, params: &[&dyn ToSql]) -> Result<u64, DbError> {
        self.acquire()?.execute(query, params)
    }

    fn query_one(&self, query: &str, params: &[&dyn ToSql]) -> Result<Row, DbError> {
        self.acquire()?.query_one(query, params)
    }

    fn query_all(&self, query: &str, params: &[&dyn ToSql]) -> Result<Vec<Row>, DbError> {
        self.acquire()?.query_all(query, params)
    }
}

/// A checked-out session. Returned to the pool on drop.
pub struct PooledConnection<'a> {
    pool: &'a PgPool,
    executor: PgExecutor,
    reusable: bool,
}

impl PooledConnection<'_> {
    /// Close the session instead of returning it, e.g. after a failed
    /// rollback left it in an unknown transaction state.
    pub fn discard(mut self) {
        self.reusable = false;
    }
}

impl Deref for PooledConnection<'_> {
    type Target = PgExecutor;

    fn deref(&self) -> &PgExecutor {
        &self.executor
    }
}

impl Drop for PooledConnection<'_> {
    fn drop(&mut self) {
        if self.reusable {
            self.pool.idle_list().push(self.executor.client().clone());
        } else {
            log::warn!("discarding pooled session");
        }
        self.pool.permits.post();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(max_connections: i32) -> DatabaseConfig {
        DatabaseConfig {
            max_connections,
            ..DatabaseConfig::default()
        }
    }

    #[test]
    fn test_open_rejects_malformed_url_before_connecting() {
        match PgPool::open("localhost:5432", &config(4)) {
            Err(ConnectionError::InvalidConnectionString(_)) => {}
            other => panic!("expected invalid connection string, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_open_rejects_non_positive_size() {
        for size in [0, -3] {
            let err = PgPool::open("postgres://u:p@localhost:1/none", &config(size))
                .err()
                .unwrap();
            assert!(err.to_string().contains("max_connections must be positive"));
        }
    }

    #[test]
    fn test_connection_errors_become_storage_errors() {
        let err: DbError = ConnectionError::Other("no connection free within 30s".to_string()).into();
        assert!(matches!(err, DbError::Other(_)));
        assert!(err.to_string().contains("no connection free"));
    }
}
