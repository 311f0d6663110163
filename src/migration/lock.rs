//! Table-based migration lock.
//!
//! The process that inserts the row with version [`LOCK_VERSION`] into the
//! state table holds the lock; the primary key makes the insert atomic.
//! Everyone else polls until it disappears or the timeout runs out.

use std::time::{Duration, Instant};

use crate::executor::Executor;
use crate::migration::{MigrationError, STATE_TABLE};

/// Never used by a real migration (those are positive timestamps).
pub const LOCK_VERSION: i64 = -1;

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const STATEMENT_TIMEOUT_SECS: u64 = 5;

/// Holds the lock until dropped.
pub struct MigrationLockGuard<'a> {
    executor: &'a dyn Executor,
}

impl<'a> MigrationLockGuard<'a> {
    pub fn new(executor: &'a dyn Executor, timeout_seconds: Option<u64>) -> Result<Self, MigrationError> {
        acquire_migration_lock(executor, timeout_seconds.unwrap_or(60))?;
        Ok(Self { executor })
    }

    pub fn executor(&self) -> &'a dyn Executor {
        self.executor
    }
}

impl Drop for MigrationLockGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = release_migration_lock(self.executor) {
            log::error!("failed to release migration lock: {e}");
        }
    }
}

fn lock_timeout(timeout_seconds: u64) -> MigrationError {
    MigrationError::LockTimeout(format!(
        "could not acquire the migration lock within {timeout_seconds} seconds; \
         a stale lock can be cleared with: DELETE FROM {STATE_TABLE} WHERE version = {LOCK_VERSION}"
    ))
}

pub fn acquire_migration_lock(
    executor: &dyn Executor,
    timeout_seconds: u64,
) -> Result<(), MigrationError> {
    let start = Instant::now();
    let timeout = Duration::from_secs(timeout_seconds);

    // Session level; reset on every exit path below.
    let _ = executor.execute(
        &format!("SET statement_timeout = '{STATEMENT_TIMEOUT_SECS}s'"),
        &[],
    );
    let reset = || {
        let _ = executor.execute("RESET statement_timeout", &[]);
    };

    let sql = format!(
        "INSERT INTO {STATE_TABLE} (version, name, checksum, applied_at, success) \
         VALUES ({LOCK_VERSION}, 'LOCK', 'lock', NOW(), true) \
         ON CONFLICT (version) DO NOTHING"
    );

    loop {
        if start.elapsed() >= timeout {
            reset();
            return Err(lock_timeout(timeout_seconds));
        }

        match executor.execute(&sql, &[]) {
            Ok(rows) if rows > 0 => {
                reset();
                log::debug!("migration lock acquired after {:?}", start.elapsed());
                return Ok(());
            }
            Ok(_) => {}
            Err(e) => {
                let message = e.to_string();
                if !(message.contains("timeout") || message.contains("canceling statement")) {
                    reset();
                    return Err(MigrationError::Database(e));
                }
                log::warn!("migration lock attempt timed out, retrying");
            }
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

pub fn release_migration_lock(executor: &dyn Executor) -> Result<(), MigrationError> {
    executor.execute(
        &format!("DELETE FROM {STATE_TABLE} WHERE version = {LOCK_VERSION}"),
        &[],
    )?;
    Ok(())
}

pub fn is_migration_lock_held(executor: &dyn Executor) -> Result<bool, MigrationError> {
    let row = executor.query_one(
        &format!("SELECT COUNT(*) FROM {STATE_TABLE} WHERE version = {LOCK_VERSION}"),
        &[],
    )?;
    let count: i64 = row
        .try_get(0)
        .map_err(|e| crate::executor::DbError::ParseError(e.to_string()))?;
    Ok(count > 0)
}
