//! Migrator - applies and rolls back the built-in schema migrations

use chrono::Utc;
use std::time::Instant;

use crate::executor::{Executor, PgExecutor};
use crate::migration::schema::{self, SchemaMigration};
use crate::migration::{
    initialize_state_table, validate_checksum, MigrationError, MigrationLockGuard,
    MigrationRecord, MigrationStatus, PendingMigration, STATE_TABLE,
};
use crate::transaction::Transaction;

const DEFAULT_LOCK_TIMEOUT_SECS: u64 = 60;

pub struct Migrator {
    migrations: Vec<SchemaMigration>,
    lock_timeout_secs: u64,
}

impl Default for Migrator {
    fn default() -> Self {
        Self::new()
    }
}

impl Migrator {
    /// A migrator over the built-in caregate schema.
    pub fn new() -> Self {
        Self::with_migrations(schema::migrations())
    }

    pub fn with_migrations(mut migrations: Vec<SchemaMigration>) -> Self {
        migrations.sort_by_key(|m| m.version);
        Self {
            migrations,
            lock_timeout_secs: DEFAULT_LOCK_TIMEOUT_SECS,
        }
    }

    pub fn with_lock_timeout(mut self, seconds: u64) -> Self {
        self.lock_timeout_secs = seconds;
        self
    }

    pub fn migrations(&self) -> &[SchemaMigration] {
        &self.migrations
    }

    /// Applied vs pending, validating checksums of what is applied.
    pub fn status(&self, executor: &dyn Executor) -> Result<MigrationStatus, MigrationError> {
        initialize_state_table(executor)?;
        let applied = Self::query_applied_migrations(executor)?;
        self.plan(applied)
    }

    /// Compare the state table with the known migrations.
    pub fn plan(&self, applied: Vec<MigrationRecord>) -> Result<MigrationStatus, MigrationError> {
        for record in &applied {
            if !self.migrations.iter().any(|m| m.version == record.version) {
                return Err(MigrationError::UnknownMigration {
                    version: record.version,
                    name: record.name.clone(),
                });
            }
        }

        let mut pending = Vec::new();
        for migration in &self.migrations {
            let current = migration.checksum();
            match applied.iter().find(|r| r.version == migration.version) {
                Some(record) => {
                    validate_checksum(migration.version, migration.name, &record.checksum, &current)?
                }
                None => pending.push(PendingMigration {
                    version: migration.version,
                    name: migration.name.to_string(),
                    checksum: current,
                }),
            }
        }

        Ok(MigrationStatus::new(applied, pending))
    }

    /// Apply pending migrations, each in its own transaction.
    ///
    /// Returns the number applied. `steps` limits how many (all when `None`).
    pub fn up(&self, executor: &PgExecutor, steps: Option<usize>) -> Result<usize, MigrationError> {
        initialize_state_table(executor)?;
        let _lock = MigrationLockGuard::new(executor, Some(self.lock_timeout_secs))?;

        let status = self.status(executor)?;
        let take = steps.unwrap_or(status.pending_count);

        let mut applied = 0;
        for pending in status.pending.iter().take(take) {
            let Some(migration) = self.find(pending.version) else {
                continue;
            };
            let start = Instant::now();
            let tx = executor.begin()?;
            let outcome = Self::run_statements(&tx, migration, &migration.up_statements())
                .and_then(|_| {
                    let record = MigrationRecord::new(
                        migration.version,
                        migration.name.to_string(),
                        pending.checksum.clone(),
                        Utc::now(),
                        Some(start.elapsed().as_millis() as i64),
                        true,
                    );
                    Self::record_migration(&tx, &record)
                });
            Self::finish(tx, outcome)?;

            log::info!(
                "applied migration {} ({}) in {}ms",
                migration.version,
                migration.name,
                start.elapsed().as_millis()
            );
            applied += 1;
        }
        Ok(applied)
    }

    /// Roll back the newest `steps` applied migrations (one when `None`).
    pub fn down(&self, executor: &PgExecutor, steps: Option<usize>) -> Result<usize, MigrationError> {
        initialize_state_table(executor)?;
        let _lock = MigrationLockGuard::new(executor, Some(self.lock_timeout_secs))?;

        let mut applied = self.status(executor)?.applied;
        applied.sort_by_key(|m| std::cmp::Reverse(m.version));

        let mut rolled_back = 0;
        for record in applied.iter().take(steps.unwrap_or(1)) {
            let Some(migration) = self.find(record.version) else {
                continue;
            };
            let tx = executor.begin()?;
            let outcome = Self::run_statements(&tx, migration, &migration.down_statements())
                .and_then(|_| Self::remove_migration_record(&tx, record.version));
            Self::finish(tx, outcome)?;

            log::info!("rolled back migration {} ({})", migration.version, migration.name);
            rolled_back += 1;
        }
        Ok(rolled_back)
    }

    fn find(&self, version: i64) -> Option<&SchemaMigration> {
        self.migrations.iter().find(|m| m.version == version)
    }

    fn run_statements(
        tx: &Transaction,
        migration: &SchemaMigration,
        statements: &[String],
    ) -> Result<(), MigrationError> {
        for statement in statements {
            tx.execute(statement, &[])
                .map_err(|e| MigrationError::ExecutionFailed {
                    version: migration.version,
                    name: migration.name.to_string(),
                    error: e.to_string(),
                })?;
        }
        Ok(())
    }

    fn finish(tx: Transaction, outcome: Result<(), MigrationError>) -> Result<(), MigrationError> {
        match outcome {
            Ok(()) => Ok(tx.commit()?),
            Err(e) => {
                if let Err(rollback) = tx.rollback() {
                    log::error!("rollback after failed migration also failed: {rollback}");
                }
                Err(e)
            }
        }
    }

    /// Excludes the lock row (version = -1).
    fn query_applied_migrations(
        executor: &dyn Executor,
    ) -> Result<Vec<MigrationRecord>, MigrationError> {
        let rows = executor.query_all(
            &format!(
                "SELECT version, name, checksum, applied_at, execution_time_ms, success \
                 FROM {STATE_TABLE} WHERE version > 0 ORDER BY version ASC"
            ),
            &[],
        )?;
        rows.iter()
            .map(|row| MigrationRecord::from_row(row).map_err(MigrationError::from))
            .collect()
    }

    fn record_migration(executor: &dyn Executor, record: &MigrationRecord) -> Result<(), MigrationError> {
        executor.execute(
            &format!(
                "INSERT INTO {STATE_TABLE} (version, name, checksum, applied_at, execution_time_ms, success) \
                 VALUES ($1, $2, $3, $4, $5, $6)"
            ),
            &[
                &record.version,
                &record.name,
                &record.checksum,
                &record.applied_at,
                &record.execution_time_ms,
                &record.success,
            ],
        )?;
        Ok(())
    }

    fn remove_migration_record(executor: &dyn Executor, version: i64) -> Result<(), MigrationError> {
        executor.execute(
            &format!("DELETE FROM {STATE_TABLE} WHERE version = $1"),
            &[&version],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn none() -> Vec<String> {
        Vec::new()
    }

    fn one() -> Vec<String> {
        vec!["CREATE TABLE one (id INT)".to_string()]
    }

    fn two() -> Vec<String> {
        vec!["CREATE TABLE two (id INT)".to_string()]
    }

    fn migrator() -> Migrator {
        Migrator::with_migrations(vec![
            SchemaMigration::new(2, "two", two, none),
            SchemaMigration::new(1, "one", one, none),
        ])
    }

    fn applied(migration: &SchemaMigration, checksum: String) -> MigrationRecord {
        MigrationRecord::new(
            migration.version,
            migration.name.to_string(),
            checksum,
            Utc::now(),
            Some(3),
            true,
        )
    }

    #[test]
    fn test_plan_with_nothing_applied() {
        let status = migrator().plan(Vec::new()).unwrap();
        assert_eq!(status.pending_count, 2);
        assert_eq!(status.next_pending_version(), Some(1));
        assert_eq!(status.latest_applied_version(), None);
        assert!(!status.is_up_to_date());
    }

    #[test]
    fn test_plan_partially_applied() {
        let m = migrator();
        let first = m.migrations()[0];
        let status = m.plan(vec![applied(&first, first.checksum())]).unwrap();
        assert_eq!(status.applied_count, 1);
        assert_eq!(status.total, 2);
        assert_eq!(status.next_pending_version(), Some(2));
        assert_eq!(status.latest_applied_version(), Some(1));
    }

    #[test]
    fn test_plan_detects_edited_migration() {
        let m = migrator();
        let first = m.migrations()[0];
        let err = m
            .plan(vec![applied(&first, "0".repeat(64))])
            .unwrap_err();
        assert!(matches!(err, MigrationError::ChecksumMismatch { version: 1, .. }));
    }

    #[test]
    fn test_plan_rejects_unknown_applied_version() {
        let stray = SchemaMigration::new(99, "stray", none, none);
        let err = migrator()
            .plan(vec![applied(&stray, stray.checksum())])
            .unwrap_err();
        assert!(matches!(err, MigrationError::UnknownMigration { version: 99, .. }));
    }

    #[test]
    fn test_builtin_schema_is_up_to_date_once_applied() {
        let m = Migrator::new();
        let records = m
            .migrations()
            .iter()
            .map(|mig| applied(mig, mig.checksum()))
            .collect();
        assert!(m.plan(records).unwrap().is_up_to_date());
    }
}
