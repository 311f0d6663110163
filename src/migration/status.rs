//! Migration status tracking

use crate::migration::MigrationRecord;

#[derive(Debug, Clone)]
pub struct MigrationStatus {
    /// Applied migrations (from database)
    pub applied: Vec<MigrationRecord>,
    /// Built-in migrations not yet applied, oldest first
    pub pending: Vec<PendingMigration>,
    pub total: usize,
    pub applied_count: usize,
    pub pending_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMigration {
    pub version: i64,
    pub name: String,
    pub checksum: String,
}

impl MigrationStatus {
    #[must_use]
    pub fn new(applied: Vec<MigrationRecord>, pending: Vec<PendingMigration>) -> Self {
        let applied_count = applied.len();
        let pending_count = pending.len();
        Self {
            applied,
            pending,
            total: applied_count + pending_count,
            applied_count,
            pending_count,
        }
    }

    #[must_use]
    pub fn is_up_to_date(&self) -> bool {
        self.pending_count == 0
    }

    #[must_use]
    pub fn latest_applied_version(&self) -> Option<i64> {
        self.applied.iter().map(|m| m.version).max()
    }

    #[must_use]
    pub fn next_pending_version(&self) -> Option<i64> {
        self.pending.first().map(|m| m.version)
    }
}
