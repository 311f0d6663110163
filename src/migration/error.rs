//! Migration-specific error types

use crate::executor::DbError;
use crate::migration::STATE_TABLE;
use crate::transaction::TransactionError;

#[derive(Debug)]
pub enum MigrationError {
    /// Database execution error
    Database(DbError),
    /// An applied migration was edited afterwards
    ChecksumMismatch {
        version: i64,
        name: String,
        stored: String,
        current: String,
    },
    /// Migration lock timeout
    LockTimeout(String),
    /// Migration failed during execution
    ExecutionFailed {
        version: i64,
        name: String,
        error: String,
    },
    /// The database records a migration this build does not know
    UnknownMigration { version: i64, name: String },
}

impl std::fmt::Display for MigrationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MigrationError::Database(e) => write!(f, "Database error: {e}"),
            MigrationError::ChecksumMismatch {
                version,
                name,
                stored,
                current,
            } => write!(
                f,
                "Migration '{name}' (version {version}) has been modified after being applied.\n\
                 Stored checksum: {stored}\n\
                 Current checksum: {current}"
            ),
            MigrationError::LockTimeout(msg) => write!(
                f,
                "Migration lock timeout: {msg}\n\
                 Another process may be running migrations. If this persists, check for a \
                 stuck process or a stale lock row in {STATE_TABLE}"
            ),
            MigrationError::ExecutionFailed {
                version,
                name,
                error,
            } => write!(
                f,
                "Migration '{name}' (version {version}) failed during execution: {error}"
            ),
            MigrationError::UnknownMigration { version, name } => write!(
                f,
                "Applied migration '{name}' (version {version}) is not part of this build"
            ),
        }
    }
}

impl std::error::Error for MigrationError {}

impl From<DbError> for MigrationError {
    fn from(error: DbError) -> Self {
        MigrationError::Database(error)
    }
}

impl From<TransactionError> for MigrationError {
    fn from(error: TransactionError) -> Self {
        MigrationError::Database(error.into())
    }
}
