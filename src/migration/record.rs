//! `MigrationRecord` - rows of the `caregate_migrations` state table

use chrono::{DateTime, Utc};

use crate::executor::DbError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationRecord {
    /// Migration version (timestamp: YYYYMMDDHHMMSS)
    pub version: i64,
    pub name: String,
    /// SHA-256 of the migration's `up` statements
    pub checksum: String,
    pub applied_at: DateTime<Utc>,
    /// `None` if not recorded
    pub execution_time_ms: Option<i64>,
    pub success: bool,
}

impl MigrationRecord {
    #[must_use]
    pub fn new(
        version: i64,
        name: String,
        checksum: String,
        applied_at: DateTime<Utc>,
        execution_time_ms: Option<i64>,
        success: bool,
    ) -> Self {
        Self {
            version,
            name,
            checksum,
            applied_at,
            execution_time_ms,
            success,
        }
    }

    /// Expected column order: `version`, `name`, `checksum`, `applied_at`,
    /// `execution_time_ms`, `success`.
    pub fn from_row(row: &may_postgres::Row) -> Result<Self, DbError> {
        let parse = |e: may_postgres::Error| DbError::ParseError(e.to_string());
        Ok(Self {
            version: row.try_get(0).map_err(parse)?,
            name: row.try_get(1).map_err(parse)?,
            checksum: row.try_get(2).map_err(parse)?,
            applied_at: row.try_get(3).map_err(parse)?,
            execution_time_ms: row.try_get(4).map_err(parse)?,
            success: row.try_get(5).map_err(parse)?,
        })
    }
}
