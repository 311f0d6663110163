//! Migration state table management

use sea_query::{ColumnDef, Expr, Index, IndexCreateStatement, PostgresQueryBuilder, Table, TableCreateStatement};

use crate::executor::{DbError, Executor};

pub const STATE_TABLE: &str = "caregate_migrations";

/// `CREATE TABLE IF NOT EXISTS caregate_migrations (...)`
///
/// Version `-1` is reserved for the lock row (see [`crate::migration::lock`]).
pub fn create_state_table() -> TableCreateStatement {
    Table::create()
        .table(STATE_TABLE)
        .if_not_exists()
        .col(
            ColumnDef::new("version")
                .big_integer()
                .not_null()
                .primary_key(),
        )
        .col(ColumnDef::new("name").string_len(255).not_null())
        .col(ColumnDef::new("checksum").string_len(64).not_null())
        .col(ColumnDef::new("applied_at").timestamp_with_time_zone().not_null())
        .col(ColumnDef::new("execution_time_ms").big_integer().null())
        .col(ColumnDef::new("success").boolean().not_null().default(true))
        .to_owned()
}

pub fn create_state_table_index() -> IndexCreateStatement {
    Index::create()
        .if_not_exists()
        .name("idx_caregate_migrations_applied_at")
        .table(STATE_TABLE)
        .col(Expr::col("applied_at"))
        .to_owned()
}

/// Create the state table and its index if they don't exist.
pub fn initialize_state_table(executor: &dyn Executor) -> Result<(), DbError> {
    executor.execute(&create_state_table().build(PostgresQueryBuilder), &[])?;
    executor.execute(&create_state_table_index().build(PostgresQueryBuilder), &[])?;
    Ok(())
}
