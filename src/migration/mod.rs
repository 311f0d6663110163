//! Schema migrations for the caregate tables.
//!
//! Migrations are compiled into the crate (see [`schema::migrations`]) and
//! tracked in the `caregate_migrations` state table. Each applied migration
//! stores a SHA-256 checksum of its `up` statements, so an edited migration is
//! reported instead of silently diverging from the database.
//!
//! ```rust,no_run
//! use caregate::connection::connect;
//! use caregate::executor::PgExecutor;
//! use caregate::migration::Migrator;
//!
//! let executor = PgExecutor::new(connect("postgresql://localhost/caregate")?);
//! let applied = Migrator::new().up(&executor, None)?;
//! println!("applied {applied} migrations");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod checksum;
pub mod error;
pub mod lock;
pub mod migrator;
pub mod record;
pub mod schema;
pub mod state_table;
pub mod status;

pub use checksum::{calculate_checksum, validate_checksum};
pub use error::MigrationError;
pub use lock::MigrationLockGuard;
pub use migrator::Migrator;
pub use record::MigrationRecord;
pub use schema::SchemaMigration;
pub use state_table::{initialize_state_table, STATE_TABLE};
pub use status::{MigrationStatus, PendingMigration};
