//! # Caregate
//!
//! Coroutine-native scheduling core for hospitals on PostgreSQL, using the
//! `may` runtime.
//!
//! - [`availability`]: open appointment slots and bookable dates
//! - [`service`]: booking, the appointment lifecycle, bed occupancy,
//!   affiliations, profile change requests and the approval workflow
//! - [`store`]: the persistence contract, with PostgreSQL and in-memory stores
//! - [`migration`]: versioned schema migrations with checksums and a lock
//! - [`pool`]: bounded `may_postgres` session pool backing the PostgreSQL store
//!
//! ```no_run
//! use caregate::{CareService, MemoryStore, SystemClock};
//!
//! let service = CareService::new(MemoryStore::new(), SystemClock);
//! let slots = service.slots_for_date(uuid::Uuid::new_v4(), chrono::Utc::now().date_naive());
//! ```

pub mod availability;
pub mod clock;
pub mod config;
pub mod connection;
pub mod error;
pub mod executor;
pub mod guard;
pub mod metrics;
pub mod migration;
pub mod model;
pub mod pool;
pub mod service;
pub mod store;
pub mod transaction;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::CaregateConfig;
pub use error::{CareError, ErrorKind};
pub use executor::{DbError, Executor, PgExecutor};
pub use pool::{PgPool, PooledConnection};
pub use service::CareService;
pub use store::{CareStore, MemoryStore, PgStore, Repository};
