//! Ladder core library.
//!
//! Ordered, reversible schema migrations for SQLite. Migrations are
//! collected into a [`MigrationRegistry`], handed to a [`MigrationRunner`]
//! together with a borrowed connection, and applied one transaction at a
//! time while a [`MigrationTracker`] records what has run.
//!
//! ```rust,ignore
//! let mut registry = MigrationRegistry::new();
//! registry.register(Migration::new(
//!     "20240101_create_users",
//!     |conn| Ok(conn.execute_batch("CREATE TABLE users (id INTEGER PRIMARY KEY)")?),
//!     |conn| Ok(conn.execute_batch("DROP TABLE users")?),
//! ))?;
//!
//! let mut conn = Connection::open("app.db")?;
//! let mut runner = MigrationRunner::new(&mut conn, RunnerOptions::default(), registry)?;
//! runner.migrate()?;
//! ```

pub mod collection;
pub mod errors;
pub mod files;
pub mod migration;
pub mod registry;
pub mod runner;
pub mod schema;
pub mod tracker;

pub use collection::{MigrationCollection, ReadOnlyCollection, SortKey, SortOrder};
pub use errors::*;
pub use files::{discover_sql_migrations, load_sql_migration, sql_procedure};
pub use migration::{Migration, MigrationFn, Migrator};
pub use registry::{MigrationDefinition, MigrationRegistry, Registration};
pub use runner::{ClearStats, MigrationRunner, MigrationStats, RollbackAttempt, RunnerOptions};
pub use tracker::{DEFAULT_MIGRATION_TABLE, ExecutionRecord, MigrationTracker};

// Re-export rusqlite so migration authors use the same version as the runner
pub use rusqlite;

// Re-export inventory for definition-time registration of migrations
pub use inventory;
