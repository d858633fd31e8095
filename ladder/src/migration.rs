//! Migration units and the capability trait migration authors implement.

use std::fmt;
use std::sync::Arc;

use rusqlite::Connection;

/// Procedure run against the database. Transactions deref to `Connection`,
/// so the same procedure works inside and outside of one.
pub type MigrationFn = Arc<dyn Fn(&Connection) -> anyhow::Result<()> + Send + Sync>;

/// Capability object for migrations defined as their own types.
///
/// ```rust,ignore
/// struct CreateUsers;
///
/// impl Migrator for CreateUsers {
///     fn identify(&self) -> String {
///         "20240101_create_users".into()
///     }
///
///     fn migrate(&self, conn: &Connection) -> anyhow::Result<()> {
///         conn.execute_batch("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)")?;
///         Ok(())
///     }
///
///     fn rollback(&self, conn: &Connection) -> anyhow::Result<()> {
///         conn.execute_batch("DROP TABLE users")?;
///         Ok(())
///     }
/// }
/// ```
pub trait Migrator: Send + Sync + 'static {
    /// Unique id of the migration, also its sort key.
    fn identify(&self) -> String;

    /// Apply the migration.
    fn migrate(&self, conn: &Connection) -> anyhow::Result<()>;

    /// Revert the migration.
    fn rollback(&self, conn: &Connection) -> anyhow::Result<()>;
}

/// Single migration: an id plus a forward and a backward procedure.
///
/// Equality is by id only; procedures cannot be compared.
#[derive(Clone)]
pub struct Migration {
    id: String,
    migrate: MigrationFn,
    rollback: MigrationFn,
}

impl Migration {
    pub fn new<M, R>(id: impl Into<String>, migrate: M, rollback: R) -> Self
    where
        M: Fn(&Connection) -> anyhow::Result<()> + Send + Sync + 'static,
        R: Fn(&Connection) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            id: id.into(),
            migrate: Arc::new(migrate),
            rollback: Arc::new(rollback),
        }
    }

    /// Build a migration from procedures that are already shared.
    pub fn from_fns(id: impl Into<String>, migrate: MigrationFn, rollback: MigrationFn) -> Self {
        Self {
            id: id.into(),
            migrate,
            rollback,
        }
    }

    /// Adapt a capability object into a plain migration.
    pub fn from_migrator(migrator: Box<dyn Migrator>) -> Self {
        let migrator: Arc<dyn Migrator> = Arc::from(migrator);
        let id = migrator.identify();
        let forward = Arc::clone(&migrator);
        Self {
            id,
            migrate: Arc::new(move |conn: &Connection| forward.migrate(conn)),
            rollback: Arc::new(move |conn: &Connection| migrator.rollback(conn)),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn run_migrate(&self, conn: &Connection) -> anyhow::Result<()> {
        (self.migrate)(conn)
    }

    pub fn run_rollback(&self, conn: &Connection) -> anyhow::Result<()> {
        (self.rollback)(conn)
    }
}

impl fmt::Debug for Migration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Migration").field("id", &self.id).finish_non_exhaustive()
    }
}

impl PartialEq for Migration {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Migration {}
