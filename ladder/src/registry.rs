//! Registry that migrations are collected into before a runner is built.
//!
//! Two ways to feed it:
//! - explicitly, by calling [`MigrationRegistry::register`] with a
//!   [`Migration`] or a boxed [`Migrator`];
//! - at definition time, by submitting a [`MigrationDefinition`] through
//!   `inventory` anywhere in the linked program and snapshotting them with
//!   [`MigrationRegistry::from_definitions`].

use std::any::Any;

use rusqlite::Connection;

use crate::collection::MigrationCollection;
use crate::errors::{MigrationError, MigrationResult};
use crate::migration::{Migration, Migrator};

/// Value accepted by the registry, normalized into a [`Migration`] on entry.
pub enum Registration {
    Unit(Migration),
    Migrator(Box<dyn Migrator>),
}

impl Registration {
    pub fn into_migration(self) -> Migration {
        match self {
            Registration::Unit(migration) => migration,
            Registration::Migrator(migrator) => Migration::from_migrator(migrator),
        }
    }
}

impl From<Migration> for Registration {
    fn from(migration: Migration) -> Self {
        Registration::Unit(migration)
    }
}

impl From<Box<dyn Migrator>> for Registration {
    fn from(migrator: Box<dyn Migrator>) -> Self {
        Registration::Migrator(migrator)
    }
}

/// Statically declared migration, submitted with `inventory::submit!`.
///
/// ```rust,ignore
/// fn create_users(conn: &Connection) -> anyhow::Result<()> { /* ... */ }
/// fn drop_users(conn: &Connection) -> anyhow::Result<()> { /* ... */ }
///
/// ladder::inventory::submit! {
///     ladder::MigrationDefinition::new("20240101_create_users", create_users, drop_users)
/// }
/// ```
pub struct MigrationDefinition {
    pub id: &'static str,
    pub migrate: fn(&Connection) -> anyhow::Result<()>,
    pub rollback: fn(&Connection) -> anyhow::Result<()>,
}

impl MigrationDefinition {
    pub const fn new(
        id: &'static str,
        migrate: fn(&Connection) -> anyhow::Result<()>,
        rollback: fn(&Connection) -> anyhow::Result<()>,
    ) -> Self {
        Self { id, migrate, rollback }
    }

    pub fn to_migration(&self) -> Migration {
        Migration::new(self.id, self.migrate, self.rollback)
    }
}

inventory::collect!(MigrationDefinition);

/// All definitions submitted in the linked program. Order is unspecified.
pub fn submitted_definitions() -> impl Iterator<Item = &'static MigrationDefinition> {
    inventory::iter::<MigrationDefinition>()
}

/// Accumulates migrations for a runner.
#[derive(Debug, Default)]
pub struct MigrationRegistry {
    collection: MigrationCollection,
}

impl MigrationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot every submitted [`MigrationDefinition`].
    pub fn from_definitions() -> MigrationResult<Self> {
        let mut registry = Self::new();
        for definition in submitted_definitions() {
            registry.register(definition.to_migration())?;
        }
        Ok(registry)
    }

    pub fn register(&mut self, value: impl Into<Registration>) -> MigrationResult<()> {
        let migration = value.into().into_migration();
        self.collection.append(migration)
    }

    /// Register a migrator without boxing it first.
    pub fn register_migrator<M: Migrator>(&mut self, migrator: M) -> MigrationResult<()> {
        self.register(Box::new(migrator) as Box<dyn Migrator>)
    }

    /// Register a type-erased value. Accepts a boxed [`Migration`] or a boxed
    /// `Box<dyn Migrator>`; anything else is rejected.
    pub fn register_any(&mut self, value: Box<dyn Any + Send>) -> MigrationResult<()> {
        let value = match value.downcast::<Migration>() {
            Ok(migration) => return self.register(*migration),
            Err(value) => value,
        };

        match value.downcast::<Box<dyn Migrator>>() {
            Ok(migrator) => self.register(*migrator),
            Err(_) => Err(MigrationError::UnsupportedMigrationType),
        }
    }

    pub fn collection(&self) -> &MigrationCollection {
        &self.collection
    }

    pub fn len(&self) -> usize {
        self.collection.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collection.is_empty()
    }

    /// Hand the accumulated migrations over to a runner.
    pub fn export(self) -> MigrationCollection {
        self.collection
    }
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Registration::Unit(migration) => f.debug_tuple("Unit").field(migration).finish(),
            Registration::Migrator(migrator) => f.debug_tuple("Migrator").field(&migrator.identify()).finish(),
        }
    }
}
