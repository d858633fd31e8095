//! Ordered, duplicate-free collection of migrations.

use crate::errors::{MigrationError, MigrationResult};
use crate::migration::Migration;

/// Key a collection can be sorted by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    MigrationId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

/// Migrations in execution order. Ids are unique within a collection.
#[derive(Debug, Clone, Default)]
pub struct MigrationCollection {
    migrations: Vec<Migration>,
}

impl MigrationCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a collection, rejecting the first duplicated id.
    pub fn with_migrations(migrations: Vec<Migration>) -> MigrationResult<Self> {
        let mut collection = Self::new();
        for migration in migrations {
            collection.append(migration)?;
        }
        Ok(collection)
    }

    /// Append a migration at the end.
    ///
    /// Duplicate detection compares ids; procedures are not comparable.
    pub fn append(&mut self, migration: Migration) -> MigrationResult<()> {
        if self.contains(&migration) {
            return Err(MigrationError::DuplicateMigration {
                id: migration.id().to_string(),
            });
        }

        self.migrations.push(migration);
        Ok(())
    }

    pub fn contains(&self, migration: &Migration) -> bool {
        self.contains_id(migration.id())
    }

    pub fn contains_id(&self, id: &str) -> bool {
        self.migrations.iter().any(|m| m.id() == id)
    }

    pub fn get(&self, id: &str) -> Option<&Migration> {
        self.migrations.iter().find(|m| m.id() == id)
    }

    /// Migrations strictly after `id`, in current order.
    ///
    /// When `id` is not part of the collection the whole collection is
    /// returned unchanged.
    pub fn slice_from(&self, id: &str) -> MigrationCollection {
        match self.migrations.iter().position(|m| m.id() == id) {
            Some(index) => MigrationCollection {
                migrations: self.migrations[index + 1..].to_vec(),
            },
            None => self.clone(),
        }
    }

    /// Stable sort into a new collection.
    pub fn sort_by(&self, key: SortKey, order: SortOrder) -> MigrationCollection {
        let mut migrations = self.migrations.clone();
        match key {
            SortKey::MigrationId => match order {
                SortOrder::Asc => migrations.sort_by(|a, b| a.id().cmp(b.id())),
                SortOrder::Desc => migrations.sort_by(|a, b| b.id().cmp(a.id())),
            },
        }
        MigrationCollection { migrations }
    }

    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }

    pub fn list(&self) -> &[Migration] {
        &self.migrations
    }

    /// Swap the units at positions `a` and `b`.
    ///
    /// # Panics
    ///
    /// Panics if either position is out of bounds.
    pub fn swap(&mut self, a: usize, b: usize) {
        self.migrations.swap(a, b);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Migration> {
        self.migrations.iter()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.migrations.iter().map(Migration::id).collect()
    }

    pub fn read_only(&self) -> ReadOnlyCollection<'_> {
        ReadOnlyCollection {
            migrations: &self.migrations,
        }
    }
}

impl<'a> IntoIterator for &'a MigrationCollection {
    type Item = &'a Migration;
    type IntoIter = std::slice::Iter<'a, Migration>;

    fn into_iter(self) -> Self::IntoIter {
        self.migrations.iter()
    }
}

/// Read-only export of a collection.
#[derive(Debug, Clone, Copy)]
pub struct ReadOnlyCollection<'a> {
    migrations: &'a [Migration],
}

impl<'a> ReadOnlyCollection<'a> {
    pub fn list(&self) -> &'a [Migration] {
        self.migrations
    }

    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }
}
