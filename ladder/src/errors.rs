use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type returned by the migration engine.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// A migration with the same id is already part of the collection.
    #[error("migration with id {id} already exists")]
    DuplicateMigration { id: String },

    /// Something other than a `Migration` or a `Migrator` was registered.
    #[error("unsupported migration type passed")]
    UnsupportedMigrationType,

    /// The forward procedure of a migration failed; the run was aborted.
    #[error("migration {id} failed: {source}")]
    Execution {
        id: String,
        #[source]
        source: anyhow::Error,
    },

    /// The initial schema procedure failed before any migration ran.
    #[error("initial schema migration failed: {source}")]
    InitialSchema {
        #[source]
        source: anyhow::Error,
    },

    /// The backward procedure of a migration failed.
    #[error("unable to rollback migration {id}: {source}")]
    Rollback {
        id: String,
        #[source]
        source: anyhow::Error,
    },

    /// Tracking table, transaction or schema operation failed.
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A migration file could not be turned into a migration.
    #[error("invalid migration file {}: {reason}", path.display())]
    InvalidMigrationFile { path: PathBuf, reason: String },
}

impl MigrationError {
    /// Id of the migration the error is about, when there is one.
    pub fn migration_id(&self) -> Option<&str> {
        match self {
            MigrationError::DuplicateMigration { id }
            | MigrationError::Execution { id, .. }
            | MigrationError::Rollback { id, .. } => Some(id),
            _ => None,
        }
    }
}

pub type MigrationResult<T> = Result<T, MigrationError>;
