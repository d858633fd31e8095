//! Execution log stored in a dedicated table of the target database.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};

use crate::errors::MigrationResult;

/// Default name of the tracking table.
pub const DEFAULT_MIGRATION_TABLE: &str = "_migrations";

/// One executed migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub migration_id: String,
    pub executed_at: Option<DateTime<Utc>>,
}

/// Reads and writes the tracking table. Owns the table, borrows the connection.
#[derive(Debug, Clone)]
pub struct MigrationTracker {
    table: String,
}

impl MigrationTracker {
    /// Create the tracker and make sure its table exists.
    pub fn new(conn: &Connection, table: impl Into<String>) -> MigrationResult<Self> {
        let tracker = Self { table: table.into() };
        tracker.ensure_table(conn)?;
        Ok(tracker)
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    pub fn ensure_table(&self, conn: &Connection) -> MigrationResult<()> {
        if !self.table_exists(conn)? {
            self.create_table(conn)?;
        }
        Ok(())
    }

    pub fn table_exists(&self, conn: &Connection) -> MigrationResult<bool> {
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
            params![self.table],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    fn create_table(&self, conn: &Connection) -> MigrationResult<()> {
        log::debug!("creating migration table {}", self.table);
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {} (
                migration_id TEXT PRIMARY KEY NOT NULL,
                executed_at TEXT DEFAULT CURRENT_TIMESTAMP
            )",
            quote_ident(&self.table)
        ))?;
        Ok(())
    }

    /// Most recently executed migration, if any.
    pub fn last_executed(&self, conn: &Connection) -> MigrationResult<Option<ExecutionRecord>> {
        let record = conn
            .query_row(
                &format!(
                    "SELECT migration_id, executed_at FROM {} ORDER BY executed_at DESC, rowid DESC LIMIT 1",
                    quote_ident(&self.table)
                ),
                [],
                |row| {
                    Ok(ExecutionRecord {
                        migration_id: row.get(0)?,
                        executed_at: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    /// All executed migrations, oldest first.
    pub fn executed_migrations(&self, conn: &Connection) -> MigrationResult<Vec<ExecutionRecord>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT migration_id, executed_at FROM {} ORDER BY executed_at ASC, rowid ASC",
            quote_ident(&self.table)
        ))?;

        let records = stmt
            .query_map([], |row| {
                Ok(ExecutionRecord {
                    migration_id: row.get(0)?,
                    executed_at: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(records)
    }

    pub fn add_migration(&self, conn: &Connection, id: &str) -> MigrationResult<()> {
        conn.execute(
            &format!(
                "INSERT INTO {} (migration_id, executed_at) VALUES (?1, ?2)",
                quote_ident(&self.table)
            ),
            params![id, Utc::now()],
        )?;
        Ok(())
    }

    pub fn remove_migration(&self, conn: &Connection, id: &str) -> MigrationResult<()> {
        conn.execute(
            &format!("DELETE FROM {} WHERE migration_id = ?1", quote_ident(&self.table)),
            params![id],
        )?;
        Ok(())
    }

    pub fn is_migration_executed(&self, conn: &Connection, id: &str) -> MigrationResult<bool> {
        let executed: bool = conn.query_row(
            &format!(
                "SELECT EXISTS(SELECT 1 FROM {} WHERE migration_id = ?1)",
                quote_ident(&self.table)
            ),
            params![id],
            |row| row.get(0),
        )?;
        Ok(executed)
    }

    /// Forget every executed migration without rolling anything back.
    pub fn clear_executed_migrations(&self, conn: &Connection) -> MigrationResult<()> {
        conn.execute(&format!("DELETE FROM {}", quote_ident(&self.table)), [])?;
        Ok(())
    }
}

/// Quote an SQLite identifier.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
