//! Migrations loaded from `.sql` files.
//!
//! Every `<id>.sql` file in a directory becomes one migration. The file is
//! split into two sections by marker comments:
//!
//! ```sql
//! -- up
//! CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT);
//!
//! -- down
//! DROP TABLE users;
//! ```
//!
//! Section bodies are handed to SQLite as-is.

use std::path::Path;
use std::sync::Arc;

use rusqlite::Connection;

use crate::errors::{MigrationError, MigrationResult};
use crate::migration::{Migration, MigrationFn};

/// Procedure executing `sql` as a batch. Empty SQL is a no-op.
pub fn sql_procedure(sql: impl Into<String>) -> MigrationFn {
    let sql = sql.into();
    Arc::new(move |conn: &Connection| {
        if sql.trim().is_empty() {
            log::debug!("empty SQL section, nothing to execute");
            return Ok(());
        }
        conn.execute_batch(&sql)?;
        Ok(())
    })
}

/// Discover migration files in `dir`, sorted by id.
///
/// A missing directory yields no migrations.
pub fn discover_sql_migrations(dir: &Path) -> MigrationResult<Vec<Migration>> {
    let mut migrations = Vec::new();

    if !dir.exists() {
        return Ok(migrations);
    }

    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();

        if !path.is_file() || path.extension().is_none_or(|ext| ext != "sql") {
            continue;
        }

        migrations.push(load_sql_migration(&path)?);
    }

    migrations.sort_by(|a, b| a.id().cmp(b.id()));
    Ok(migrations)
}

/// Load a single migration file; its id is the file stem.
pub fn load_sql_migration(path: &Path) -> MigrationResult<Migration> {
    let id = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .filter(|stem| !stem.is_empty())
        .ok_or_else(|| MigrationError::InvalidMigrationFile {
            path: path.to_path_buf(),
            reason: "file name is not a valid migration id".to_string(),
        })?
        .to_string();

    let content = std::fs::read_to_string(path)?;
    let (up, down) = split_sections(&content);

    if up.is_empty() {
        return Err(MigrationError::InvalidMigrationFile {
            path: path.to_path_buf(),
            reason: "missing '-- up' section".to_string(),
        });
    }

    Ok(Migration::from_fns(id, sql_procedure(up), sql_procedure(down)))
}

#[derive(Clone, Copy, PartialEq)]
enum Section {
    Preamble,
    Up,
    Down,
}

/// Split file content into its up and down SQL.
pub fn split_sections(content: &str) -> (String, String) {
    let mut up = Vec::new();
    let mut down = Vec::new();
    let mut section = Section::Preamble;

    for line in content.lines() {
        let trimmed = line.trim();

        if let Some(comment) = trimmed.strip_prefix("--") {
            match comment.trim().to_lowercase().as_str() {
                "up" => section = Section::Up,
                "down" => section = Section::Down,
                _ => {}
            }
            continue;
        }

        match section {
            Section::Up => up.push(line),
            Section::Down => down.push(line),
            Section::Preamble => {}
        }
    }

    (up.join("\n").trim().to_string(), down.join("\n").trim().to_string())
}
