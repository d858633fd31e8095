//! Destructive schema maintenance.

use log::info;
use rusqlite::Connection;

use crate::errors::MigrationResult;
use crate::tracker::quote_ident;

/// User tables of the connected database, sorted by name.
pub fn list_tables(conn: &Connection) -> MigrationResult<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND substr(name, 1, 7) != 'sqlite_' ORDER BY name",
    )?;
    let tables = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(tables)
}

/// Drop every table, the tracking table included.
///
/// Foreign keys are disabled for the duration of the loop. If a drop fails
/// the loop stops, the error is returned and foreign keys stay disabled: the
/// database is left for manual recovery.
pub fn drop_schema(conn: &Connection) -> MigrationResult<Vec<String>> {
    let tables = list_tables(conn)?;

    conn.execute_batch("PRAGMA foreign_keys = OFF;")?;

    let mut dropped = Vec::with_capacity(tables.len());
    for table in tables {
        info!("Dropping table: {table}");
        conn.execute_batch(&format!("DROP TABLE {}", quote_ident(&table)))?;
        dropped.push(table);
    }

    conn.execute_batch("PRAGMA foreign_keys = ON;")?;

    info!("Dropping completed");
    Ok(dropped)
}
