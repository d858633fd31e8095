//! Migration runner: applies, clears and drops migrations.

use std::sync::Arc;
use std::time::Instant;

use log::{debug, error, info, warn};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::collection::{MigrationCollection, SortKey, SortOrder};
use crate::errors::{MigrationError, MigrationResult};
use crate::migration::{Migration, MigrationFn};
use crate::registry::MigrationRegistry;
use crate::schema;
use crate::tracker::{DEFAULT_MIGRATION_TABLE, MigrationTracker};

/// Runner settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerOptions {
    /// Table executed migrations are recorded in.
    pub migration_table: String,
    /// Run the initial schema procedure when nothing has been executed yet.
    pub run_init_schema: bool,
    /// Log every SQL statement at debug level.
    pub debug_mode: bool,
    /// Sort migrations by id before running, overriding registration order.
    pub sort_by_id: bool,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            migration_table: DEFAULT_MIGRATION_TABLE.to_string(),
            run_init_schema: true,
            debug_mode: false,
            sort_by_id: true,
        }
    }
}

/// Statistics from a migration run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MigrationStats {
    /// Ids applied during this run, in order
    pub migrations_applied: Vec<String>,
    /// Whether the initial schema procedure ran
    pub initial_schema_applied: bool,
    /// Total execution time in milliseconds
    pub total_time_ms: u64,
}

/// Statistics from a clear.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ClearStats {
    /// Ids rolled back, in order
    pub migrations_rolled_back: Vec<String>,
    /// Total execution time in milliseconds
    pub total_time_ms: u64,
}

/// Outcome of the automatic rollback attempted after a failed migration.
#[derive(Debug)]
pub enum RollbackAttempt {
    Succeeded,
    Failed(anyhow::Error),
}

/// Runs a collection of migrations against a borrowed connection.
pub struct MigrationRunner<'c> {
    conn: &'c mut Connection,
    options: RunnerOptions,
    initial_schema: Option<MigrationFn>,
    migrations: MigrationCollection,
    tracker: MigrationTracker,
}

impl<'c> MigrationRunner<'c> {
    /// Runner over everything accumulated in `registry`.
    pub fn new(
        conn: &'c mut Connection,
        options: RunnerOptions,
        registry: MigrationRegistry,
    ) -> MigrationResult<Self> {
        Self::with_collection(conn, options, registry.export())
    }

    /// Runner over an explicit list of migrations.
    pub fn with_migrations(
        conn: &'c mut Connection,
        options: RunnerOptions,
        migrations: Vec<Migration>,
    ) -> MigrationResult<Self> {
        let collection = MigrationCollection::with_migrations(migrations)?;
        Self::with_collection(conn, options, collection)
    }

    fn with_collection(
        conn: &'c mut Connection,
        options: RunnerOptions,
        migrations: MigrationCollection,
    ) -> MigrationResult<Self> {
        if options.debug_mode {
            conn.trace(Some(trace_statement));
        }

        let tracker = MigrationTracker::new(conn, options.migration_table.clone())?;

        Ok(Self {
            conn,
            options,
            initial_schema: None,
            migrations,
            tracker,
        })
    }

    pub fn add_migration(&mut self, migration: Migration) -> MigrationResult<()> {
        self.migrations.append(migration)
    }

    /// Procedure run on the first migration when nothing was executed before.
    pub fn register_initial_schema<F>(&mut self, init: F)
    where
        F: Fn(&Connection) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.initial_schema = Some(Arc::new(init));
    }

    pub fn options(&self) -> &RunnerOptions {
        &self.options
    }

    pub fn migrations(&self) -> &MigrationCollection {
        &self.migrations
    }

    pub fn tracker(&self) -> &MigrationTracker {
        &self.tracker
    }

    pub fn connection(&self) -> &Connection {
        self.conn
    }

    /// Run every migration after the last executed one.
    ///
    /// When nothing was executed yet and an initial schema procedure is
    /// registered, it runs first (unless disabled in the options).
    pub fn migrate(&mut self) -> MigrationResult<MigrationStats> {
        let start_time = Instant::now();

        self.tracker.ensure_table(self.conn)?;
        let last = self.tracker.last_executed(self.conn)?;

        let mut initial_schema_applied = false;
        if last.is_none() && self.options.run_init_schema {
            if let Some(init) = self.initial_schema.clone() {
                self.run_initial_schema(&init)?;
                initial_schema_applied = true;
            }
        }

        let after = last.map(|record| record.migration_id).unwrap_or_default();
        let mut stats = self.migrate_from(&after)?;
        stats.initial_schema_applied = initial_schema_applied;
        stats.total_time_ms = start_time.elapsed().as_millis() as u64;
        Ok(stats)
    }

    /// Run migrations after `id` (exclusive). An empty id runs everything.
    pub fn migrate_from(&mut self, id: &str) -> MigrationResult<MigrationStats> {
        let start_time = Instant::now();
        let pending = self.pending_from(id);

        if pending.is_empty() {
            info!("No migrations to execute");
        }

        let mut stats = MigrationStats::default();
        for migration in &pending {
            info!("Running migration with ID {}", migration.id());

            let tx = self.conn.transaction()?;

            if let Err(err) = migration.run_migrate(&tx) {
                error!("Error occured when migration {} run [{err:#}]", migration.id());
                attempt_rollback(&tx, migration);
                drop(tx);

                return Err(MigrationError::Execution {
                    id: migration.id().to_string(),
                    source: err,
                });
            }

            self.tracker.add_migration(&tx, migration.id())?;
            tx.commit()?;

            stats.migrations_applied.push(migration.id().to_string());
        }

        if !pending.is_empty() {
            info!("{} migrations executed", pending.len());
        }

        stats.total_time_ms = start_time.elapsed().as_millis() as u64;
        Ok(stats)
    }

    /// Roll back every executed migration, newest id first, removing its record.
    ///
    /// Stops at the first failing rollback; migrations rolled back before it
    /// stay rolled back.
    pub fn clear(&mut self) -> MigrationResult<ClearStats> {
        let start_time = Instant::now();

        self.tracker.ensure_table(self.conn)?;
        let executed = self.executed_collection()?;

        let mut stats = ClearStats::default();
        for migration in executed.sort_by(SortKey::MigrationId, SortOrder::Desc).iter() {
            info!("Rolling back migration with ID {}", migration.id());

            let tx = self.conn.transaction()?;
            if let Err(err) = migration.run_rollback(&tx) {
                error!("Unable to rollback migration {} [{err:#}]", migration.id());
                return Err(MigrationError::Rollback {
                    id: migration.id().to_string(),
                    source: err,
                });
            }

            self.tracker.remove_migration(&tx, migration.id())?;
            tx.commit()?;

            stats.migrations_rolled_back.push(migration.id().to_string());
        }

        stats.total_time_ms = start_time.elapsed().as_millis() as u64;
        Ok(stats)
    }

    /// Drop every table of the database, the tracking table included.
    pub fn drop_schema(&mut self) -> MigrationResult<Vec<String>> {
        schema::drop_schema(self.conn)
    }

    /// Migrations that would run after `id`, in execution order.
    pub fn pending_from(&self, id: &str) -> MigrationCollection {
        let working = if self.options.sort_by_id {
            self.migrations.sort_by(SortKey::MigrationId, SortOrder::Asc)
        } else {
            self.migrations.clone()
        };

        if id.is_empty() {
            working
        } else {
            working.slice_from(id)
        }
    }

    /// Migrations of the collection that are recorded as executed.
    fn executed_collection(&self) -> MigrationResult<MigrationCollection> {
        let mut executed = MigrationCollection::new();
        for record in self.tracker.executed_migrations(self.conn)? {
            match self.migrations.get(&record.migration_id) {
                Some(migration) => executed.append(migration.clone())?,
                None => warn!(
                    "Executed migration {} is not registered, leaving its record in place",
                    record.migration_id
                ),
            }
        }
        Ok(executed)
    }

    fn run_initial_schema(&mut self, init: &MigrationFn) -> MigrationResult<()> {
        info!("Running initial schema migration");

        let tx = self.conn.transaction()?;
        if let Err(err) = init(&tx) {
            error!("Initial schema migration failed [{err:#}]");
            return Err(MigrationError::InitialSchema { source: err });
        }
        tx.commit()?;
        Ok(())
    }
}

/// Best-effort rollback after a failed forward procedure. A failure here is
/// logged and never replaces the original error.
pub fn attempt_rollback(conn: &Connection, migration: &Migration) -> RollbackAttempt {
    info!("Rollbacking {}", migration.id());
    match migration.run_rollback(conn) {
        Ok(()) => RollbackAttempt::Succeeded,
        Err(err) => {
            warn!("Rollback of {} failed [{err:#}]", migration.id());
            RollbackAttempt::Failed(err)
        }
    }
}

fn trace_statement(sql: &str) {
    debug!(target: "ladder::sql", "{sql}");
}
