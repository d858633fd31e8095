use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Subcommand;
use comfy_table::{Cell, Color as TableColor, Table};
use ladder::rusqlite::Connection;
use ladder::{
    ClearStats, MigrationRegistry, MigrationRunner, MigrationStats, discover_sql_migrations,
    schema, sql_procedure,
};
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;

use crate::context::ProjectContext;
use crate::examples::ExampleGroup;
use crate::output::{OutputManager, TableDisplay};
use crate::theme::ICONS;
use crate::utils::format_datetime;

pub const RUN_EXAMPLES: &[ExampleGroup] = &[
    ExampleGroup {
        title: "Apply Migrations",
        commands: &[
            "ladder run                              # Apply every pending migration",
            "ladder --database app.db run            # Target a specific database file",
            "ladder --output json run                # Print applied ids as JSON",
        ],
    },
    ExampleGroup {
        title: "Troubleshooting",
        commands: &["ladder -v run                           # Show discovered files and debug logs"],
    },
];

pub const CLEAR_EXAMPLES: &[ExampleGroup] = &[ExampleGroup {
    title: "Roll Back",
    commands: &[
        "ladder clear                            # Roll back every executed migration, newest first",
        "ladder --config ci/ladder.toml clear    # Use a different config file",
    ],
}];

pub const DROP_EXAMPLES: &[ExampleGroup] = &[ExampleGroup {
    title: "Reset",
    commands: &[
        "ladder drop --yes                       # Drop every table, including the migration log",
        "ladder drop --yes && ladder run         # Rebuild the schema from scratch",
    ],
}];

pub const STATUS_EXAMPLES: &[ExampleGroup] = &[ExampleGroup {
    title: "Inspect",
    commands: &[
        "ladder status                           # Show applied and pending migrations",
        "ladder --output compact status          # One line per migration",
    ],
}];

#[derive(Subcommand)]
pub enum MigrateCommands {
    /// Apply pending migrations in order
    #[command(name = "run")]
    Run,

    /// Roll back every executed migration, newest first
    #[command(name = "clear")]
    Clear,

    /// Drop every table in the database
    #[command(name = "drop")]
    Drop {
        /// Confirm that every table should be dropped
        #[arg(long)]
        yes: bool,
    },

    /// Show which migrations are applied and which are pending
    #[command(name = "status")]
    Status,
}

pub fn handle_migrate_commands(
    command: MigrateCommands,
    database: Option<&Path>,
    config: Option<&Path>,
    output: &OutputManager,
) -> Result<()> {
    let ctx = ProjectContext::load(config)?;
    if let Some(path) = &ctx.config_path {
        output.verbose(&format!("Using config {}", path.display()));
    }

    let database_path = ctx.database_path(database)?;
    output.verbose(&format!("Database: {}", database_path.display()));

    let mut conn = Connection::open(&database_path)
        .with_context(|| format!("Failed to open database {}", database_path.display()))?;

    match command {
        MigrateCommands::Run => handle_run(&ctx, &mut conn, output),
        MigrateCommands::Clear => handle_clear(&ctx, &mut conn, output),
        MigrateCommands::Drop { yes } => handle_drop(&conn, yes, output),
        MigrateCommands::Status => handle_status(&ctx, &mut conn, output),
    }
}

/// Build a runner over the SQL files in the migrations directory plus any
/// migrations linked into the binary.
fn build_runner<'c>(
    ctx: &ProjectContext,
    conn: &'c mut Connection,
    output: &OutputManager,
) -> Result<MigrationRunner<'c>> {
    let mut registry =
        MigrationRegistry::from_definitions().context("Failed to collect built-in migrations")?;

    let files = discover_sql_migrations(&ctx.migrations_dir).with_context(|| {
        format!("Failed to load migrations from {}", ctx.migrations_dir.display())
    })?;
    output.verbose(&format!(
        "Found {} migration file(s) in {}",
        files.len(),
        ctx.migrations_dir.display()
    ));
    for migration in files {
        registry.register(migration)?;
    }

    let mut runner = MigrationRunner::new(conn, ctx.runner_options(), registry)?;

    if let Some(path) = ctx.init_schema_path() {
        let sql = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read initial schema {}", path.display()))?;
        let init = sql_procedure(sql);
        runner.register_initial_schema(move |conn| init(conn));
        output.verbose(&format!("Initial schema: {}", path.display()));
    }

    Ok(runner)
}

fn handle_run(ctx: &ProjectContext, conn: &mut Connection, output: &OutputManager) -> Result<()> {
    output.heading("Apply Migrations");

    let mut runner = build_runner(ctx, conn, output)?;
    output.progress("Applying migrations");
    let stats = runner.migrate();
    output.clear_line();
    let stats = stats?;

    if stats.migrations_applied.is_empty() {
        output.info("Database is up to date");
        return Ok(());
    }

    output.display(&stats)?;
    output.success(&format!(
        "{} migration(s) applied in {} ms",
        stats.migrations_applied.len(),
        stats.total_time_ms
    ));
    Ok(())
}

fn handle_clear(ctx: &ProjectContext, conn: &mut Connection, output: &OutputManager) -> Result<()> {
    output.heading("Roll Back Migrations");

    let mut runner = build_runner(ctx, conn, output)?;
    output.progress("Rolling back migrations");
    let stats = runner.clear();
    output.clear_line();
    let stats = stats?;

    if stats.migrations_rolled_back.is_empty() {
        output.info("No executed migrations to roll back");
        return Ok(());
    }

    output.display(&stats)?;
    output.success(&format!(
        "{} migration(s) rolled back in {} ms",
        stats.migrations_rolled_back.len(),
        stats.total_time_ms
    ));
    Ok(())
}

fn handle_drop(conn: &Connection, confirmed: bool, output: &OutputManager) -> Result<()> {
    if !confirmed {
        output.warning("This drops every table in the database, including the migration log.");
        output.info("Re-run with --yes to confirm.");
        anyhow::bail!("Refusing to drop the schema without --yes");
    }

    output.heading("Drop Schema");
    let dropped_tables = schema::drop_schema(conn).context("Failed to drop schema")?;

    if dropped_tables.is_empty() {
        output.info("Database has no tables");
        return Ok(());
    }

    output.display(&DropReport { dropped_tables })?;
    output.success("Schema dropped");
    Ok(())
}

fn handle_status(ctx: &ProjectContext, conn: &mut Connection, output: &OutputManager) -> Result<()> {
    output.heading("Migration Status");

    let runner = build_runner(ctx, conn, output)?;
    let records = runner.tracker().executed_migrations(runner.connection())?;
    let mut executed: HashMap<String, Option<DateTime<Utc>>> = records
        .into_iter()
        .map(|record| (record.migration_id, record.executed_at))
        .collect();

    let migrations: Vec<MigrationStatus> = runner
        .pending_from("")
        .iter()
        .map(|migration| {
            let executed_at = executed.remove(migration.id());
            MigrationStatus {
                id: migration.id().to_string(),
                applied: executed_at.is_some(),
                executed_at: executed_at.flatten(),
            }
        })
        .collect();

    let mut unknown: Vec<String> = executed.into_keys().collect();
    unknown.sort();

    let report = StatusReport {
        table: runner.tracker().table_name().to_string(),
        migrations,
        unknown,
    };

    output.key_value("Migration table", &report.table);
    output.key_value(
        "Applied",
        &format!("{}/{}", report.applied_count(), report.migrations.len()),
    );
    output.display(&report)?;

    if !report.unknown.is_empty() {
        output.warning("Recorded migrations with no matching definition:");
        for id in &report.unknown {
            output.bullet(id);
        }
    }
    Ok(())
}

impl TableDisplay for MigrationStats {
    fn to_table(&self, output: &OutputManager) -> Table {
        let mut table = output.create_table(&["#", "Applied Migration"]);
        for (index, id) in self.migrations_applied.iter().enumerate() {
            table.add_row(vec![Cell::new(index + 1), Cell::new(id)]);
        }
        table
    }

    fn to_compact(&self) -> String {
        format!(
            "applied={} initial_schema={} time_ms={}",
            self.migrations_applied.join(","),
            self.initial_schema_applied,
            self.total_time_ms
        )
    }
}

impl TableDisplay for ClearStats {
    fn to_table(&self, output: &OutputManager) -> Table {
        let mut table = output.create_table(&["#", "Rolled Back Migration"]);
        for (index, id) in self.migrations_rolled_back.iter().enumerate() {
            table.add_row(vec![Cell::new(index + 1), Cell::new(id)]);
        }
        table
    }

    fn to_compact(&self) -> String {
        format!(
            "rolled_back={} time_ms={}",
            self.migrations_rolled_back.join(","),
            self.total_time_ms
        )
    }
}

#[derive(Serialize)]
struct DropReport {
    dropped_tables: Vec<String>,
}

impl TableDisplay for DropReport {
    fn to_table(&self, output: &OutputManager) -> Table {
        let mut table = output.create_table(&["Dropped Table"]);
        for name in &self.dropped_tables {
            table.add_row(vec![Cell::new(name)]);
        }
        table
    }

    fn to_compact(&self) -> String {
        format!("dropped={}", self.dropped_tables.join(","))
    }
}

#[derive(Debug, Serialize)]
struct MigrationStatus {
    id: String,
    applied: bool,
    executed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
struct StatusReport {
    table: String,
    migrations: Vec<MigrationStatus>,
    /// Recorded ids with no matching migration
    unknown: Vec<String>,
}

impl StatusReport {
    fn applied_count(&self) -> usize {
        self.migrations.iter().filter(|m| m.applied).count()
    }
}

impl TableDisplay for StatusReport {
    fn to_table(&self, output: &OutputManager) -> Table {
        let mut table = output.create_table(&["Migration", "State", "Executed At"]);
        for migration in &self.migrations {
            let (icon, label, color) = if migration.applied {
                (ICONS.applied, "applied", TableColor::Green)
            } else {
                (ICONS.pending, "pending", TableColor::Yellow)
            };
            let state = Cell::new(format!("{icon} {label}"));
            let state = if output.options.no_color {
                state
            } else {
                state.fg(color)
            };
            let executed_at = migration
                .executed_at
                .map(format_datetime)
                .unwrap_or_else(|| "-".to_string());

            table.add_row(vec![Cell::new(&migration.id), state, Cell::new(executed_at)]);
        }
        table
    }

    fn to_compact(&self) -> String {
        self.migrations
            .iter()
            .map(|m| format!("{} {}", m.id, if m.applied { "applied" } else { "pending" }))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
