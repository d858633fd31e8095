use std::sync::{Arc, Mutex};

use ladder::rusqlite::Connection;
use ladder::{
    Migration, MigrationError, MigrationRegistry, MigrationRunner, MigrationTracker, Migrator,
    RunnerOptions, schema,
};

type Log = Arc<Mutex<Vec<String>>>;

/// Migration creating table `t_<id>`, recording every call in `log`.
fn table_migration(id: &str, log: &Log) -> Migration {
    let up_log = Arc::clone(log);
    let down_log = Arc::clone(log);
    let up_id = id.to_string();
    let down_id = id.to_string();

    Migration::new(
        id,
        move |conn| {
            up_log.lock().unwrap().push(format!("up:{up_id}"));
            conn.execute_batch(&format!("CREATE TABLE t_{up_id} (id INTEGER PRIMARY KEY)"))?;
            Ok(())
        },
        move |conn| {
            down_log.lock().unwrap().push(format!("down:{down_id}"));
            conn.execute_batch(&format!("DROP TABLE t_{down_id}"))?;
            Ok(())
        },
    )
}

fn failing_migration(id: &str, log: &Log) -> Migration {
    let up_log = Arc::clone(log);
    let down_log = Arc::clone(log);
    let up_id = id.to_string();
    let down_id = id.to_string();

    Migration::new(
        id,
        move |_| {
            up_log.lock().unwrap().push(format!("up:{up_id}"));
            anyhow::bail!("forward procedure of {up_id} exploded")
        },
        move |_| {
            down_log.lock().unwrap().push(format!("down:{down_id}"));
            Ok(())
        },
    )
}

fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

fn executed_ids(conn: &Connection) -> Vec<String> {
    let tracker = MigrationTracker::new(conn, "_migrations").unwrap();
    tracker
        .executed_migrations(conn)
        .unwrap()
        .into_iter()
        .map(|r| r.migration_id)
        .collect()
}

fn table_exists(conn: &Connection, name: &str) -> bool {
    schema::list_tables(conn).unwrap().iter().any(|t| t == name)
}

#[test]
fn migrate_applies_everything_in_order() {
    let mut conn = Connection::open_in_memory().unwrap();
    let log = Log::default();

    let mut registry = MigrationRegistry::new();
    for id in ["a", "b", "c"] {
        registry.register(table_migration(id, &log)).unwrap();
    }

    let mut runner = MigrationRunner::new(&mut conn, RunnerOptions::default(), registry).unwrap();
    let stats = runner.migrate().unwrap();

    assert_eq!(stats.migrations_applied, vec!["a", "b", "c"]);
    assert!(!stats.initial_schema_applied);
    assert_eq!(entries(&log), vec!["up:a", "up:b", "up:c"]);

    drop(runner);
    assert_eq!(executed_ids(&conn), vec!["a", "b", "c"]);
    assert!(table_exists(&conn, "t_c"));
}

#[test]
fn migrate_is_idempotent() {
    let mut conn = Connection::open_in_memory().unwrap();
    let log = Log::default();

    let mut runner = MigrationRunner::with_migrations(
        &mut conn,
        RunnerOptions::default(),
        vec![table_migration("a", &log), table_migration("b", &log)],
    )
    .unwrap();

    runner.migrate().unwrap();
    let second = runner.migrate().unwrap();

    assert!(second.migrations_applied.is_empty());
    assert_eq!(entries(&log), vec!["up:a", "up:b"]);
}

#[test]
fn migrate_resumes_after_last_executed() {
    let mut conn = Connection::open_in_memory().unwrap();
    {
        let tracker = MigrationTracker::new(&conn, "_migrations").unwrap();
        tracker.add_migration(&conn, "a").unwrap();
        tracker.add_migration(&conn, "b").unwrap();
    }

    let log = Log::default();
    let mut runner = MigrationRunner::with_migrations(
        &mut conn,
        RunnerOptions::default(),
        vec![
            table_migration("a", &log),
            table_migration("b", &log),
            table_migration("c", &log),
        ],
    )
    .unwrap();

    let stats = runner.migrate().unwrap();
    assert_eq!(stats.migrations_applied, vec!["c"]);
    assert_eq!(entries(&log), vec!["up:c"]);
}

#[test]
fn migrate_sorts_by_id_by_default() {
    let mut conn = Connection::open_in_memory().unwrap();
    let log = Log::default();

    let mut runner = MigrationRunner::with_migrations(
        &mut conn,
        RunnerOptions::default(),
        vec![
            table_migration("0003", &log),
            table_migration("0001", &log),
            table_migration("0002", &log),
        ],
    )
    .unwrap();

    runner.migrate().unwrap();
    assert_eq!(entries(&log), vec!["up:0001", "up:0002", "up:0003"]);
}

#[test]
fn migrate_keeps_registration_order_when_sorting_is_disabled() {
    let mut conn = Connection::open_in_memory().unwrap();
    let log = Log::default();
    let options = RunnerOptions {
        sort_by_id: false,
        ..Default::default()
    };

    let mut runner = MigrationRunner::with_migrations(
        &mut conn,
        options,
        vec![table_migration("0002", &log), table_migration("0001", &log)],
    )
    .unwrap();

    runner.migrate().unwrap();
    assert_eq!(entries(&log), vec!["up:0002", "up:0001"]);
}

#[test]
fn failing_migration_aborts_and_rolls_back_once() {
    let mut conn = Connection::open_in_memory().unwrap();
    let log = Log::default();

    let mut runner = MigrationRunner::with_migrations(
        &mut conn,
        RunnerOptions::default(),
        vec![
            table_migration("a", &log),
            failing_migration("b", &log),
            table_migration("c", &log),
        ],
    )
    .unwrap();

    let err = runner.migrate().unwrap_err();
    match &err {
        MigrationError::Execution { id, source } => {
            assert_eq!(id, "b");
            assert_eq!(source.to_string(), "forward procedure of b exploded");
        }
        other => panic!("unexpected error: {other}"),
    }

    assert_eq!(entries(&log), vec!["up:a", "up:b", "down:b"]);

    drop(runner);
    assert_eq!(executed_ids(&conn), vec!["a"]);
    assert!(table_exists(&conn, "t_a"));
    assert!(!table_exists(&conn, "t_c"));
}

#[test]
fn failing_rollback_does_not_mask_the_original_error() {
    let mut conn = Connection::open_in_memory().unwrap();
    let broken = Migration::new(
        "a",
        |_| anyhow::bail!("forward failed"),
        |_| anyhow::bail!("rollback failed too"),
    );

    let mut runner =
        MigrationRunner::with_migrations(&mut conn, RunnerOptions::default(), vec![broken]).unwrap();

    let err = runner.migrate().unwrap_err();
    assert!(matches!(err, MigrationError::Execution { ref id, .. } if id == "a"));
    assert!(err.to_string().contains("forward failed"));
}

#[test]
fn partial_effects_of_a_failed_migration_are_discarded() {
    let mut conn = Connection::open_in_memory().unwrap();
    let half_done = Migration::new(
        "a",
        |conn| {
            conn.execute_batch("CREATE TABLE half (id INTEGER)")?;
            anyhow::bail!("second statement failed")
        },
        |_| Ok(()),
    );

    let mut runner =
        MigrationRunner::with_migrations(&mut conn, RunnerOptions::default(), vec![half_done]).unwrap();
    assert!(runner.migrate().is_err());

    drop(runner);
    assert!(!table_exists(&conn, "half"));
    assert!(executed_ids(&conn).is_empty());
}

#[test]
fn initial_schema_runs_only_on_first_migration() {
    let mut conn = Connection::open_in_memory().unwrap();
    let log = Log::default();
    let init_log = Arc::clone(&log);

    let mut runner = MigrationRunner::with_migrations(
        &mut conn,
        RunnerOptions::default(),
        vec![table_migration("a", &log)],
    )
    .unwrap();
    runner.register_initial_schema(move |conn| {
        init_log.lock().unwrap().push("init".to_string());
        conn.execute_batch("CREATE TABLE base (id INTEGER PRIMARY KEY)")?;
        Ok(())
    });

    let stats = runner.migrate().unwrap();
    assert!(stats.initial_schema_applied);

    runner.add_migration(table_migration("b", &log)).unwrap();
    let stats = runner.migrate().unwrap();
    assert!(!stats.initial_schema_applied);

    assert_eq!(entries(&log), vec!["init", "up:a", "up:b"]);
    assert!(table_exists(runner.connection(), "base"));
}

#[test]
fn initial_schema_can_be_disabled() {
    let mut conn = Connection::open_in_memory().unwrap();
    let log = Log::default();
    let init_log = Arc::clone(&log);
    let options = RunnerOptions {
        run_init_schema: false,
        ..Default::default()
    };

    let mut runner =
        MigrationRunner::with_migrations(&mut conn, options, vec![table_migration("a", &log)]).unwrap();
    runner.register_initial_schema(move |_| {
        init_log.lock().unwrap().push("init".to_string());
        Ok(())
    });

    runner.migrate().unwrap();
    assert_eq!(entries(&log), vec!["up:a"]);
}

#[test]
fn failing_initial_schema_runs_nothing() {
    let mut conn = Connection::open_in_memory().unwrap();
    let log = Log::default();

    let mut runner = MigrationRunner::with_migrations(
        &mut conn,
        RunnerOptions::default(),
        vec![table_migration("a", &log)],
    )
    .unwrap();
    runner.register_initial_schema(|_| anyhow::bail!("bad schema"));

    let err = runner.migrate().unwrap_err();
    assert!(matches!(err, MigrationError::InitialSchema { .. }));
    assert!(entries(&log).is_empty());
}

#[test]
fn clear_rolls_back_in_descending_order() {
    let mut conn = Connection::open_in_memory().unwrap();
    let log = Log::default();

    let mut runner = MigrationRunner::with_migrations(
        &mut conn,
        RunnerOptions::default(),
        vec![table_migration("a", &log), table_migration("b", &log)],
    )
    .unwrap();
    runner.migrate().unwrap();

    let stats = runner.clear().unwrap();
    assert_eq!(stats.migrations_rolled_back, vec!["b", "a"]);
    assert_eq!(entries(&log), vec!["up:a", "up:b", "down:b", "down:a"]);

    drop(runner);
    assert!(executed_ids(&conn).is_empty());
    assert!(!table_exists(&conn, "t_a"));
}

#[test]
fn clear_stops_at_the_first_failing_rollback() {
    let mut conn = Connection::open_in_memory().unwrap();
    let log = Log::default();
    let down_log = Arc::clone(&log);

    let stubborn = Migration::new(
        "a",
        |_| Ok(()),
        move |_| {
            down_log.lock().unwrap().push("down:a".to_string());
            anyhow::bail!("cannot undo a")
        },
    );

    let mut runner = MigrationRunner::with_migrations(
        &mut conn,
        RunnerOptions::default(),
        vec![stubborn, table_migration("b", &log)],
    )
    .unwrap();
    runner.migrate().unwrap();

    let err = runner.clear().unwrap_err();
    assert!(matches!(err, MigrationError::Rollback { ref id, .. } if id == "a"));
    assert_eq!(entries(&log), vec!["up:b", "down:b", "down:a"]);

    drop(runner);
    assert_eq!(executed_ids(&conn), vec!["a"]);
}

/// Only executed migrations are rolled back; the pending tail is left alone.
#[test]
fn clear_ignores_migrations_that_never_ran() {
    let mut conn = Connection::open_in_memory().unwrap();
    let log = Log::default();

    let mut runner = MigrationRunner::with_migrations(
        &mut conn,
        RunnerOptions::default(),
        vec![table_migration("a", &log), table_migration("b", &log)],
    )
    .unwrap();
    runner.migrate_from("").unwrap();
    runner.add_migration(table_migration("c", &log)).unwrap();

    let stats = runner.clear().unwrap();
    assert_eq!(stats.migrations_rolled_back, vec!["b", "a"]);
    assert!(!entries(&log).contains(&"down:c".to_string()));
}

#[test]
fn clear_leaves_unknown_records_in_place() {
    let mut conn = Connection::open_in_memory().unwrap();
    {
        let tracker = MigrationTracker::new(&conn, "_migrations").unwrap();
        tracker.add_migration(&conn, "removed_from_code").unwrap();
    }

    let log = Log::default();
    let mut runner = MigrationRunner::with_migrations(
        &mut conn,
        RunnerOptions::default(),
        vec![table_migration("a", &log)],
    )
    .unwrap();

    let stats = runner.clear().unwrap();
    assert!(stats.migrations_rolled_back.is_empty());

    drop(runner);
    assert_eq!(executed_ids(&conn), vec!["removed_from_code"]);
}

#[test]
fn drop_schema_removes_every_table() {
    let mut conn = Connection::open_in_memory().unwrap();
    let log = Log::default();

    let mut runner = MigrationRunner::with_migrations(
        &mut conn,
        RunnerOptions::default(),
        vec![table_migration("a", &log), table_migration("b", &log)],
    )
    .unwrap();
    runner.migrate().unwrap();

    let dropped = runner.drop_schema().unwrap();
    assert_eq!(dropped, vec!["_migrations", "t_a", "t_b"]);

    // the runner recreates its table and starts over
    let stats = runner.migrate().unwrap();
    assert_eq!(stats.migrations_applied, vec!["a", "b"]);
}

#[test]
fn custom_tracking_table() {
    let mut conn = Connection::open_in_memory().unwrap();
    let log = Log::default();
    let options = RunnerOptions {
        migration_table: "schema_history".to_string(),
        ..Default::default()
    };

    let mut runner =
        MigrationRunner::with_migrations(&mut conn, options, vec![table_migration("a", &log)]).unwrap();
    runner.migrate().unwrap();

    drop(runner);
    assert!(table_exists(&conn, "schema_history"));
    assert!(!table_exists(&conn, "_migrations"));
}

struct SeedSettings;

impl Migrator for SeedSettings {
    fn identify(&self) -> String {
        "0001_settings".to_string()
    }

    fn migrate(&self, conn: &Connection) -> anyhow::Result<()> {
        conn.execute_batch(
            "CREATE TABLE settings (key TEXT PRIMARY KEY, value TEXT);
             INSERT INTO settings VALUES ('theme', 'dark');",
        )?;
        Ok(())
    }

    fn rollback(&self, conn: &Connection) -> anyhow::Result<()> {
        conn.execute_batch("DROP TABLE settings")?;
        Ok(())
    }
}

#[test]
fn migrator_objects_run_like_plain_units() {
    let mut conn = Connection::open_in_memory().unwrap();
    let mut registry = MigrationRegistry::new();
    registry.register_migrator(SeedSettings).unwrap();

    let mut runner = MigrationRunner::new(&mut conn, RunnerOptions::default(), registry).unwrap();
    runner.migrate().unwrap();

    let theme: String = runner
        .connection()
        .query_row("SELECT value FROM settings WHERE key = 'theme'", [], |row| row.get(0))
        .unwrap();
    assert_eq!(theme, "dark");

    runner.clear().unwrap();
    assert!(!table_exists(runner.connection(), "settings"));
}

#[test]
fn bookkeeping_failure_aborts_and_discards_the_migration() {
    let mut conn = Connection::open_in_memory().unwrap();
    let log = Log::default();

    let up_log = Arc::clone(&log);
    let sabotage = Migration::new(
        "b",
        move |conn| {
            up_log.lock().unwrap().push("up:b".to_string());
            conn.execute_batch("CREATE TABLE t_b (id INTEGER PRIMARY KEY); DROP TABLE _migrations;")?;
            Ok(())
        },
        |_| Ok(()),
    );

    let mut runner = MigrationRunner::with_migrations(
        &mut conn,
        RunnerOptions::default(),
        vec![table_migration("a", &log), sabotage, table_migration("c", &log)],
    )
    .unwrap();

    let err = runner.migrate().unwrap_err();
    assert!(matches!(err, MigrationError::Storage(_)));
    assert_eq!(entries(&log), vec!["up:a", "up:b"]);

    let conn = runner.connection();
    assert_eq!(executed_ids(conn), vec!["a"]);
    assert!(table_exists(conn, "t_a"));
    assert!(!table_exists(conn, "t_b"));
    assert!(!table_exists(conn, "t_c"));
}

#[test]
fn clear_after_drop_schema_rolls_back_nothing() {
    let mut conn = Connection::open_in_memory().unwrap();
    let log = Log::default();

    let mut runner = MigrationRunner::with_migrations(
        &mut conn,
        RunnerOptions::default(),
        vec![table_migration("a", &log), table_migration("b", &log)],
    )
    .unwrap();
    runner.migrate().unwrap();
    runner.drop_schema().unwrap();

    let cleared = runner.clear().unwrap();
    assert!(cleared.migrations_rolled_back.is_empty());
    assert_eq!(entries(&log), vec!["up:a", "up:b"]);
    assert!(runner.tracker().table_exists(runner.connection()).unwrap());
}
