use anyhow::{Context, Result};
use ladder::{DEFAULT_MIGRATION_TABLE, RunnerOptions};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::utils::expand_env_vars;

pub const CONFIG_FILE_NAME: &str = "ladder.toml";

/// Project context for ladder operations
pub struct ProjectContext {
    /// Directory relative paths in the config are resolved against
    pub project_root: PathBuf,
    /// Path to the loaded config file, if one was found
    pub config_path: Option<PathBuf>,
    /// Path to the SQL migrations directory
    pub migrations_dir: PathBuf,
    /// Loaded configuration (defaults when no file exists)
    pub config: LadderConfig,
}

/// Configuration stored in ladder.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LadderConfig {
    #[serde(default)]
    pub database: DatabaseSettings,
    #[serde(default)]
    pub migrations: MigrationSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default = "default_database_path")]
    pub path: String,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

fn default_database_path() -> String {
    "${LADDER_DATABASE}".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationSettings {
    #[serde(default = "default_migrations_dir")]
    pub dir: String,
    #[serde(default = "default_table")]
    pub table: String,
    #[serde(default = "default_true")]
    pub run_init_schema: bool,
    #[serde(default = "default_true")]
    pub sort_by_id: bool,
    #[serde(default)]
    pub debug: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init_schema: Option<String>,
}

impl Default for MigrationSettings {
    fn default() -> Self {
        Self {
            dir: default_migrations_dir(),
            table: default_table(),
            run_init_schema: true,
            sort_by_id: true,
            debug: false,
            init_schema: None,
        }
    }
}

fn default_migrations_dir() -> String {
    "migrations".to_string()
}

fn default_table() -> String {
    DEFAULT_MIGRATION_TABLE.to_string()
}

fn default_true() -> bool {
    true
}

impl ProjectContext {
    /// Load the context from an explicit config file, or search for one
    /// starting at the current directory
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        match config_path {
            Some(path) => Self::from_config_file(path),
            None => {
                let current_dir =
                    std::env::current_dir().context("Failed to get current directory")?;
                Self::find_from(&current_dir)
            }
        }
    }

    /// Find ladder.toml in `start` or any ancestor; fall back to defaults
    /// rooted at `start`
    pub fn find_from(start: &Path) -> Result<Self> {
        let mut current = start.to_path_buf();

        loop {
            let candidate = current.join(CONFIG_FILE_NAME);
            if candidate.is_file() {
                return Self::from_config_file(&candidate);
            }

            if !current.pop() {
                return Ok(Self::with_config(start.to_path_buf(), None, LadderConfig::default()));
            }
        }
    }

    pub fn from_config_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: LadderConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;

        let project_root = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        Ok(Self::with_config(project_root, Some(path.to_path_buf()), config))
    }

    fn with_config(project_root: PathBuf, config_path: Option<PathBuf>, config: LadderConfig) -> Self {
        let migrations_dir = project_root.join(&config.migrations.dir);
        Self {
            project_root,
            config_path,
            migrations_dir,
            config,
        }
    }

    /// Resolve the database path. A command-line value wins over the config.
    pub fn database_path(&self, cli_override: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = cli_override {
            return Ok(path.to_path_buf());
        }

        let path = expand_env_vars(&self.config.database.path)
            .context("No database configured; pass --database or set [database] path")?;
        Ok(self.resolve(&path))
    }

    /// Path to the optional initial-schema SQL file
    pub fn init_schema_path(&self) -> Option<PathBuf> {
        self.config
            .migrations
            .init_schema
            .as_deref()
            .map(|path| self.resolve(path))
    }

    pub fn runner_options(&self) -> RunnerOptions {
        let settings = &self.config.migrations;
        RunnerOptions {
            migration_table: settings.table.clone(),
            run_init_schema: settings.run_init_schema,
            debug_mode: settings.debug,
            sort_by_id: settings.sort_by_id,
        }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_root.join(path)
        }
    }
}
