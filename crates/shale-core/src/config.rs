//! Configuration types and parsing for shale.yml

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming the database target to use
pub const TARGET_ENV_VAR: &str = "SHALE_TARGET";

/// Environment variable carrying a database connection string
pub const DATABASE_URL_ENV_VAR: &str = "SHALE_DATABASE_URL";

/// Main project configuration from shale.yml
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Project name
    pub name: String,

    /// Directory holding one sub-directory per migration
    #[serde(default = "default_migrations_path")]
    pub migrations_path: String,

    /// Database connection configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Where the version ledger lives inside the target database
    #[serde(default)]
    pub ledger: LedgerConfig,

    /// Single-writer lock settings
    #[serde(default)]
    pub lock: LockConfig,

    /// Named target configurations (e.g., dev, staging, prod)
    #[serde(default)]
    pub targets: HashMap<String, TargetConfig>,
}

/// Target-specific configuration overrides
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct TargetConfig {
    /// Database configuration override
    #[serde(default)]
    pub database: Option<DatabaseConfig>,
}

/// Database type selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DbType {
    /// DuckDB (default)
    #[default]
    DuckDb,
}

impl std::fmt::Display for DbType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DbType::DuckDb => write!(f, "duckdb"),
        }
    }
}

/// Database connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    /// Database type
    #[serde(rename = "type", default)]
    pub db_type: DbType,

    /// Connection string: `:memory:`, a file path, or `duckdb://<path>`
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            db_type: DbType::default(),
            path: default_db_path(),
        }
    }
}

/// Ledger table location
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LedgerConfig {
    /// Schema that holds the ledger and lock tables
    #[serde(default = "default_ledger_schema")]
    pub schema: String,

    /// Ledger table name
    #[serde(default = "default_ledger_table")]
    pub table: String,

    /// Lock marker table name
    #[serde(default = "default_lock_table")]
    pub lock_table: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            schema: default_ledger_schema(),
            table: default_ledger_table(),
            lock_table: default_lock_table(),
        }
    }
}

/// Single-writer lock settings
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LockConfig {
    /// How long to wait for a held lock before giving up
    #[serde(default = "default_lock_timeout_ms")]
    pub timeout_ms: u64,

    /// Delay between acquisition attempts
    #[serde(default = "default_lock_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_lock_timeout_ms(),
            poll_interval_ms: default_lock_poll_interval_ms(),
        }
    }
}

impl LockConfig {
    /// Lock wait timeout as a [`Duration`]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Poll interval as a [`Duration`]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

fn default_migrations_path() -> String {
    "migrations".to_string()
}

const DEFAULT_DB_PATH: &str = ":memory:";

fn default_db_path() -> String {
    DEFAULT_DB_PATH.to_string()
}

fn default_ledger_schema() -> String {
    "shale".to_string()
}

fn default_ledger_table() -> String {
    "schema_ledger".to_string()
}

fn default_lock_table() -> String {
    "migration_lock".to_string()
}

fn default_lock_timeout_ms() -> u64 {
    30_000
}

fn default_lock_poll_interval_ms() -> u64 {
    250
}

/// Returns true for plain SQL identifiers safe to interpolate unquoted.
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl Config {
    /// Load configuration from a file path
    pub fn load(path: &Path) -> CoreResult<Self> {
        if !path.exists() {
            return Err(CoreError::ConfigNotFound {
                path: path.display().to_string(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| CoreError::IoWithPath {
            path: path.display().to_string(),
            source: e,
        })?;
        let config: Config =
            serde_yaml::from_str(&content).map_err(|e| CoreError::ConfigParseError {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a project directory
    /// Looks for shale.yml or shale.yaml
    pub fn load_from_dir(dir: &Path) -> CoreResult<Self> {
        let yml_path = dir.join("shale.yml");
        let yaml_path = dir.join("shale.yaml");

        if yml_path.exists() {
            Self::load(&yml_path)
        } else if yaml_path.exists() {
            Self::load(&yaml_path)
        } else {
            Err(CoreError::ConfigNotFound {
                path: yml_path.display().to_string(),
            })
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> CoreResult<()> {
        if self.name.trim().is_empty() {
            return Err(CoreError::ConfigInvalid {
                message: "Project name cannot be empty".to_string(),
            });
        }

        if self.migrations_path.trim().is_empty() {
            return Err(CoreError::ConfigInvalid {
                message: "migrations_path cannot be empty".to_string(),
            });
        }

        for (field, value) in [
            ("ledger.schema", &self.ledger.schema),
            ("ledger.table", &self.ledger.table),
            ("ledger.lock_table", &self.ledger.lock_table),
        ] {
            if !is_valid_identifier(value) {
                return Err(CoreError::ConfigInvalid {
                    message: format!(
                        "{field} '{value}' must be a plain identifier ([A-Za-z_][A-Za-z0-9_]*)"
                    ),
                });
            }
        }

        if self.ledger.table == self.ledger.lock_table {
            return Err(CoreError::ConfigInvalid {
                message: "ledger.table and ledger.lock_table must differ".to_string(),
            });
        }

        if self.lock.poll_interval_ms == 0 {
            return Err(CoreError::ConfigInvalid {
                message: "lock.poll_interval_ms must be greater than zero".to_string(),
            });
        }

        Ok(())
    }

    /// Get absolute migrations directory relative to a project root
    pub fn migrations_path_absolute(&self, root: &Path) -> PathBuf {
        root.join(&self.migrations_path)
    }

    /// Get the list of available target names, sorted
    pub fn available_targets(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.targets.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Get database configuration, optionally applying target overrides
    ///
    /// If target is specified and exists, uses target's database config.
    /// Otherwise, uses the base database config.
    pub fn get_database_config(&self, target: Option<&str>) -> CoreResult<DatabaseConfig> {
        match target {
            Some(name) => {
                let target_config =
                    self.targets
                        .get(name)
                        .ok_or_else(|| CoreError::ConfigInvalid {
                            message: format!(
                                "Target '{}' not found. Available targets: {}",
                                name,
                                self.available_targets().join(", ")
                            ),
                        })?;

                Ok(target_config
                    .database
                    .clone()
                    .unwrap_or_else(|| self.database.clone()))
            }
            None => Ok(self.database.clone()),
        }
    }

    /// Resolve the connection string to use.
    ///
    /// Priority: explicit URL > SHALE_DATABASE_URL > named target > base
    /// `database.path`. Relative file paths from the config file are resolved
    /// against `root`; explicit and environment URLs are used verbatim.
    pub fn resolve_database_url(
        &self,
        root: &Path,
        explicit_url: Option<&str>,
        target: Option<&str>,
    ) -> CoreResult<String> {
        if let Some(url) = explicit_url.filter(|u| !u.trim().is_empty()) {
            return Ok(url.to_string());
        }
        if let Some(url) = std::env::var(DATABASE_URL_ENV_VAR)
            .ok()
            .filter(|u| !u.trim().is_empty())
        {
            return Ok(url);
        }

        let db = self.get_database_config(target)?;
        Ok(resolve_relative_url(&db.path, root))
    }

    /// Resolve target from CLI flag or SHALE_TARGET environment variable
    ///
    /// Priority: CLI flag > SHALE_TARGET env var > None
    pub fn resolve_target(cli_target: Option<&str>) -> Option<String> {
        cli_target
            .map(String::from)
            .or_else(|| std::env::var(TARGET_ENV_VAR).ok())
            .filter(|t| !t.is_empty())
    }
}

/// Anchor a relative file path (bare or `duckdb://` prefixed) at `root`.
fn resolve_relative_url(url: &str, root: &Path) -> String {
    if url == DEFAULT_DB_PATH {
        return url.to_string();
    }
    let (prefix, path) = match url.strip_prefix("duckdb://") {
        Some(rest) => ("duckdb://", rest),
        None => ("", url),
    };
    if path == DEFAULT_DB_PATH || Path::new(path).is_absolute() {
        return url.to_string();
    }
    format!("{prefix}{}", root.join(path).display())
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
