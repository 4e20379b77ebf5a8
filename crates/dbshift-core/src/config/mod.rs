mod database;

pub use database::DatabaseConfig;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, ShiftError};

/// Root configuration, usually read from `dbshift.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShiftConfig {
    /// Database configuration.
    pub database: DatabaseConfig,

    /// Migration configuration.
    #[serde(default)]
    pub migrations: MigrationsConfig,

    /// Desired schema source.
    #[serde(default)]
    pub schema: SchemaConfig,
}

impl ShiftConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ShiftError::Config(format!("Failed to read config file: {}", e)))?;

        Self::parse_toml(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse_toml(content: &str) -> Result<Self> {
        let content = substitute_env_vars(content);

        toml::from_str(&content)
            .map_err(|e| ShiftError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Configuration with defaults and the given database URL.
    pub fn default_with_database_url(url: &str) -> Self {
        Self {
            database: DatabaseConfig {
                url: url.to_string(),
                ..Default::default()
            },
            migrations: MigrationsConfig::default(),
            schema: SchemaConfig::default(),
        }
    }
}

/// How migration units are wrapped in transactions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionMode {
    /// One transaction around the whole pending batch.
    #[default]
    All,
    /// One transaction per unit.
    Each,
    /// No transaction; a failure can leave the schema partially migrated.
    None,
}

impl std::str::FromStr for TransactionMode {
    type Err = ShiftError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(TransactionMode::All),
            "each" => Ok(TransactionMode::Each),
            "none" => Ok(TransactionMode::None),
            other => Err(ShiftError::InvalidArgument(format!(
                "Unknown transaction mode '{}', expected all, each or none",
                other
            ))),
        }
    }
}

impl std::fmt::Display for TransactionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionMode::All => write!(f, "all"),
            TransactionMode::Each => write!(f, "each"),
            TransactionMode::None => write!(f, "none"),
        }
    }
}

/// Migration configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationsConfig {
    /// Directory holding migration files.
    #[serde(default = "default_directory")]
    pub directory: PathBuf,

    /// Bookkeeping table name.
    #[serde(default = "default_table_name")]
    pub table_name: String,

    /// Default transaction policy.
    #[serde(default)]
    pub transaction: TransactionMode,

    /// Refuse to run when an applied unit's checksum changed.
    #[serde(default = "default_true")]
    pub verify_checksums: bool,

    /// Take the dialect's advisory lock around a run.
    #[serde(default = "default_true")]
    pub lock: bool,
}

impl Default for MigrationsConfig {
    fn default() -> Self {
        Self {
            directory: default_directory(),
            table_name: default_table_name(),
            transaction: TransactionMode::default(),
            verify_checksums: true,
            lock: true,
        }
    }
}

fn default_directory() -> PathBuf {
    PathBuf::from("migrations")
}

fn default_table_name() -> String {
    "migrations".to_string()
}

fn default_true() -> bool {
    true
}

/// Where the desired schema comes from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaConfig {
    /// Desired schema file (`.toml` or `.json`).
    #[serde(default = "default_schema_path")]
    pub path: PathBuf,

    /// Only these tables are introspected and compared. Empty means all.
    #[serde(default)]
    pub tables: Vec<String>,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            path: default_schema_path(),
            tables: Vec::new(),
        }
    }
}

fn default_schema_path() -> PathBuf {
    PathBuf::from("schema.toml")
}

/// Substitute environment variables in the format ${VAR_NAME}.
fn substitute_env_vars(content: &str) -> String {
    let re = match regex_lite::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}") {
        Ok(re) => re,
        Err(_) => return content.to_string(),
    };

    let mut result = content.to_string();
    for cap in re.captures_iter(content) {
        let var_name = &cap[1];
        if let Ok(value) = std::env::var(var_name) {
            result = result.replace(&cap[0], &value);
        }
    }

    result
}
