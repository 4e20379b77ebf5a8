use serde::{Deserialize, Serialize};

use crate::dialect::Dialect;
use crate::error::Result;

/// Database connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Connection URL.
    pub url: String,

    /// Dialect override; inferred from the URL scheme when absent.
    #[serde(default)]
    pub dialect: Option<Dialect>,

    /// Schema the introspector reads (Postgres, SQL Server).
    #[serde(default)]
    pub schema: Option<String>,

    /// Pool checkout timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Statement timeout in seconds.
    #[serde(default = "default_statement_timeout")]
    pub statement_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            dialect: None,
            schema: None,
            connect_timeout_secs: default_connect_timeout(),
            statement_timeout_secs: default_statement_timeout(),
        }
    }
}

impl DatabaseConfig {
    /// The configured dialect, or the one the URL implies.
    pub fn dialect(&self) -> Result<Dialect> {
        match self.dialect {
            Some(dialect) => Ok(dialect),
            None => Dialect::from_url(&self.url),
        }
    }
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_statement_timeout() -> u64 {
    300
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_database_config() {
        let config = DatabaseConfig::default();
        assert_eq!(config.connect_timeout_secs, 30);
        assert!(config.dialect.is_none());
    }

    #[test]
    fn test_dialect_override_wins() {
        let config: DatabaseConfig = toml::from_str(
            r#"
            url = "postgres://localhost/test"
            dialect = "cockroachdb"
        "#,
        )
        .unwrap();
        assert_eq!(config.dialect().unwrap(), Dialect::CockroachDb);

        let inferred = DatabaseConfig {
            url: "sqlite::memory:".into(),
            ..Default::default()
        };
        assert_eq!(inferred.dialect().unwrap(), Dialect::Sqlite);
    }
}
