use thiserror::Error;

use crate::dialect::Dialect;

/// Core error type for dbshift operations.
#[derive(Error, Debug)]
pub enum ShiftError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    /// A catalog read failed. Raised before any mutation happens.
    #[error("Introspection error: {0}")]
    Introspection(String),

    /// A desired change has no valid DDL on the target dialect.
    #[error("Unsupported operation on {dialect}: {message}")]
    UnsupportedOperation { dialect: Dialect, message: String },

    /// The diff produced contradictory operations or names.
    #[error("Constraint conflict: {0}")]
    ConstraintConflict(String),

    /// Bookkeeping and known migration units disagree.
    #[error("Migration integrity error: {0}")]
    MigrationIntegrity(String),

    /// A single statement failed; the statement text is kept for diagnostics.
    #[error("Statement failed: {message}\n  statement: {statement}")]
    Statement { statement: String, message: String },

    /// A migration unit failed while applying or reverting.
    #[error("Migration {name} failed: {source}")]
    Migration {
        name: String,
        #[source]
        source: Box<ShiftError>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl ShiftError {
    /// Build an `UnsupportedOperation` error.
    pub fn unsupported(dialect: Dialect, message: impl Into<String>) -> Self {
        ShiftError::UnsupportedOperation {
            dialect,
            message: message.into(),
        }
    }

    /// Build a `Statement` error from any displayable driver error.
    pub fn statement(statement: impl Into<String>, err: impl std::fmt::Display) -> Self {
        ShiftError::Statement {
            statement: statement.into(),
            message: err.to_string(),
        }
    }

    /// The failing statement, if this error (or its cause) carries one.
    pub fn failed_statement(&self) -> Option<&str> {
        match self {
            ShiftError::Statement { statement, .. } => Some(statement),
            ShiftError::Migration { source, .. } => source.failed_statement(),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ShiftError {
    fn from(e: serde_json::Error) -> Self {
        ShiftError::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for ShiftError {
    fn from(e: toml::de::Error) -> Self {
        ShiftError::Serialization(e.to_string())
    }
}

/// Result type alias using ShiftError.
pub type Result<T> = std::result::Result<T, ShiftError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_statement_through_migration() {
        let err = ShiftError::Migration {
            name: "1700000000000_create_post".into(),
            source: Box::new(ShiftError::statement("CREATE TABLE post", "syntax error")),
        };
        assert_eq!(err.failed_statement(), Some("CREATE TABLE post"));
        assert!(err.to_string().contains("1700000000000_create_post"));
    }

    #[test]
    fn test_unsupported_display() {
        let err = ShiftError::unsupported(Dialect::Sqlite, "exclusion constraints");
        assert_eq!(
            err.to_string(),
            "Unsupported operation on sqlite: exclusion constraints"
        );
    }
}
