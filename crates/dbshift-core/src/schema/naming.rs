//! Deterministic constraint naming.
//!
//! Unnamed constraints get a name derived from the table and the constraint's
//! columns (or expression), so re-running a diff produces the same names.

use sha2::{Digest, Sha256};

use super::constraint::ConstraintKind;

/// Hex digits of the hash kept in derived names.
const HASH_LEN: usize = 26;

/// Derives constraint names, truncated to the dialect's identifier limit.
#[derive(Debug, Clone, Copy, Default)]
pub struct NamingStrategy {
    max_identifier_length: Option<usize>,
}

impl NamingStrategy {
    /// Create a strategy for a dialect with the given identifier limit.
    pub fn new(max_identifier_length: Option<usize>) -> Self {
        Self {
            max_identifier_length,
        }
    }

    pub fn primary_key(&self, table: &str, columns: &[String]) -> String {
        self.derive(ConstraintKind::PrimaryKey, table, &sorted(columns))
    }

    pub fn index(&self, table: &str, columns: &[String], predicate: Option<&str>) -> String {
        let mut parts = columns.to_vec();
        if let Some(predicate) = predicate {
            parts.push(predicate.to_string());
        }
        self.derive(ConstraintKind::Index, table, &parts.join("_"))
    }

    pub fn unique(&self, table: &str, columns: &[String]) -> String {
        self.derive(ConstraintKind::Unique, table, &sorted(columns))
    }

    pub fn check(&self, table: &str, expression: &str) -> String {
        self.derive(ConstraintKind::Check, table, expression)
    }

    pub fn exclusion(&self, table: &str, expression: &str) -> String {
        self.derive(ConstraintKind::Exclusion, table, expression)
    }

    pub fn foreign_key(
        &self,
        table: &str,
        columns: &[String],
        referenced_table: &str,
        referenced_columns: &[String],
    ) -> String {
        let clause = format!(
            "{}_{}_{}",
            sorted(columns),
            referenced_table,
            referenced_columns.join("_")
        );
        self.derive(ConstraintKind::ForeignKey, table, &clause)
    }

    /// Truncate an identifier to the dialect limit.
    pub fn truncate(&self, name: &str) -> String {
        match self.max_identifier_length {
            Some(max) if name.len() > max => name.chars().take(max).collect(),
            _ => name.to_string(),
        }
    }

    fn derive(&self, kind: ConstraintKind, table: &str, clause: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(format!("{}_{}", table, clause).as_bytes());
        let digest = format!("{:x}", hasher.finalize());
        self.truncate(&format!("{}_{}", kind.prefix(), &digest[..HASH_LEN]))
    }
}

fn sorted(columns: &[String]) -> String {
    let mut cols: Vec<&str> = columns.iter().map(String::as_str).collect();
    cols.sort_unstable();
    cols.join("_")
}
