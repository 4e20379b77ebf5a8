use serde::{Deserialize, Serialize};

use super::types::LogicalType;

/// How a column's value is generated when not supplied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Generation {
    #[default]
    None,
    /// Auto-incrementing integer (serial, AUTO_INCREMENT, AUTOINCREMENT).
    Increment,
    /// Database-generated UUID default.
    Uuid,
    /// SQL-standard identity column.
    Identity,
}

/// Storage kind for a generated (computed) column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeneratedKind {
    Virtual,
    Stored,
}

/// A computed column expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GeneratedColumn {
    pub expression: String,
    pub kind: GeneratedKind,
}

/// Definition of a table column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    /// Column name.
    pub name: String,

    /// Logical type.
    #[serde(rename = "type")]
    pub column_type: LogicalType,

    /// Length for char/varchar/binary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u32>,

    /// Precision for decimals.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precision: Option<u32>,

    /// Scale for decimals.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<u32>,

    /// Whether NULL is allowed.
    #[serde(default)]
    pub nullable: bool,

    /// Part of the primary key.
    #[serde(default)]
    pub primary: bool,

    /// Default value as a raw SQL expression (literals carry their quotes).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,

    /// Value generation strategy.
    #[serde(default)]
    pub generation: Generation,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collation: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub charset: Option<String>,

    /// `ON UPDATE` expression (MySQL family).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_update: Option<String>,

    /// Computed column expression.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated: Option<GeneratedColumn>,

    /// Display width (MySQL integer types).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
}

impl ColumnDef {
    /// Create a NOT NULL column of the given type.
    pub fn new(name: impl Into<String>, column_type: LogicalType) -> Self {
        Self {
            name: name.into(),
            column_type,
            length: None,
            precision: None,
            scale: None,
            nullable: false,
            primary: false,
            default: None,
            generation: Generation::None,
            comment: None,
            collation: None,
            charset: None,
            on_update: None,
            generated: None,
            width: None,
        }
    }

    /// Shorthand for a `varchar(length)` column.
    pub fn varchar(name: impl Into<String>, length: u32) -> Self {
        Self::new(name, LogicalType::Varchar).length(length)
    }

    pub fn length(mut self, length: u32) -> Self {
        self.length = Some(length);
        self
    }

    pub fn precision(mut self, precision: u32, scale: u32) -> Self {
        self.precision = Some(precision);
        self.scale = Some(scale);
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Mark as (part of) the primary key. Primary columns are never nullable.
    pub fn primary(mut self) -> Self {
        self.primary = true;
        self.nullable = false;
        self
    }

    /// Set a raw SQL default expression.
    pub fn default_expr(mut self, sql: impl Into<String>) -> Self {
        self.default = Some(sql.into());
        self
    }

    /// Set a string literal default; quotes are escaped.
    pub fn default_literal(mut self, value: &str) -> Self {
        self.default = Some(format!("'{}'", value.replace('\'', "''")));
        self
    }

    pub fn generated_by(mut self, generation: Generation) -> Self {
        self.generation = generation;
        self
    }

    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn collation(mut self, collation: impl Into<String>) -> Self {
        self.collation = Some(collation.into());
        self
    }

    pub fn on_update(mut self, expression: impl Into<String>) -> Self {
        self.on_update = Some(expression.into());
        self
    }

    pub fn generated_as(mut self, expression: impl Into<String>, kind: GeneratedKind) -> Self {
        self.generated = Some(GeneratedColumn {
            expression: expression.into(),
            kind,
        });
        self
    }

    pub fn width(mut self, width: u32) -> Self {
        self.width = Some(width);
        self
    }

    /// Whether the database fills this column on insert.
    pub fn is_auto_generated(&self) -> bool {
        self.generation != Generation::None || self.generated.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primary_forces_not_null() {
        let col = ColumnDef::new("id", LogicalType::Integer)
            .nullable()
            .primary();
        assert!(col.primary);
        assert!(!col.nullable);
    }

    #[test]
    fn test_default_literal_escapes_quotes() {
        let col = ColumnDef::varchar("title", 50).default_literal("it's");
        assert_eq!(col.default.as_deref(), Some("'it''s'"));
    }

    #[test]
    fn test_deserialize_minimal_column() {
        let col: ColumnDef = toml::from_str(
            r#"
            name = "name"
            type = "varchar"
            length = 50
        "#,
        )
        .unwrap();
        assert_eq!(col, ColumnDef::varchar("name", 50));
        assert_eq!(col.generation, Generation::None);
    }
}
