use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::naming::NamingStrategy;
use super::table::TableDef;
use crate::error::{Result, ShiftError};

/// A set of tables: either the desired schema or an introspected one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaModel {
    #[serde(default)]
    pub tables: Vec<TableDef>,
}

impl SchemaModel {
    /// Create a new empty model.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, table: TableDef) -> Self {
        self.tables.push(table);
        self
    }

    /// Add or replace a table.
    pub fn put_table(&mut self, table: TableDef) {
        match self.tables.iter_mut().find(|t| t.name == table.name) {
            Some(existing) => *existing = table,
            None => self.tables.push(table),
        }
    }

    pub fn table(&self, name: &str) -> Option<&TableDef> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn table_mut(&mut self, name: &str) -> Option<&mut TableDef> {
        self.tables.iter_mut().find(|t| t.name == name)
    }

    pub fn remove_table(&mut self, name: &str) -> Option<TableDef> {
        let pos = self.tables.iter().position(|t| t.name == name)?;
        Some(self.tables.remove(pos))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.table(name).is_some()
    }

    pub fn table_names(&self) -> Vec<&str> {
        self.tables.iter().map(|t| t.name.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Fill in derived names for every unnamed constraint.
    pub fn resolve_names(&mut self, naming: &NamingStrategy) {
        for table in &mut self.tables {
            table.resolve_names(naming);
        }
    }

    /// Check the model's structural invariants.
    ///
    /// Constraint names must be unique per table, constrained columns must
    /// exist, and foreign keys must target a table and columns in this model
    /// unless they point into another schema or attached database.
    pub fn validate(&self) -> Result<()> {
        let mut seen_tables = HashSet::new();
        for table in &self.tables {
            if !seen_tables.insert(table.name.as_str()) {
                return Err(ShiftError::ConstraintConflict(format!(
                    "table '{}' is declared twice",
                    table.name
                )));
            }
            self.validate_table(table)?;
        }
        Ok(())
    }

    fn validate_table(&self, table: &TableDef) -> Result<()> {
        let mut columns = HashSet::new();
        for column in &table.columns {
            if !columns.insert(column.name.as_str()) {
                return Err(ShiftError::InvalidArgument(format!(
                    "column '{}.{}' is declared twice",
                    table.name, column.name
                )));
            }
        }

        let mut names = HashSet::new();
        for name in table.constraint_names() {
            if !names.insert(name) {
                return Err(ShiftError::ConstraintConflict(format!(
                    "constraint name '{}' is used twice on table '{}'",
                    name, table.name
                )));
            }
        }

        let constrained = table
            .indices
            .iter()
            .flat_map(|i| i.columns.iter())
            .chain(table.uniques.iter().flat_map(|u| u.columns.iter()))
            .chain(table.foreign_keys.iter().flat_map(|f| f.columns.iter()));
        for column in constrained {
            if !columns.contains(column.as_str()) {
                return Err(ShiftError::InvalidArgument(format!(
                    "constraint on '{}' references unknown column '{}'",
                    table.name, column
                )));
            }
        }

        for fk in &table.foreign_keys {
            if fk.columns.len() != fk.referenced_columns.len() || fk.columns.is_empty() {
                return Err(ShiftError::InvalidArgument(format!(
                    "foreign key on '{}' has mismatched column lists",
                    table.name
                )));
            }
            let external = fk.referenced_database.is_some()
                || (fk.referenced_schema.is_some() && fk.referenced_schema != table.schema);
            if external {
                continue;
            }
            let target = self.table(&fk.referenced_table).ok_or_else(|| {
                ShiftError::InvalidArgument(format!(
                    "foreign key on '{}' references unknown table '{}'",
                    table.name, fk.referenced_table
                ))
            })?;
            if let Some(missing) = fk
                .referenced_columns
                .iter()
                .find(|c| !target.has_column(c))
            {
                return Err(ShiftError::InvalidArgument(format!(
                    "foreign key on '{}' references unknown column '{}.{}'",
                    table.name, fk.referenced_table, missing
                )));
            }
        }

        Ok(())
    }

    /// Parse a model from TOML.
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Parse a model from JSON.
    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Load a model from a `.toml` or `.json` file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ShiftError::Config(format!("Failed to read schema file {}: {}", path.display(), e))
        })?;
        let model = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&content)?,
            _ => Self::from_toml(&content)?,
        };
        tracing::debug!(path = %path.display(), tables = model.tables.len(), "Loaded schema");
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnDef, ForeignKeyDef, IndexDef, LogicalType};

    fn author() -> TableDef {
        TableDef::new("author").column(ColumnDef::new("id", LogicalType::Integer).primary())
    }

    fn post() -> TableDef {
        TableDef::new("post")
            .column(ColumnDef::new("id", LogicalType::Integer).primary())
            .column(ColumnDef::new("author_id", LogicalType::Integer))
            .foreign_key(ForeignKeyDef::new(&["author_id"], "author", &["id"]))
    }

    #[test]
    fn test_validate_ok() {
        let mut model = SchemaModel::new().with_table(author()).with_table(post());
        model.resolve_names(&NamingStrategy::default());
        model.validate().unwrap();
    }

    #[test]
    fn test_validate_missing_fk_target() {
        let model = SchemaModel::new().with_table(post());
        let err = model.validate().unwrap_err();
        assert!(err.to_string().contains("unknown table 'author'"));
    }

    #[test]
    fn test_validate_duplicate_derived_names() {
        let table = author()
            .index(IndexDef::new(&["id"]))
            .index(IndexDef::new(&["id"]));
        let mut model = SchemaModel::new().with_table(table);
        model.resolve_names(&NamingStrategy::default());
        assert!(matches!(
            model.validate(),
            Err(ShiftError::ConstraintConflict(_))
        ));
    }

    #[test]
    fn test_validate_unknown_column() {
        let model = SchemaModel::new().with_table(author().index(IndexDef::new(&["nope"])));
        assert!(matches!(model.validate(), Err(ShiftError::InvalidArgument(_))));
    }

    #[test]
    fn test_put_table_replaces() {
        let mut model = SchemaModel::new().with_table(author());
        model.put_table(author().column(ColumnDef::varchar("name", 20)));
        assert_eq!(model.tables.len(), 1);
        assert!(model.table("author").unwrap().has_column("name"));
    }

    #[test]
    fn test_from_toml() {
        let model = SchemaModel::from_toml(
            r#"
            [[tables]]
            name = "post"

            [[tables.columns]]
            name = "id"
            type = "integer"
            primary = true
            generation = "increment"

            [[tables.columns]]
            name = "name"
            type = "varchar"
            length = 50
        "#,
        )
        .unwrap();

        let post = model.table("post").unwrap();
        assert_eq!(post.primary_columns(), vec!["id".to_string()]);
        assert_eq!(post.get_column("name").unwrap().length, Some(50));
    }
}
