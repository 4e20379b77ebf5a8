use serde::{Deserialize, Serialize};

use super::column::ColumnDef;
use super::constraint::{CheckDef, ExclusionDef, ForeignKeyDef, IndexDef, UniqueDef};
use super::naming::NamingStrategy;

/// Definition of a table and everything attached to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDef {
    /// Table name.
    pub name: String,

    /// Schema / owner (Postgres, SQL Server).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    /// Attached database (SQLite `ATTACH`, MySQL database).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,

    /// Columns in declaration order.
    #[serde(default)]
    pub columns: Vec<ColumnDef>,

    /// Name of the primary key constraint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_key_name: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub indices: Vec<IndexDef>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub uniques: Vec<UniqueDef>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub checks: Vec<CheckDef>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclusions: Vec<ExclusionDef>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub foreign_keys: Vec<ForeignKeyDef>,

    /// `false` marks a table the application does not manage; it is never
    /// altered or dropped.
    #[serde(default = "default_synchronize")]
    pub synchronize: bool,

    /// Columns present in the database but outside the declared set that
    /// must never be dropped.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unmanaged_columns: Vec<String>,
}

fn default_synchronize() -> bool {
    true
}

impl TableDef {
    /// Create a new empty table.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: None,
            database: None,
            columns: Vec::new(),
            primary_key_name: None,
            indices: Vec::new(),
            uniques: Vec::new(),
            checks: Vec::new(),
            exclusions: Vec::new(),
            foreign_keys: Vec::new(),
            synchronize: true,
            unmanaged_columns: Vec::new(),
        }
    }

    pub fn in_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn in_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn column(mut self, column: ColumnDef) -> Self {
        self.columns.push(column);
        self
    }

    pub fn index(mut self, index: IndexDef) -> Self {
        self.indices.push(index);
        self
    }

    pub fn unique(mut self, unique: UniqueDef) -> Self {
        self.uniques.push(unique);
        self
    }

    pub fn check(mut self, check: CheckDef) -> Self {
        self.checks.push(check);
        self
    }

    pub fn exclusion(mut self, exclusion: ExclusionDef) -> Self {
        self.exclusions.push(exclusion);
        self
    }

    pub fn foreign_key(mut self, foreign_key: ForeignKeyDef) -> Self {
        self.foreign_keys.push(foreign_key);
        self
    }

    /// Mark the table as unmanaged.
    pub fn unmanaged(mut self) -> Self {
        self.synchronize = false;
        self
    }

    pub fn get_column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn get_column_mut(&mut self, name: &str) -> Option<&mut ColumnDef> {
        self.columns.iter_mut().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.get_column(name).is_some()
    }

    /// Names of the primary key columns, in declaration order.
    pub fn primary_columns(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| c.primary)
            .map(|c| c.name.clone())
            .collect()
    }

    /// Whether a column may be dropped when it is missing from the desired set.
    pub fn is_unmanaged_column(&self, name: &str) -> bool {
        self.unmanaged_columns.iter().any(|c| c == name)
    }

    /// Database or schema qualifier used when rendering the table path.
    pub fn qualifier(&self) -> Option<&str> {
        self.database.as_deref().or(self.schema.as_deref())
    }

    /// Every constraint and index name on the table, in a stable order.
    pub fn constraint_names(&self) -> Vec<&str> {
        let mut names = Vec::new();
        if let Some(pk) = &self.primary_key_name {
            names.push(pk.as_str());
        }
        names.extend(self.indices.iter().filter_map(|i| i.name.as_deref()));
        names.extend(self.uniques.iter().filter_map(|u| u.name.as_deref()));
        names.extend(self.checks.iter().filter_map(|c| c.name.as_deref()));
        names.extend(self.exclusions.iter().filter_map(|e| e.name.as_deref()));
        names.extend(self.foreign_keys.iter().filter_map(|f| f.name.as_deref()));
        names
    }

    /// Fill in derived names for every unnamed constraint.
    pub fn resolve_names(&mut self, naming: &NamingStrategy) {
        let table = self.name.clone();
        let primary = self.primary_columns();
        if self.primary_key_name.is_none() && !primary.is_empty() {
            self.primary_key_name = Some(naming.primary_key(&table, &primary));
        }
        for index in &mut self.indices {
            if index.name.is_none() {
                index.name = Some(naming.index(&table, &index.columns, index.predicate.as_deref()));
            }
        }
        for unique in &mut self.uniques {
            if unique.name.is_none() {
                unique.name = Some(naming.unique(&table, &unique.columns));
            }
        }
        for check in &mut self.checks {
            if check.name.is_none() {
                check.name = Some(naming.check(&table, &check.expression));
            }
        }
        for exclusion in &mut self.exclusions {
            if exclusion.name.is_none() {
                exclusion.name = Some(naming.exclusion(&table, &exclusion.expression));
            }
        }
        for fk in &mut self.foreign_keys {
            if fk.name.is_none() {
                fk.name = Some(naming.foreign_key(
                    &table,
                    &fk.columns,
                    &fk.referenced_table,
                    &fk.referenced_columns,
                ));
            }
        }
    }
}
