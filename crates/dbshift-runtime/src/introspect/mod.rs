//! Catalog introspection.
//!
//! Reads the live catalog through a [`QueryRunner`] and builds the "actual"
//! [`SchemaModel`]. The reader is picked from the dialect's catalog family.
//! A model is returned only when every catalog query succeeded.

mod mssql;
mod mysql;
mod postgres;
mod sqlite;

use std::collections::BTreeMap;

use dbshift_core::db::{QueryFuture, QueryRunner, Row};
use dbshift_core::dialect::{CatalogFamily, Dialect};
use dbshift_core::error::{Result, ShiftError};
use dbshift_core::schema::{ForeignKeyDef, ReferentialAction, SchemaModel, TableDef};
use tracing::debug;

/// What a catalog reader should look at.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    /// Schema (Postgres, SQL Server) or database (MySQL). `None` uses the
    /// connection's current one.
    pub schema: Option<String>,
    /// Attached databases to read besides `main` (SQLite).
    pub databases: Vec<String>,
}

/// A catalog reader for one family of dialects.
pub(crate) trait CatalogReader: Send + Sync {
    fn read_tables<'a>(
        &'a self,
        runner: &'a mut dyn QueryRunner,
        scope: &'a Scope,
    ) -> QueryFuture<'a, Vec<TableDef>>;
}

fn reader_for(dialect: Dialect) -> Box<dyn CatalogReader> {
    let caps = dialect.capabilities();
    match caps.catalog {
        CatalogFamily::Postgres => Box::new(postgres::PostgresCatalog::new(caps)),
        CatalogFamily::MySql => Box::new(mysql::MySqlCatalog::new(caps)),
        CatalogFamily::Sqlite => Box::new(sqlite::SqliteCatalog::new(caps)),
        CatalogFamily::Mssql => Box::new(mssql::MssqlCatalog::new(caps)),
    }
}

/// Builds the actual schema from a live database.
pub struct Introspector {
    dialect: Dialect,
    scope: Scope,
    excluded: Vec<String>,
}

impl Introspector {
    /// Create a new introspector. The default bookkeeping table is excluded.
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            scope: Scope::default(),
            excluded: vec!["migrations".to_string()],
        }
    }

    /// Read this schema (or MySQL database) instead of the current one.
    pub fn with_schema(mut self, schema: Option<String>) -> Self {
        self.scope.schema = schema;
        self
    }

    /// Also read these attached databases.
    pub fn with_databases(mut self, databases: Vec<String>) -> Self {
        self.scope.databases = databases;
        self
    }

    /// Set the bookkeeping table, which is never reported.
    pub fn with_bookkeeping_table(mut self, table: impl Into<String>) -> Self {
        self.excluded = vec![table.into()];
        self
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Read the catalog. With a filter, only the named tables are returned;
    /// tables the filter does not name are left out, never reported as
    /// missing.
    pub async fn introspect(
        &self,
        runner: &mut dyn QueryRunner,
        filter: Option<&[String]>,
    ) -> Result<SchemaModel> {
        let reader = reader_for(self.dialect);
        let tables = reader
            .read_tables(runner, &self.scope)
            .await
            .map_err(|e| match e {
                ShiftError::Introspection(_) => e,
                other => ShiftError::Introspection(other.to_string()),
            })?;

        let mut sorted = BTreeMap::new();
        for mut table in tables {
            if self.excluded.iter().any(|t| *t == table.name) {
                continue;
            }
            if let Some(filter) = filter {
                if !filter.iter().any(|t| *t == table.name) {
                    continue;
                }
            }
            table.synchronize = true;
            sorted.insert(
                (table.qualifier().unwrap_or_default().to_string(), table.name.clone()),
                table,
            );
        }

        debug!(
            dialect = %self.dialect,
            tables = sorted.len(),
            "Introspected schema"
        );
        Ok(SchemaModel {
            tables: sorted.into_values().collect(),
        })
    }

    /// Read one table, or `None` when it does not exist.
    pub async fn get_table(
        &self,
        runner: &mut dyn QueryRunner,
        name: &str,
    ) -> Result<Option<TableDef>> {
        let filter = [name.to_string()];
        let mut model = self.introspect(runner, Some(&filter)).await?;
        Ok(model.remove_table(name))
    }
}

/// Split a comma-separated column list, trimming quotes.
pub(crate) fn split_columns(list: &str) -> Vec<String> {
    list.split(',')
        .map(|c| {
            c.trim()
                .trim_matches(|ch| ch == '"' || ch == '`' || ch == '[' || ch == ']')
                .to_string()
        })
        .filter(|c| !c.is_empty())
        .collect()
}

/// Group rows by table name, keeping catalog order.
pub(crate) fn by_table<T>(items: Vec<(String, T)>) -> BTreeMap<String, Vec<T>> {
    let mut grouped: BTreeMap<String, Vec<T>> = BTreeMap::new();
    for (table, item) in items {
        grouped.entry(table).or_default().push(item);
    }
    grouped
}

/// Assemble foreign keys from one row per key column, ordered by key name
/// and column position. Rows carry `constraint_name`, `column_name`,
/// `referenced_table`, `referenced_column`, the owning and referenced schema
/// and the two referential actions.
pub(crate) fn foreign_keys_by_name(rows: &[Row]) -> Result<Vec<ForeignKeyDef>> {
    let mut keys: Vec<ForeignKeyDef> = Vec::new();
    for row in rows {
        let name = row.get_string("constraint_name")?;
        let column = row.get_string("column_name")?;
        let referenced = row.get_string("referenced_column")?;
        if let Some(fk) = keys.iter_mut().find(|k| k.name.as_deref() == Some(name.as_str())) {
            fk.columns.push(column);
            fk.referenced_columns.push(referenced);
            continue;
        }
        let own_schema = row.get_str("table_schema");
        keys.push(ForeignKeyDef {
            name: Some(name),
            columns: vec![column],
            referenced_table: row.get_string("referenced_table")?,
            referenced_schema: row
                .get_str("referenced_schema")
                .filter(|s| Some(s) != own_schema.as_ref()),
            referenced_database: None,
            referenced_columns: vec![referenced],
            on_delete: ReferentialAction::parse(&row.get_str("on_delete").unwrap_or_default()),
            on_update: ReferentialAction::parse(&row.get_str("on_update").unwrap_or_default()),
        });
    }
    Ok(keys)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbshift_core::testing::MockQueryRunner;

    #[test]
    fn test_split_columns() {
        assert_eq!(split_columns("\"a\", `b`,[c]"), vec!["a", "b", "c"]);
        assert!(split_columns("").is_empty());
    }

    #[tokio::test]
    async fn test_catalog_failure_is_introspection_error() {
        let mock = MockQueryRunner::new(Dialect::Postgres);
        mock.fail_on("information_schema", "permission denied");

        let mut runner = mock.clone();
        let err = Introspector::new(Dialect::Postgres)
            .introspect(&mut runner, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ShiftError::Introspection(_)));
        assert!(err.to_string().contains("permission denied"));
    }
}
