//! SQL Server catalog reader.

use std::collections::BTreeMap;

use dbshift_core::db::{QueryFuture, QueryRunner, Row};
use dbshift_core::dialect::DialectCapabilities;
use dbshift_core::error::Result;
use dbshift_core::schema::{
    CheckDef, ColumnDef, GeneratedColumn, GeneratedKind, Generation, IndexDef, LogicalType,
    TableDef, UniqueDef,
};

use super::{by_table, foreign_keys_by_name, CatalogReader, Scope};

const COLUMNS_SQL: &str = "SELECT c.TABLE_NAME AS table_name, c.COLUMN_NAME AS column_name, \
c.DATA_TYPE AS data_type, CAST(c.CHARACTER_MAXIMUM_LENGTH AS bigint) AS char_length, \
CAST(c.NUMERIC_PRECISION AS bigint) AS numeric_precision, CAST(c.NUMERIC_SCALE AS bigint) AS numeric_scale, \
c.IS_NULLABLE AS is_nullable, c.COLUMN_DEFAULT AS column_default, c.COLLATION_NAME AS collation_name, \
COLUMNPROPERTY(OBJECT_ID(QUOTENAME(c.TABLE_SCHEMA) + '.' + QUOTENAME(c.TABLE_NAME)), c.COLUMN_NAME, 'IsIdentity') AS is_identity, \
cc.definition AS computed_definition, CAST(cc.is_persisted AS int) AS is_persisted \
FROM INFORMATION_SCHEMA.COLUMNS c \
JOIN INFORMATION_SCHEMA.TABLES t ON t.TABLE_SCHEMA = c.TABLE_SCHEMA AND t.TABLE_NAME = c.TABLE_NAME \
AND t.TABLE_TYPE = 'BASE TABLE' \
LEFT JOIN sys.computed_columns cc ON cc.object_id = OBJECT_ID(QUOTENAME(c.TABLE_SCHEMA) + '.' + QUOTENAME(c.TABLE_NAME)) \
AND cc.name = c.COLUMN_NAME \
WHERE c.TABLE_SCHEMA = {schema} \
ORDER BY c.TABLE_NAME, c.ORDINAL_POSITION";

const KEYS_SQL: &str = "SELECT tc.TABLE_NAME AS table_name, tc.CONSTRAINT_NAME AS constraint_name, \
tc.CONSTRAINT_TYPE AS constraint_type, k.COLUMN_NAME AS column_name \
FROM INFORMATION_SCHEMA.TABLE_CONSTRAINTS tc \
JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE k ON k.CONSTRAINT_SCHEMA = tc.CONSTRAINT_SCHEMA \
AND k.CONSTRAINT_NAME = tc.CONSTRAINT_NAME \
WHERE tc.TABLE_SCHEMA = {schema} AND tc.CONSTRAINT_TYPE IN ('PRIMARY KEY', 'UNIQUE') \
ORDER BY tc.TABLE_NAME, tc.CONSTRAINT_NAME, k.ORDINAL_POSITION";

const CHECKS_SQL: &str = "SELECT tc.TABLE_NAME AS table_name, tc.CONSTRAINT_NAME AS constraint_name, \
cc.CHECK_CLAUSE AS check_clause \
FROM INFORMATION_SCHEMA.TABLE_CONSTRAINTS tc \
JOIN INFORMATION_SCHEMA.CHECK_CONSTRAINTS cc ON cc.CONSTRAINT_SCHEMA = tc.CONSTRAINT_SCHEMA \
AND cc.CONSTRAINT_NAME = tc.CONSTRAINT_NAME \
WHERE tc.TABLE_SCHEMA = {schema} AND tc.CONSTRAINT_TYPE = 'CHECK' \
ORDER BY tc.TABLE_NAME, tc.CONSTRAINT_NAME";

const FOREIGN_KEYS_SQL: &str = "SELECT OBJECT_SCHEMA_NAME(fk.parent_object_id) AS table_schema, \
OBJECT_NAME(fk.parent_object_id) AS table_name, fk.name AS constraint_name, \
COL_NAME(fkc.parent_object_id, fkc.parent_column_id) AS column_name, \
OBJECT_SCHEMA_NAME(fk.referenced_object_id) AS referenced_schema, \
OBJECT_NAME(fk.referenced_object_id) AS referenced_table, \
COL_NAME(fkc.referenced_object_id, fkc.referenced_column_id) AS referenced_column, \
fk.delete_referential_action_desc AS on_delete, fk.update_referential_action_desc AS on_update \
FROM sys.foreign_keys fk \
JOIN sys.foreign_key_columns fkc ON fkc.constraint_object_id = fk.object_id \
WHERE OBJECT_SCHEMA_NAME(fk.parent_object_id) = {schema} \
ORDER BY OBJECT_NAME(fk.parent_object_id), fk.name, fkc.constraint_column_id";

const INDEXES_SQL: &str = "SELECT t.name AS table_name, i.name AS index_name, \
CAST(i.is_unique AS int) AS is_unique, i.filter_definition AS predicate, c.name AS column_name \
FROM sys.indexes i \
JOIN sys.tables t ON t.object_id = i.object_id \
JOIN sys.index_columns ic ON ic.object_id = i.object_id AND ic.index_id = i.index_id \
JOIN sys.columns c ON c.object_id = ic.object_id AND c.column_id = ic.column_id \
WHERE SCHEMA_NAME(t.schema_id) = {schema} AND i.is_primary_key = 0 \
AND i.is_unique_constraint = 0 AND i.type > 0 AND ic.is_included_column = 0 \
ORDER BY t.name, i.name, ic.key_ordinal";

pub(crate) struct MssqlCatalog {
    caps: &'static DialectCapabilities,
}

impl MssqlCatalog {
    pub(crate) fn new(caps: &'static DialectCapabilities) -> Self {
        Self { caps }
    }

    fn spelled_type(row: &Row) -> String {
        let data_type = row.get_str("data_type").unwrap_or_default();
        match data_type.as_str() {
            "nvarchar" | "varchar" | "nchar" | "char" | "varbinary" | "binary" => {
                match row.get_i64("char_length") {
                    Some(-1) => format!("{}(max)", data_type),
                    Some(len) => format!("{}({})", data_type, len),
                    None => data_type,
                }
            }
            "decimal" | "numeric" => {
                match (row.get_i64("numeric_precision"), row.get_i64("numeric_scale")) {
                    (Some(p), Some(s)) => format!("{}({},{})", data_type, p, s),
                    _ => data_type,
                }
            }
            _ => data_type,
        }
    }

    fn column(&self, row: &Row) -> Result<ColumnDef> {
        let mut column = ColumnDef::new(row.get_string("column_name")?, LogicalType::Text);
        self.caps
            .parse_type(&Self::spelled_type(row))
            .apply_to(&mut column);
        column.nullable = row.get_bool("is_nullable").unwrap_or(true);
        column.collation = row.get_str("collation_name");

        if row.get_i64("is_identity") == Some(1) {
            column.generation = Generation::Increment;
        }
        if let Some(raw) = row.get_str("column_default") {
            if self.caps.is_uuid_default(&raw) {
                column.generation = Generation::Uuid;
            } else {
                column.default = Some(raw);
            }
        }
        if let Some(expression) = row.get_str("computed_definition") {
            let kind = if row.get_i64("is_persisted") == Some(1) {
                GeneratedKind::Stored
            } else {
                GeneratedKind::Virtual
            };
            column.generated = Some(GeneratedColumn { expression, kind });
        }
        Ok(column)
    }
}

impl CatalogReader for MssqlCatalog {
    fn read_tables<'a>(
        &'a self,
        runner: &'a mut dyn QueryRunner,
        scope: &'a Scope,
    ) -> QueryFuture<'a, Vec<TableDef>> {
        Box::pin(async move {
            let schema = match &scope.schema {
                Some(s) => self.caps.quote_literal(s),
                None => "SCHEMA_NAME()".to_string(),
            };
            let column_rows = runner
                .query(&COLUMNS_SQL.replace("{schema}", &schema), &[])
                .await?;
            let key_rows = runner
                .query(&KEYS_SQL.replace("{schema}", &schema), &[])
                .await?;
            let check_rows = runner
                .query(&CHECKS_SQL.replace("{schema}", &schema), &[])
                .await?;
            let fk_rows = runner
                .query(&FOREIGN_KEYS_SQL.replace("{schema}", &schema), &[])
                .await?;
            let index_rows = runner
                .query(&INDEXES_SQL.replace("{schema}", &schema), &[])
                .await?;

            let mut tables: BTreeMap<String, TableDef> = BTreeMap::new();
            for row in &column_rows {
                let table_name = row.get_string("table_name")?;
                let column = self.column(row)?;
                tables
                    .entry(table_name.clone())
                    .or_insert_with(|| {
                        let mut table = TableDef::new(table_name);
                        table.schema = scope.schema.clone();
                        table
                    })
                    .columns
                    .push(column);
            }

            for row in &key_rows {
                let Some(table) = tables.get_mut(&row.get_string("table_name")?) else {
                    continue;
                };
                let name = row.get_string("constraint_name")?;
                let column = row.get_string("column_name")?;
                if row.get_str("constraint_type").as_deref() == Some("PRIMARY KEY") {
                    if let Some(col) = table.get_column_mut(&column) {
                        col.primary = true;
                        col.nullable = false;
                    }
                    table.primary_key_name = Some(name);
                    continue;
                }
                match table
                    .uniques
                    .iter_mut()
                    .find(|u| u.name.as_deref() == Some(name.as_str()))
                {
                    Some(unique) => unique.columns.push(column),
                    None => table.uniques.push(UniqueDef {
                        name: Some(name),
                        columns: vec![column],
                    }),
                }
            }

            for row in &check_rows {
                if let Some(table) = tables.get_mut(&row.get_string("table_name")?) {
                    table.checks.push(
                        CheckDef::new(row.get_string("check_clause")?)
                            .named(row.get_string("constraint_name")?),
                    );
                }
            }

            let mut fk_parts = Vec::with_capacity(fk_rows.len());
            for row in fk_rows {
                fk_parts.push((row.get_string("table_name")?, row));
            }
            for (table_name, rows) in by_table(fk_parts) {
                if let Some(table) = tables.get_mut(&table_name) {
                    table.foreign_keys = foreign_keys_by_name(&rows)?;
                }
            }

            for row in &index_rows {
                let Some(table) = tables.get_mut(&row.get_string("table_name")?) else {
                    continue;
                };
                let name = row.get_string("index_name")?;
                let column = row.get_string("column_name")?;
                match table
                    .indices
                    .iter_mut()
                    .find(|i| i.name.as_deref() == Some(name.as_str()))
                {
                    Some(index) => index.columns.push(column),
                    None => table.indices.push(IndexDef {
                        name: Some(name),
                        columns: vec![column],
                        unique: row.get_i64("is_unique") == Some(1),
                        predicate: row.get_str("predicate"),
                    }),
                }
            }

            Ok(tables.into_values().collect())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbshift_core::db::Value;
    use dbshift_core::dialect::Dialect;
    use dbshift_core::schema::ReferentialAction;
    use dbshift_core::testing::MockQueryRunner;

    fn column_row(name: &str, data_type: &str, len: Option<i64>, default: Option<&str>, identity: i64) -> Row {
        Row::from_pairs([
            ("table_name", Value::from("post")),
            ("column_name", Value::from(name)),
            ("data_type", Value::from(data_type)),
            ("char_length", Value::from(len)),
            ("numeric_precision", Value::Null),
            ("numeric_scale", Value::Null),
            ("is_nullable", Value::from("NO")),
            ("column_default", Value::from(default)),
            ("collation_name", Value::Null),
            ("is_identity", Value::Int(identity)),
            ("computed_definition", Value::Null),
            ("is_persisted", Value::Null),
        ])
    }

    #[tokio::test]
    async fn test_reads_mssql_catalog() {
        let mock = MockQueryRunner::new(Dialect::Mssql);
        mock.on_query(
            "INFORMATION_SCHEMA.COLUMNS",
            vec![
                column_row("id", "int", None, None, 1),
                column_row("body", "nvarchar", Some(-1), None, 0),
                column_row("title", "nvarchar", Some(50), Some("(N'draft')"), 0),
                column_row("author_id", "int", None, None, 0),
            ],
        );
        mock.on_query(
            "KEY_COLUMN_USAGE",
            vec![Row::from_pairs([
                ("table_name", Value::from("post")),
                ("constraint_name", Value::from("PK_post")),
                ("constraint_type", Value::from("PRIMARY KEY")),
                ("column_name", Value::from("id")),
            ])],
        );
        mock.on_query(
            "sys.foreign_keys",
            vec![Row::from_pairs([
                ("table_schema", Value::from("dbo")),
                ("table_name", Value::from("post")),
                ("constraint_name", Value::from("FK_author")),
                ("column_name", Value::from("author_id")),
                ("referenced_schema", Value::from("dbo")),
                ("referenced_table", Value::from("author")),
                ("referenced_column", Value::from("id")),
                ("on_delete", Value::from("SET_NULL")),
                ("on_update", Value::from("NO_ACTION")),
            ])],
        );

        let reader = MssqlCatalog::new(Dialect::Mssql.capabilities());
        let mut runner = mock.clone();
        let tables = reader
            .read_tables(&mut runner, &Scope::default())
            .await
            .unwrap();
        let post = &tables[0];

        let id = post.get_column("id").unwrap();
        assert!(id.primary);
        assert_eq!(id.generation, Generation::Increment);
        assert_eq!(post.get_column("body").unwrap().column_type, LogicalType::Text);
        let title = post.get_column("title").unwrap();
        assert_eq!(title.length, Some(50));
        assert_eq!(title.default.as_deref(), Some("(N'draft')"));
        assert_eq!(post.primary_key_name.as_deref(), Some("PK_post"));
        assert_eq!(post.foreign_keys[0].on_delete, ReferentialAction::SetNull);
        mock.assert_executed("SCHEMA_NAME\\(\\)");
    }
}
