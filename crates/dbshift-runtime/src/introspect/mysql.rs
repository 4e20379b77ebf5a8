//! MySQL-family catalog reader (MySQL, MariaDB).

use std::collections::BTreeMap;

use dbshift_core::db::{QueryFuture, QueryRunner, Row};
use dbshift_core::dialect::{Dialect, DialectCapabilities};
use dbshift_core::error::Result;
use dbshift_core::schema::{
    CheckDef, ColumnDef, ForeignKeyDef, GeneratedColumn, GeneratedKind, Generation, IndexDef,
    LogicalType, TableDef,
};

use super::{by_table, foreign_keys_by_name, CatalogReader, Scope};

const COLUMNS_SQL: &str = "SELECT TABLE_SCHEMA AS table_schema, TABLE_NAME AS table_name, \
COLUMN_NAME AS column_name, COLUMN_TYPE AS column_type, IS_NULLABLE AS is_nullable, \
COLUMN_DEFAULT AS column_default, EXTRA AS extra, COLUMN_KEY AS column_key, \
COLUMN_COMMENT AS column_comment, COLLATION_NAME AS collation_name, \
CHARACTER_SET_NAME AS charset, GENERATION_EXPRESSION AS generation_expression \
FROM information_schema.COLUMNS WHERE TABLE_SCHEMA = {schema} \
AND TABLE_NAME IN (SELECT TABLE_NAME FROM information_schema.TABLES \
WHERE TABLE_SCHEMA = {schema} AND TABLE_TYPE = 'BASE TABLE') \
ORDER BY TABLE_NAME, ORDINAL_POSITION";

const INDEXES_SQL: &str = "SELECT TABLE_NAME AS table_name, INDEX_NAME AS index_name, \
NON_UNIQUE AS non_unique, COLUMN_NAME AS column_name, SEQ_IN_INDEX AS seq \
FROM information_schema.STATISTICS WHERE TABLE_SCHEMA = {schema} \
ORDER BY TABLE_NAME, INDEX_NAME, SEQ_IN_INDEX";

const FOREIGN_KEYS_SQL: &str = "SELECT k.TABLE_SCHEMA AS table_schema, k.TABLE_NAME AS table_name, \
k.CONSTRAINT_NAME AS constraint_name, k.COLUMN_NAME AS column_name, \
k.REFERENCED_TABLE_SCHEMA AS referenced_schema, k.REFERENCED_TABLE_NAME AS referenced_table, \
k.REFERENCED_COLUMN_NAME AS referenced_column, r.DELETE_RULE AS on_delete, r.UPDATE_RULE AS on_update \
FROM information_schema.KEY_COLUMN_USAGE k \
JOIN information_schema.REFERENTIAL_CONSTRAINTS r ON r.CONSTRAINT_SCHEMA = k.CONSTRAINT_SCHEMA \
AND r.CONSTRAINT_NAME = k.CONSTRAINT_NAME AND r.TABLE_NAME = k.TABLE_NAME \
WHERE k.TABLE_SCHEMA = {schema} AND k.REFERENCED_TABLE_NAME IS NOT NULL \
ORDER BY k.TABLE_NAME, k.CONSTRAINT_NAME, k.ORDINAL_POSITION";

const CHECKS_SQL: &str = "SELECT tc.TABLE_NAME AS table_name, tc.CONSTRAINT_NAME AS constraint_name, \
cc.CHECK_CLAUSE AS check_clause \
FROM information_schema.TABLE_CONSTRAINTS tc \
JOIN information_schema.CHECK_CONSTRAINTS cc ON cc.CONSTRAINT_SCHEMA = tc.CONSTRAINT_SCHEMA \
AND cc.CONSTRAINT_NAME = tc.CONSTRAINT_NAME \
WHERE tc.TABLE_SCHEMA = {schema} AND tc.CONSTRAINT_TYPE = 'CHECK' \
ORDER BY tc.TABLE_NAME, tc.CONSTRAINT_NAME";

pub(crate) struct MySqlCatalog {
    caps: &'static DialectCapabilities,
}

impl MySqlCatalog {
    pub(crate) fn new(caps: &'static DialectCapabilities) -> Self {
        Self { caps }
    }

    fn column(&self, row: &Row) -> Result<ColumnDef> {
        let mut column = ColumnDef::new(row.get_string("column_name")?, LogicalType::Text);
        self.caps
            .parse_type(&row.get_str("column_type").unwrap_or_default())
            .apply_to(&mut column);

        column.primary = row.get_str("column_key").as_deref() == Some("PRI");
        column.nullable = !column.primary && row.get_bool("is_nullable").unwrap_or(true);
        column.comment = row.get_str("column_comment").filter(|c| !c.is_empty());
        column.collation = row.get_str("collation_name");
        column.charset = row.get_str("charset");

        let extra = row.get_str("extra").unwrap_or_default();
        let extra_lower = extra.to_ascii_lowercase();
        if extra_lower.contains("auto_increment") {
            column.generation = Generation::Increment;
        }
        if let Some(pos) = extra_lower.find("on update ") {
            column.on_update = Some(extra[pos + "on update ".len()..].trim().to_string());
        }
        if extra_lower.contains("virtual generated") || extra_lower.contains("stored generated") {
            let kind = if extra_lower.contains("stored") {
                GeneratedKind::Stored
            } else {
                GeneratedKind::Virtual
            };
            if let Some(expression) = row.get_str("generation_expression").filter(|e| !e.is_empty()) {
                column.generated = Some(GeneratedColumn { expression, kind });
            }
        }

        if let Some(raw) = row.get_str("column_default") {
            let expression_default = extra_lower.contains("default_generated");
            if expression_default && self.caps.is_uuid_default(&raw) {
                column.generation = Generation::Uuid;
            } else {
                column.default = Some(self.default_expression(&column, raw, expression_default));
            }
        }
        Ok(column)
    }

    /// MySQL reports literal defaults unquoted; MariaDB already quotes them.
    fn default_expression(&self, column: &ColumnDef, raw: String, expression: bool) -> String {
        if self.caps.dialect == Dialect::MariaDb || expression {
            return raw;
        }
        let numeric = column.column_type.is_integer()
            || matches!(
                column.column_type,
                LogicalType::Decimal | LogicalType::Real | LogicalType::Double | LogicalType::Boolean
            );
        if numeric || raw.to_ascii_uppercase().starts_with("CURRENT_TIMESTAMP") {
            raw
        } else {
            self.caps.quote_literal(&raw)
        }
    }
}

impl CatalogReader for MySqlCatalog {
    fn read_tables<'a>(
        &'a self,
        runner: &'a mut dyn QueryRunner,
        scope: &'a Scope,
    ) -> QueryFuture<'a, Vec<TableDef>> {
        Box::pin(async move {
            let schema = match &scope.schema {
                Some(s) => self.caps.quote_literal(s),
                None => "DATABASE()".to_string(),
            };
            let column_rows = runner
                .query(&COLUMNS_SQL.replace("{schema}", &schema), &[])
                .await?;
            let index_rows = runner
                .query(&INDEXES_SQL.replace("{schema}", &schema), &[])
                .await?;
            let fk_rows = runner
                .query(&FOREIGN_KEYS_SQL.replace("{schema}", &schema), &[])
                .await?;
            let check_rows = runner
                .query(&CHECKS_SQL.replace("{schema}", &schema), &[])
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

            let mut fk_parts = Vec::with_capacity(fk_rows.len());
            for row in fk_rows {
                fk_parts.push((row.get_string("table_name")?, row));
            }
            for (table_name, rows) in by_table(fk_parts) {
                if let Some(table) = tables.get_mut(&table_name) {
                    table.foreign_keys = foreign_keys_by_name(&rows)?;
                }
            }

            let mut index_parts = Vec::with_capacity(index_rows.len());
            for row in index_rows {
                index_parts.push((row.get_string("table_name")?, row));
            }
            for (table_name, rows) in by_table(index_parts) {
                if let Some(table) = tables.get_mut(&table_name) {
                    table.indices = indices(&rows, &table.foreign_keys)?;
                }
            }

            for row in &check_rows {
                let Some(table) = tables.get_mut(&row.get_string("table_name")?) else {
                    continue;
                };
                let name = row.get_string("constraint_name")?;
                let clause = row.get_string("check_clause")?;
                if is_json_check(&name, &clause) {
                    continue;
                }
                table.checks.push(CheckDef::new(clause).named(name));
            }

            Ok(tables.into_values().collect())
        })
    }
}

/// Secondary indices. The primary key and the indices InnoDB creates to back
/// foreign keys are not reported.
fn indices(rows: &[Row], foreign_keys: &[ForeignKeyDef]) -> Result<Vec<IndexDef>> {
    let mut out: Vec<IndexDef> = Vec::new();
    let mut functional: Vec<String> = Vec::new();
    for row in rows {
        let name = row.get_string("index_name")?;
        if name == "PRIMARY" || foreign_keys.iter().any(|fk| fk.name() == name) {
            continue;
        }
        let Some(column) = row.get_str("column_name") else {
            functional.push(name);
            continue;
        };
        match out.iter_mut().find(|i| i.name.as_deref() == Some(name.as_str())) {
            Some(index) => index.columns.push(column),
            None => out.push(IndexDef {
                name: Some(name),
                columns: vec![column],
                unique: row.get_i64("non_unique") == Some(0),
                predicate: None,
            }),
        }
    }
    out.retain(|i| !functional.iter().any(|f| i.name.as_deref() == Some(f.as_str())));
    Ok(out)
}

/// MariaDB adds `CONSTRAINT col CHECK (json_valid(col))` to JSON columns.
fn is_json_check(name: &str, clause: &str) -> bool {
    let clause = clause.trim().to_ascii_lowercase();
    let name = name.to_ascii_lowercase();
    clause == format!("json_valid(`{}`)", name) || clause == format!("json_valid({})", name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbshift_core::db::Value;
    use dbshift_core::testing::MockQueryRunner;

    fn column_row(name: &str, ty: &str, key: &str, default: Option<&str>, extra: &str) -> Row {
        Row::from_pairs([
            ("table_schema", Value::from("app")),
            ("table_name", Value::from("post")),
            ("column_name", Value::from(name)),
            ("column_type", Value::from(ty)),
            ("is_nullable", Value::from(if key == "PRI" { "NO" } else { "YES" })),
            ("column_default", Value::from(default)),
            ("extra", Value::from(extra)),
            ("column_key", Value::from(key)),
            ("column_comment", Value::from("")),
            ("collation_name", Value::Null),
            ("charset", Value::Null),
            ("generation_expression", Value::from("")),
        ])
    }

    fn stat(index: &str, column: &str, non_unique: i64, seq: i64) -> Row {
        Row::from_pairs([
            ("table_name", Value::from("post")),
            ("index_name", Value::from(index)),
            ("non_unique", Value::Int(non_unique)),
            ("column_name", Value::from(column)),
            ("seq", Value::Int(seq)),
        ])
    }

    #[tokio::test]
    async fn test_reads_mysql_catalog() {
        let mock = MockQueryRunner::new(Dialect::MySql);
        mock.on_query(
            "information_schema.COLUMNS",
            vec![
                column_row("id", "int", "PRI", None, "auto_increment"),
                column_row("title", "varchar(50)", "", Some("draft"), ""),
                column_row(
                    "updated_at",
                    "timestamp",
                    "",
                    Some("CURRENT_TIMESTAMP"),
                    "DEFAULT_GENERATED on update CURRENT_TIMESTAMP",
                ),
                column_row("author_id", "int", "MUL", None, ""),
            ],
        );
        mock.on_query(
            "information_schema.STATISTICS",
            vec![
                stat("PRIMARY", "id", 0, 1),
                stat("FK_author", "author_id", 1, 1),
                stat("UQ_title", "title", 0, 1),
            ],
        );
        mock.on_query(
            "KEY_COLUMN_USAGE",
            vec![Row::from_pairs([
                ("table_schema", Value::from("app")),
                ("table_name", Value::from("post")),
                ("constraint_name", Value::from("FK_author")),
                ("column_name", Value::from("author_id")),
                ("referenced_schema", Value::from("app")),
                ("referenced_table", Value::from("author")),
                ("referenced_column", Value::from("id")),
                ("on_delete", Value::from("CASCADE")),
                ("on_update", Value::from("NO ACTION")),
            ])],
        );

        let reader = MySqlCatalog::new(Dialect::MySql.capabilities());
        let mut runner = mock.clone();
        let tables = reader
            .read_tables(&mut runner, &Scope::default())
            .await
            .unwrap();
        let post = &tables[0];

        assert_eq!(post.get_column("id").unwrap().generation, Generation::Increment);
        assert_eq!(post.get_column("title").unwrap().default.as_deref(), Some("'draft'"));
        let updated = post.get_column("updated_at").unwrap();
        assert_eq!(updated.default.as_deref(), Some("CURRENT_TIMESTAMP"));
        assert_eq!(updated.on_update.as_deref(), Some("CURRENT_TIMESTAMP"));
        assert_eq!(updated.column_type, LogicalType::TimestampTz);

        assert_eq!(post.indices.len(), 1);
        assert!(post.indices[0].unique);
        assert_eq!(post.foreign_keys[0].referenced_schema, None);
        mock.assert_executed("TABLE_SCHEMA = DATABASE\\(\\)");
    }

    #[test]
    fn test_mariadb_json_check_is_hidden() {
        assert!(is_json_check("data", "json_valid(`data`)"));
        assert!(!is_json_check("CHK_x", "json_valid(`data`)"));
    }

    #[test]
    fn test_mariadb_defaults_kept_verbatim() {
        let reader = MySqlCatalog::new(Dialect::MariaDb.capabilities());
        let column = reader
            .column(&column_row("title", "varchar(50)", "", Some("'draft'"), ""))
            .unwrap();
        assert_eq!(column.default.as_deref(), Some("'draft'"));
    }
}
