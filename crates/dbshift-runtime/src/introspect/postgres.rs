//! Postgres-family catalog reader (Postgres, CockroachDB).
//!
//! Every catalog column is cast to `text` or `int8` in SQL so the rows decode
//! through the generic driver without Postgres-specific types.

use std::collections::BTreeMap;

use dbshift_core::db::{QueryFuture, QueryRunner, Row};
use dbshift_core::dialect::DialectCapabilities;
use dbshift_core::error::Result;
use dbshift_core::schema::{
    CheckDef, ColumnDef, ExclusionDef, ForeignKeyDef, GeneratedColumn, GeneratedKind, Generation,
    IndexDef, LogicalType, ReferentialAction, TableDef, UniqueDef,
};

use super::{by_table, split_columns, CatalogReader, Scope};

const COLUMNS_SQL: &str = r#"SELECT CAST(c.table_name AS text) AS table_name,
 CAST(c.column_name AS text) AS column_name,
 CAST(c.data_type AS text) AS data_type,
 CAST(c.udt_name AS text) AS udt_name,
 CAST(c.character_maximum_length AS int8) AS char_length,
 CAST(c.numeric_precision AS int8) AS numeric_precision,
 CAST(c.numeric_scale AS int8) AS numeric_scale,
 CAST(c.is_nullable AS text) AS is_nullable,
 CAST(c.column_default AS text) AS column_default,
 CAST(c.is_identity AS text) AS is_identity,
 CAST(c.is_generated AS text) AS is_generated,
 CAST(c.generation_expression AS text) AS generation_expression,
 CAST(c.collation_name AS text) AS collation_name,
 col_description(CAST(quote_ident(c.table_schema) || '.' || quote_ident(c.table_name) AS regclass), CAST(c.ordinal_position AS int4)) AS column_comment
FROM information_schema.columns c
JOIN information_schema.tables t ON t.table_schema = c.table_schema AND t.table_name = c.table_name
WHERE t.table_type = 'BASE TABLE' AND c.table_schema = {schema}
ORDER BY c.table_name, c.ordinal_position"#;

const CONSTRAINTS_SQL: &str = r#"SELECT CAST(cl.relname AS text) AS table_name,
 CAST(con.conname AS text) AS constraint_name,
 CAST(con.contype AS text) AS constraint_type,
 pg_get_constraintdef(con.oid) AS definition,
 (SELECT string_agg(CAST(a.attname AS text), ',' ORDER BY k.ord)
    FROM unnest(con.conkey) WITH ORDINALITY AS k(attnum, ord)
    JOIN pg_attribute a ON a.attrelid = con.conrelid AND a.attnum = k.attnum) AS columns,
 CAST(fcl.relname AS text) AS referenced_table,
 CAST(fns.nspname AS text) AS referenced_schema,
 CAST(ns.nspname AS text) AS table_schema,
 (SELECT string_agg(CAST(a.attname AS text), ',' ORDER BY k.ord)
    FROM unnest(con.confkey) WITH ORDINALITY AS k(attnum, ord)
    JOIN pg_attribute a ON a.attrelid = con.confrelid AND a.attnum = k.attnum) AS referenced_columns,
 CAST(con.confdeltype AS text) AS on_delete,
 CAST(con.confupdtype AS text) AS on_update
FROM pg_constraint con
JOIN pg_class cl ON cl.oid = con.conrelid
JOIN pg_namespace ns ON ns.oid = cl.relnamespace
LEFT JOIN pg_class fcl ON fcl.oid = con.confrelid
LEFT JOIN pg_namespace fns ON fns.oid = fcl.relnamespace
WHERE ns.nspname = {schema} AND con.contype IN ('p', 'u', 'c', 'f', 'x')
ORDER BY cl.relname, con.conname"#;

const INDEXES_SQL: &str = r#"SELECT CAST(t.relname AS text) AS table_name,
 CAST(i.relname AS text) AS index_name,
 CAST(ix.indisunique AS text) AS is_unique,
 pg_get_expr(ix.indpred, ix.indrelid) AS predicate,
 CAST(ix.indexprs IS NOT NULL AS text) AS has_expressions,
 (SELECT string_agg(CAST(a.attname AS text), ',' ORDER BY k.ord)
    FROM unnest(CAST(ix.indkey AS int2[])) WITH ORDINALITY AS k(attnum, ord)
    JOIN pg_attribute a ON a.attrelid = ix.indrelid AND a.attnum = k.attnum) AS columns
FROM pg_index ix
JOIN pg_class i ON i.oid = ix.indexrelid
JOIN pg_class t ON t.oid = ix.indrelid
JOIN pg_namespace ns ON ns.oid = t.relnamespace
WHERE ns.nspname = {schema}
  AND NOT EXISTS (SELECT 1 FROM pg_constraint c WHERE c.conindid = ix.indexrelid AND c.contype IN ('p', 'u', 'x'))
ORDER BY t.relname, i.relname"#;

pub(crate) struct PostgresCatalog {
    caps: &'static DialectCapabilities,
}

impl PostgresCatalog {
    pub(crate) fn new(caps: &'static DialectCapabilities) -> Self {
        Self { caps }
    }

    /// Rebuild the full type spelling from `information_schema` parts.
    fn spelled_type(&self, row: &Row) -> String {
        let data_type = row.get_str("data_type").unwrap_or_default();
        let udt = row.get_str("udt_name").unwrap_or_default();
        match data_type.as_str() {
            "character varying" | "character" => match row.get_i64("char_length") {
                Some(len) => format!("{}({})", data_type, len),
                None => data_type,
            },
            "numeric" => match (row.get_i64("numeric_precision"), row.get_i64("numeric_scale")) {
                (Some(p), Some(s)) => format!("numeric({},{})", p, s),
                (Some(p), None) => format!("numeric({})", p),
                _ => data_type,
            },
            // CockroachDB's INT is 8 bytes, so integer widths are spelled by
            // the dialect's own names.
            "smallint" => self.caps.types.small_int.to_string(),
            "integer" => self.caps.types.integer.to_string(),
            "bigint" => self.caps.types.big_int.to_string(),
            "USER-DEFINED" => udt,
            "ARRAY" => format!("{}[]", udt.trim_start_matches('_')),
            _ => data_type,
        }
    }

    fn column(&self, row: &Row) -> Result<ColumnDef> {
        let mut column = ColumnDef::new(row.get_string("column_name")?, LogicalType::Text);
        self.caps.parse_type(&self.spelled_type(row)).apply_to(&mut column);
        column.nullable = row.get_bool("is_nullable").unwrap_or(true);
        column.collation = row.get_str("collation_name");
        column.comment = row.get_str("column_comment");

        let default = row.get_str("column_default");
        if row.get_bool("is_identity") == Some(true) {
            column.generation = Generation::Identity;
        } else if let Some(expr) = default.as_deref() {
            if self.caps.is_increment_default(expr) {
                column.generation = Generation::Increment;
            } else if self.caps.is_uuid_default(expr) {
                column.generation = Generation::Uuid;
            } else {
                column.default = default.clone();
            }
        }

        if row.get_str("is_generated").as_deref() == Some("ALWAYS") {
            if let Some(expression) = row.get_str("generation_expression") {
                column.generated = Some(GeneratedColumn {
                    expression,
                    kind: GeneratedKind::Stored,
                });
            }
        }
        Ok(column)
    }

    fn apply_constraint(&self, table: &mut TableDef, row: &Row) -> Result<()> {
        let name = row.get_string("constraint_name")?;
        let columns = split_columns(&row.get_str("columns").unwrap_or_default());
        let definition = row.get_str("definition").unwrap_or_default();

        match row.get_string("constraint_type")?.as_str() {
            "p" => {
                for column in &columns {
                    if let Some(col) = table.get_column_mut(column) {
                        col.primary = true;
                        col.nullable = false;
                    }
                }
                table.primary_key_name = Some(name);
            }
            "u" => table.uniques.push(UniqueDef {
                name: Some(name),
                columns,
            }),
            "c" => {
                let expression = strip_keyword(&definition, "CHECK");
                let expression = expression
                    .strip_suffix(" NOT VALID")
                    .unwrap_or(&expression)
                    .to_string();
                table.checks.push(CheckDef::new(expression).named(name));
            }
            "x" => table
                .exclusions
                .push(ExclusionDef::new(strip_keyword(&definition, "EXCLUDE")).named(name)),
            "f" => {
                let referenced_schema = row.get_str("referenced_schema");
                let own_schema = row.get_str("table_schema");
                table.foreign_keys.push(ForeignKeyDef {
                    name: Some(name),
                    columns,
                    referenced_table: row.get_string("referenced_table")?,
                    referenced_schema: referenced_schema.filter(|s| Some(s) != own_schema.as_ref()),
                    referenced_database: None,
                    referenced_columns: split_columns(
                        &row.get_str("referenced_columns").unwrap_or_default(),
                    ),
                    on_delete: ReferentialAction::parse(&row.get_str("on_delete").unwrap_or_default()),
                    on_update: ReferentialAction::parse(&row.get_str("on_update").unwrap_or_default()),
                });
            }
            _ => {}
        }
        Ok(())
    }
}

impl CatalogReader for PostgresCatalog {
    fn read_tables<'a>(
        &'a self,
        runner: &'a mut dyn QueryRunner,
        scope: &'a Scope,
    ) -> QueryFuture<'a, Vec<TableDef>> {
        Box::pin(async move {
            let schema = match &scope.schema {
                Some(s) => self.caps.quote_literal(s),
                None => "current_schema()".to_string(),
            };

            let column_rows = runner
                .query(&COLUMNS_SQL.replace("{schema}", &schema), &[])
                .await?;
            let constraint_rows = runner
                .query(&CONSTRAINTS_SQL.replace("{schema}", &schema), &[])
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

            let mut constraints = Vec::with_capacity(constraint_rows.len());
            for row in constraint_rows {
                constraints.push((row.get_string("table_name")?, row));
            }
            for (table_name, rows) in by_table(constraints) {
                if let Some(table) = tables.get_mut(&table_name) {
                    for row in &rows {
                        self.apply_constraint(table, row)?;
                    }
                }
            }

            for row in &index_rows {
                if row.get_bool("has_expressions") == Some(true) {
                    continue;
                }
                let Some(table) = tables.get_mut(&row.get_string("table_name")?) else {
                    continue;
                };
                table.indices.push(IndexDef {
                    name: Some(row.get_string("index_name")?),
                    columns: split_columns(&row.get_str("columns").unwrap_or_default()),
                    unique: row.get_bool("is_unique").unwrap_or(false),
                    predicate: row.get_str("predicate"),
                });
            }

            Ok(tables.into_values().collect())
        })
    }
}

/// `CHECK ((a > 0))` -> `(a > 0)`.
fn strip_keyword(definition: &str, keyword: &str) -> String {
    let trimmed = definition.trim();
    match trimmed.get(..keyword.len()) {
        Some(head) if head.eq_ignore_ascii_case(keyword) => trimmed[keyword.len()..].trim().to_string(),
        _ => trimmed.to_string(),
    }
}
