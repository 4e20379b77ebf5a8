//! SQLite catalog reader.
//!
//! Columns, indices and foreign keys come from the `PRAGMA` functions.
//! Constraint names and CHECK expressions are not in any pragma, so they are
//! recovered from the `CREATE TABLE` text stored in `sqlite_master`.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use dbshift_core::db::{QueryFuture, QueryRunner, Row};
use dbshift_core::dialect::DialectCapabilities;
use dbshift_core::error::Result;
use dbshift_core::schema::{
    CheckDef, ColumnDef, ForeignKeyDef, GeneratedColumn, GeneratedKind, Generation, IndexDef,
    LogicalType, ReferentialAction, TableDef, UniqueDef,
};
use regex::Regex;

use super::{split_columns, CatalogReader, Scope};

pub(crate) struct SqliteCatalog {
    caps: &'static DialectCapabilities,
}

/// A `CONSTRAINT name KIND (...)` clause found in table SQL.
#[derive(Debug, Clone, PartialEq)]
struct NamedClause {
    name: String,
    kind: ClauseKind,
    body: String,
    references: Option<(String, Vec<String>)>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ClauseKind {
    Unique,
    Check,
    ForeignKey,
    PrimaryKey,
}

impl SqliteCatalog {
    pub(crate) fn new(caps: &'static DialectCapabilities) -> Self {
        Self { caps }
    }

    async fn read_database(
        &self,
        runner: &mut dyn QueryRunner,
        database: Option<&str>,
    ) -> Result<Vec<TableDef>> {
        let schema = self.caps.quote_ident(database.unwrap_or("main"));
        let master = runner
            .query(
                &format!(
                    "SELECT type, name, tbl_name, sql FROM {}.sqlite_master WHERE type IN ('table', 'index')",
                    schema
                ),
                &[],
            )
            .await?;

        let index_sql: BTreeMap<String, String> = master
            .iter()
            .filter(|r| r.get_str("type").as_deref() == Some("index"))
            .filter_map(|r| Some((r.get_str("name")?, r.get_str("sql")?)))
            .collect();

        let mut tables = Vec::new();
        for row in master
            .iter()
            .filter(|r| r.get_str("type").as_deref() == Some("table"))
        {
            let name = row.get_string("name")?;
            if name.starts_with("sqlite_") {
                continue;
            }
            let sql = row.get_str("sql").unwrap_or_default();
            let mut table = self
                .read_table(runner, &schema, &name, &sql, &index_sql)
                .await?;
            table.database = database.map(str::to_string);
            tables.push(table);
        }
        Ok(tables)
    }

    async fn read_table(
        &self,
        runner: &mut dyn QueryRunner,
        schema: &str,
        name: &str,
        sql: &str,
        index_sql: &BTreeMap<String, String>,
    ) -> Result<TableDef> {
        let quoted = self.caps.quote_ident(name);
        let clauses = named_clauses(sql);
        let mut table = TableDef::new(name);

        let column_rows = runner
            .query(&format!("PRAGMA {}.table_xinfo({})", schema, quoted), &[])
            .await?;
        for row in &column_rows {
            if let Some(column) = self.column(row, sql)? {
                table.columns.push(column);
            }
        }

        let primary = table.primary_columns();
        if primary.len() == 1 && AUTOINCREMENT.is_match(sql) {
            if let Some(col) = table.get_column_mut(&primary[0]) {
                if col.column_type == LogicalType::Integer {
                    col.generation = Generation::Increment;
                }
            }
        }
        table.primary_key_name = clauses
            .iter()
            .find(|c| c.kind == ClauseKind::PrimaryKey)
            .map(|c| c.name.clone());

        let index_rows = runner
            .query(&format!("PRAGMA {}.index_list({})", schema, quoted), &[])
            .await?;
        for row in &index_rows {
            let index_name = row.get_string("name")?;
            let origin = row.get_str("origin").unwrap_or_default();
            if origin == "pk" {
                continue;
            }
            let info = runner
                .query(
                    &format!(
                        "PRAGMA {}.index_info({})",
                        schema,
                        self.caps.quote_ident(&index_name)
                    ),
                    &[],
                )
                .await?;
            let mut columns = Vec::with_capacity(info.len());
            let mut expression_index = false;
            for col in &info {
                match col.get_str("name") {
                    Some(c) => columns.push(c),
                    None => expression_index = true,
                }
            }
            if expression_index || columns.is_empty() {
                continue;
            }

            if origin == "u" {
                let mut unique = UniqueDef {
                    name: None,
                    columns,
                };
                unique.name = clauses
                    .iter()
                    .find(|c| {
                        c.kind == ClauseKind::Unique
                            && UniqueDef {
                                name: None,
                                columns: split_columns(&c.body),
                            }
                            .same_shape(&unique)
                    })
                    .map(|c| c.name.clone());
                table.uniques.push(unique);
            } else {
                let predicate = if row.get_bool("partial").unwrap_or(false) {
                    index_sql.get(&index_name).and_then(|s| index_predicate(s))
                } else {
                    None
                };
                table.indices.push(IndexDef {
                    name: Some(index_name),
                    columns,
                    unique: row.get_bool("unique").unwrap_or(false),
                    predicate,
                });
            }
        }

        table.checks = clauses
            .iter()
            .filter(|c| c.kind == ClauseKind::Check)
            .map(|c| CheckDef::new(c.body.clone()).named(c.name.clone()))
            .collect();

        let fk_rows = runner
            .query(&format!("PRAGMA {}.foreign_key_list({})", schema, quoted), &[])
            .await?;
        table.foreign_keys = foreign_keys(&fk_rows, &clauses)?;

        Ok(table)
    }

    fn column(&self, row: &Row, table_sql: &str) -> Result<Option<ColumnDef>> {
        let hidden = row.get_i64("hidden").unwrap_or(0);
        if hidden == 1 {
            return Ok(None);
        }
        let name = row.get_string("name")?;
        let declared = strip_generated_suffix(&row.get_str("type").unwrap_or_default());

        let mut column = ColumnDef::new(name, LogicalType::Text);
        self.caps.parse_type(&declared).apply_to(&mut column);

        let primary = row.get_i64("pk").unwrap_or(0) > 0;
        column.primary = primary;
        column.nullable = !primary && row.get_i64("notnull") == Some(0);
        column.default = row.get_str("dflt_value");

        if hidden == 2 || hidden == 3 {
            let kind = if hidden == 3 {
                GeneratedKind::Stored
            } else {
                GeneratedKind::Virtual
            };
            column.generated = generated_expression(table_sql, &column.name)
                .map(|expression| GeneratedColumn { expression, kind });
        }
        Ok(Some(column))
    }
}

impl CatalogReader for SqliteCatalog {
    fn read_tables<'a>(
        &'a self,
        runner: &'a mut dyn QueryRunner,
        scope: &'a Scope,
    ) -> QueryFuture<'a, Vec<TableDef>> {
        Box::pin(async move {
            let mut tables = self.read_database(&mut *runner, None).await?;
            for database in &scope.databases {
                tables.extend(self.read_database(&mut *runner, Some(database.as_str())).await?);
            }
            fill_implicit_references(&mut tables);
            Ok(tables)
        })
    }
}

/// Group `foreign_key_list` rows by key id and attach recovered names.
fn foreign_keys(rows: &[Row], clauses: &[NamedClause]) -> Result<Vec<ForeignKeyDef>> {
    let mut grouped: BTreeMap<i64, Vec<&Row>> = BTreeMap::new();
    for row in rows {
        grouped.entry(row.require_i64("id")?).or_default().push(row);
    }

    let mut keys = Vec::with_capacity(grouped.len());
    for (_, mut parts) in grouped {
        parts.sort_by_key(|r| r.get_i64("seq").unwrap_or(0));
        let first = parts[0];
        let referenced_table = first.get_string("table")?;
        let columns: Vec<String> = parts.iter().filter_map(|r| r.get_str("from")).collect();
        let referenced_columns: Vec<String> =
            parts.iter().filter_map(|r| r.get_str("to")).collect();

        let name = clauses
            .iter()
            .find(|c| {
                c.kind == ClauseKind::ForeignKey
                    && split_columns(&c.body) == columns
                    && c.references
                        .as_ref()
                        .map(|(t, _)| t.eq_ignore_ascii_case(&referenced_table))
                        .unwrap_or(false)
            })
            .map(|c| c.name.clone());

        keys.push(ForeignKeyDef {
            name,
            columns,
            referenced_table,
            referenced_schema: None,
            referenced_database: None,
            referenced_columns,
            on_delete: ReferentialAction::parse(&first.get_str("on_delete").unwrap_or_default()),
            on_update: ReferentialAction::parse(&first.get_str("on_update").unwrap_or_default()),
        });
    }
    Ok(keys)
}

/// Keys declared as `REFERENCES t` point at the target's primary key.
fn fill_implicit_references(tables: &mut [TableDef]) {
    let primaries: BTreeMap<String, Vec<String>> = tables
        .iter()
        .map(|t| (t.name.clone(), t.primary_columns()))
        .collect();
    for table in tables.iter_mut() {
        for fk in &mut table.foreign_keys {
            if fk.referenced_columns.is_empty() {
                if let Some(pk) = primaries.get(&fk.referenced_table) {
                    fk.referenced_columns = pk.clone();
                }
            }
        }
    }
}

static AUTOINCREMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bAUTOINCREMENT\b").expect("static regex"));

static CONSTRAINT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)CONSTRAINT\s+("(?:[^"]|"")+"|`[^`]+`|\[[^\]]+\]|[A-Za-z0-9_]+)\s+(UNIQUE|CHECK|FOREIGN\s+KEY|PRIMARY\s+KEY)\s*\("#,
    )
    .expect("static regex")
});

static REFERENCES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)^\s*REFERENCES\s+("(?:[^"]|"")+"|`[^`]+`|[A-Za-z0-9_]+)\s*(?:\(([^)]*)\))?"#)
        .expect("static regex")
});

/// Find every named table constraint in a `CREATE TABLE` statement.
fn named_clauses(sql: &str) -> Vec<NamedClause> {
    let mut clauses = Vec::new();
    for caps in CONSTRAINT.captures_iter(sql) {
        let (Some(whole), Some(name), Some(kind)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        let kind_word = kind.as_str().to_ascii_uppercase();
        let kind = match kind_word.split_whitespace().next() {
            Some("UNIQUE") => ClauseKind::Unique,
            Some("CHECK") => ClauseKind::Check,
            Some("FOREIGN") => ClauseKind::ForeignKey,
            _ => ClauseKind::PrimaryKey,
        };
        let Some((body, end)) = balanced(sql, whole.end() - 1) else {
            continue;
        };
        let references = if kind == ClauseKind::ForeignKey {
            REFERENCES.captures(&sql[end..]).and_then(|r| {
                let table = unquote_ident(r.get(1)?.as_str());
                let cols = r.get(2).map(|c| split_columns(c.as_str())).unwrap_or_default();
                Some((table, cols))
            })
        } else {
            None
        };
        clauses.push(NamedClause {
            name: unquote_ident(name.as_str()),
            kind,
            body,
            references,
        });
    }
    clauses
}

/// Content between the parenthesis at `open` and its match, plus the index
/// just past the closing parenthesis. Quoted text is skipped.
fn balanced(sql: &str, open: usize) -> Option<(String, usize)> {
    let bytes = sql.as_bytes();
    if bytes.get(open) != Some(&b'(') {
        return None;
    }
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    for (i, &b) in bytes.iter().enumerate().skip(open) {
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None => match b {
                b'\'' | b'"' | b'`' => quote = Some(b),
                b'(' => depth += 1,
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some((sql[open + 1..i].trim().to_string(), i + 1));
                    }
                }
                _ => {}
            },
        }
    }
    None
}

fn unquote_ident(ident: &str) -> String {
    let trimmed = ident.trim();
    if trimmed.len() >= 2 {
        let first = trimmed.as_bytes()[0];
        if first == b'"' {
            return trimmed[1..trimmed.len() - 1].replace("\"\"", "\"");
        }
        if first == b'`' || first == b'[' {
            return trimmed[1..trimmed.len() - 1].to_string();
        }
    }
    trimmed.to_string()
}

/// `table_xinfo` reports generated columns with `GENERATED ALWAYS` glued to
/// the type name.
fn strip_generated_suffix(declared: &str) -> String {
    let trimmed = declared.trim();
    let upper = trimmed.to_ascii_uppercase();
    match upper.find(" GENERATED ALWAYS") {
        Some(pos) => trimmed[..pos].trim().to_string(),
        None => trimmed.to_string(),
    }
}

/// The `AS (...)` expression of a generated column in table SQL.
fn generated_expression(table_sql: &str, column: &str) -> Option<String> {
    let pattern = format!(
        r#"(?i)(?:"{}"|`{}`|\b{}\b)[^,]*?\bAS\s*\("#,
        regex::escape(column),
        regex::escape(column),
        regex::escape(column)
    );
    let re = Regex::new(&pattern).ok()?;
    let m = re.find(table_sql)?;
    balanced(table_sql, m.end() - 1).map(|(expr, _)| expr)
}

/// The `WHERE` clause of a partial index definition.
fn index_predicate(index_sql: &str) -> Option<String> {
    let upper = index_sql.to_ascii_uppercase();
    let pos = upper.rfind(" WHERE ")?;
    Some(index_sql[pos + 7..].trim().to_string())
}
