//! Migration files.
//!
//! A unit lives in `<timestamp>_<name>.sql`:
//!
//! ```sql
//! -- migrate:up
//! CREATE TABLE "post" ("id" serial NOT NULL, ...);
//!
//! -- migrate:down
//! DROP TABLE "post";
//! ```
//!
//! A file without markers is all `up`. `-- migrate:no-transaction` anywhere
//! in the file runs the unit outside a transaction.

use std::collections::HashMap;
use std::path::Path;

use dbshift_core::error::{Result, ShiftError};
use tracing::debug;

use super::runner::{Migration, SqlMigration};

pub const UP_MARKER: &str = "-- migrate:up";
pub const DOWN_MARKER: &str = "-- migrate:down";
pub const NO_TRANSACTION_MARKER: &str = "-- migrate:no-transaction";

/// Parse one migration file's contents.
pub fn parse_migration(timestamp: i64, name: &str, content: &str) -> SqlMigration {
    let mut up = String::new();
    let mut down = String::new();
    let mut in_down = false;
    let mut transaction = None;

    for line in content.lines() {
        let marker = line.trim();
        if marker.eq_ignore_ascii_case(UP_MARKER) {
            in_down = false;
            continue;
        }
        if marker.eq_ignore_ascii_case(DOWN_MARKER) {
            in_down = true;
            continue;
        }
        if marker.eq_ignore_ascii_case(NO_TRANSACTION_MARKER) {
            transaction = Some(false);
            continue;
        }
        let target = if in_down { &mut down } else { &mut up };
        target.push_str(line);
        target.push('\n');
    }

    SqlMigration {
        timestamp,
        name: name.to_string(),
        up: split_sql_statements(&up),
        down: split_sql_statements(&down),
        transaction,
    }
}

/// Split `<timestamp>_<name>` into its parts.
pub fn parse_file_stem(stem: &str) -> Result<(i64, String)> {
    let (prefix, name) = stem.split_once('_').unwrap_or((stem, ""));
    let timestamp = prefix.parse::<i64>().map_err(|_| {
        ShiftError::Config(format!(
            "Invalid migration filename '{}': expected <timestamp>_<name>.sql",
            stem
        ))
    })?;
    Ok((timestamp, name.to_string()))
}

/// Split SQL into individual statements, respecting quoted strings,
/// quoted identifiers and dollar-quoted bodies. Comment-only fragments are
/// dropped.
pub fn split_sql_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut dollar_tag: Option<String> = None;
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);

        if let Some(q) = quote {
            // A doubled quote stays inside the literal.
            if c == q {
                if chars.peek() == Some(&q) {
                    if let Some(next) = chars.next() {
                        current.push(next);
                    }
                } else {
                    quote = None;
                }
            }
            continue;
        }

        if let Some(tag) = &dollar_tag {
            if current.ends_with(tag.as_str()) && current.len() > tag.len() {
                dollar_tag = None;
            }
            continue;
        }

        match c {
            '\'' | '"' | '`' => quote = Some(c),
            '-' if chars.peek() == Some(&'-') => {
                // Line comment: copy through to the end of the line.
                for next in chars.by_ref() {
                    current.push(next);
                    if next == '\n' {
                        break;
                    }
                }
            }
            '$' => {
                let mut tag = String::from("$");
                while let Some(&next) = chars.peek() {
                    if next == '$' {
                        tag.push(next);
                        chars.next();
                        break;
                    } else if next.is_alphanumeric() || next == '_' {
                        tag.push(next);
                        chars.next();
                    } else {
                        break;
                    }
                }
                current.push_str(&tag[1..]);
                if tag.len() >= 2 && tag.ends_with('$') {
                    dollar_tag = Some(tag);
                }
            }
            ';' => {
                push_statement(&mut statements, &current);
                current.clear();
            }
            _ => {}
        }
    }

    push_statement(&mut statements, &current);
    statements
}

/// Keep a fragment unless it is only comments; leading comment lines go.
fn push_statement(statements: &mut Vec<String>, raw: &str) {
    let statement = raw.trim().trim_end_matches(';').trim();
    let body: Vec<&str> = statement
        .lines()
        .skip_while(|l| {
            let l = l.trim();
            l.is_empty() || l.starts_with("--")
        })
        .collect();
    if !body.is_empty() {
        statements.push(body.join("\n").trim().to_string());
    }
}

/// Load migration units from a directory, sorted by timestamp.
///
/// Files that do not end in `.sql` are ignored. Two files with the same
/// timestamp are an error.
pub fn load_migrations_from_dir(dir: &Path) -> Result<Vec<SqlMigration>> {
    if !dir.exists() {
        debug!("Migrations directory does not exist: {:?}", dir);
        return Ok(Vec::new());
    }

    let mut migrations = Vec::new();
    let mut seen: HashMap<i64, String> = HashMap::new();

    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.extension().map(|e| e == "sql").unwrap_or(false) {
            continue;
        }
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| ShiftError::Config("Invalid migration filename".into()))?;
        let (timestamp, name) = parse_file_stem(stem)?;
        if let Some(other) = seen.insert(timestamp, stem.to_string()) {
            return Err(ShiftError::MigrationIntegrity(format!(
                "migrations '{}' and '{}' share timestamp {}",
                other, stem, timestamp
            )));
        }

        let content = std::fs::read_to_string(&path)?;
        migrations.push(parse_migration(timestamp, &name, &content));
    }

    migrations.sort_by_key(|m| m.timestamp);
    debug!("Loaded {} migrations", migrations.len());
    Ok(migrations)
}

/// [`load_migrations_from_dir`], boxed for the runner.
pub fn load_units(dir: &Path) -> Result<Vec<Box<dyn Migration>>> {
    Ok(load_migrations_from_dir(dir)?
        .into_iter()
        .map(|m| Box::new(m) as Box<dyn Migration>)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_migrations_from_empty_dir() {
        let dir = TempDir::new().unwrap();
        let migrations = load_migrations_from_dir(dir.path()).unwrap();
        assert!(migrations.is_empty());
    }

    #[test]
    fn test_load_migrations_from_nonexistent_dir() {
        let migrations = load_migrations_from_dir(Path::new("/nonexistent/path")).unwrap();
        assert!(migrations.is_empty());
    }

    #[test]
    fn test_load_migrations_sorted_by_timestamp() {
        let dir = TempDir::new().unwrap();

        fs::write(dir.path().join("1700000000020_second.sql"), "SELECT 2;").unwrap();
        fs::write(dir.path().join("1700000000003_first.sql"), "SELECT 1;").unwrap();
        fs::write(dir.path().join("1700000000100_third.sql"), "SELECT 3;").unwrap();
        fs::write(dir.path().join("readme.txt"), "Not a migration").unwrap();

        let migrations = load_migrations_from_dir(dir.path()).unwrap();
        let names: Vec<&str> = migrations.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["first", "second", "third"]);
        assert_eq!(migrations[0].timestamp, 1700000000003);
    }

    #[test]
    fn test_duplicate_timestamp_rejected() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("1_a.sql"), "SELECT 1;").unwrap();
        fs::write(dir.path().join("1_b.sql"), "SELECT 2;").unwrap();
        assert!(matches!(
            load_migrations_from_dir(dir.path()),
            Err(ShiftError::MigrationIntegrity(_))
        ));
    }

    #[test]
    fn test_bad_filename() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("create_post.sql"), "SELECT 1;").unwrap();
        assert!(matches!(
            load_migrations_from_dir(dir.path()),
            Err(ShiftError::Config(_))
        ));
    }

    #[test]
    fn test_up_and_down_sections() {
        let content = "-- Migration: create_post\n\
                       -- migrate:up\n\
                       CREATE TABLE \"post\" (\"id\" integer);\n\
                       CREATE INDEX \"IDX_post\" ON \"post\" (\"id\");\n\
                       \n\
                       -- migrate:down\n\
                       DROP INDEX \"IDX_post\";\n\
                       DROP TABLE \"post\";\n";
        let m = parse_migration(1, "create_post", content);
        assert_eq!(m.up.len(), 2);
        assert_eq!(m.up[0], "CREATE TABLE \"post\" (\"id\" integer)");
        assert_eq!(m.down, vec!["DROP INDEX \"IDX_post\"", "DROP TABLE \"post\""]);
        assert_eq!(m.transaction, None);

        let m = parse_migration(2, "index", "-- migrate:no-transaction\nCREATE INDEX CONCURRENTLY i ON t (c);");
        assert_eq!(m.transaction, Some(false));
        assert_eq!(m.up.len(), 1);
        assert!(m.down.is_empty());
    }

    #[test]
    fn test_split_simple_statements() {
        let stmts = split_sql_statements("SELECT 1; SELECT 2; SELECT 3;");
        assert_eq!(stmts, vec!["SELECT 1", "SELECT 2", "SELECT 3"]);
    }

    #[test]
    fn test_split_ignores_semicolons_in_literals() {
        let sql = "INSERT INTO t VALUES ('a;b', 'it''s; fine'); \
                   COMMENT ON COLUMN \"t\".\"c\" IS 'x;y'; \
                   SELECT \"odd;name\" FROM t";
        let stmts = split_sql_statements(sql);
        assert_eq!(stmts.len(), 3);
        assert!(stmts[0].ends_with("'it''s; fine')"));
        assert!(stmts[2].contains("\"odd;name\""));
    }

    #[test]
    fn test_split_with_dollar_quoted_function() {
        let sql = r#"
CREATE FUNCTION test() RETURNS void AS $$
BEGIN
    SELECT 1;
    SELECT 2;
END;
$$ LANGUAGE plpgsql;

SELECT 3;
"#;
        let stmts = split_sql_statements(sql);
        assert_eq!(stmts.len(), 2);
        assert!(stmts[0].contains("CREATE FUNCTION"));
        assert!(stmts[0].contains("$$ LANGUAGE plpgsql"));
        assert_eq!(stmts[1], "SELECT 3");
    }

    #[test]
    fn test_split_tagged_dollar_quote_and_comments() {
        let sql = "-- leading comment; not a statement\n\
                   CREATE FUNCTION f() RETURNS int AS $body$ SELECT 1; $body$ LANGUAGE sql;\n\
                   -- trailing comment\n";
        let stmts = split_sql_statements(sql);
        assert_eq!(stmts.len(), 1);
        assert!(stmts[0].contains("$body$ SELECT 1; $body$"));
    }
}
