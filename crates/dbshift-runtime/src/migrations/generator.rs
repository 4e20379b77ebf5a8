use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use dbshift_core::dialect::Dialect;
use dbshift_core::error::{Result, ShiftError};
use dbshift_core::schema::SchemaModel;
use tracing::info;

use super::diff::SchemaDiffer;
use super::loader::{DOWN_MARKER, UP_MARKER};
use super::synth::DdlSynthesizer;

/// Writes migration files from schema diffs.
pub struct MigrationGenerator {
    dialect: Dialect,
    /// Output directory for migrations.
    output_dir: PathBuf,
}

impl MigrationGenerator {
    pub fn new(dialect: Dialect, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            dialect,
            output_dir: output_dir.into(),
        }
    }

    /// Resolve a `<path>` argument: a bare name goes into the default
    /// directory, a path with a parent names its own directory.
    pub fn target(path: &Path, default_dir: &Path) -> (PathBuf, String) {
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .map(sanitize_name)
            .unwrap_or_default();
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => default_dir.to_path_buf(),
        };
        (dir, name)
    }

    /// Diff and synthesize. `None` when the database already matches.
    pub fn generate(
        &self,
        name: &str,
        desired: &SchemaModel,
        actual: &SchemaModel,
        created_at: DateTime<Utc>,
    ) -> Result<Option<GeneratedMigration>> {
        let diff = SchemaDiffer::new(self.dialect).diff(desired, actual)?;
        if diff.is_empty() {
            return Ok(None);
        }
        let batch = DdlSynthesizer::new(self.dialect).synthesize(&diff)?;
        let mut migration = self.create(name, created_at)?;
        migration.up = batch.up;
        migration.down = batch.down;
        Ok(Some(migration))
    }

    /// An empty migration to fill in by hand.
    pub fn create(&self, name: &str, created_at: DateTime<Utc>) -> Result<GeneratedMigration> {
        let name = sanitize_name(name);
        if name.is_empty() {
            return Err(ShiftError::InvalidArgument(
                "Migration name must not be empty".into(),
            ));
        }
        let timestamp = created_at.timestamp_millis();
        Ok(GeneratedMigration {
            timestamp,
            path: self.output_dir.join(format!("{}_{}.sql", timestamp, name)),
            name,
            created_at,
            up: Vec::new(),
            down: Vec::new(),
        })
    }

    /// Write migration to disk.
    pub fn write(&self, migration: &GeneratedMigration, pretty: bool) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.output_dir)?;
        std::fs::write(&migration.path, migration.render(pretty))?;
        info!(path = %migration.path.display(), "Migration written");
        Ok(migration.path.clone())
    }
}

/// A generated migration.
#[derive(Debug, Clone)]
pub struct GeneratedMigration {
    /// Epoch milliseconds; the unit identifier.
    pub timestamp: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub path: PathBuf,
    pub up: Vec<String>,
    pub down: Vec<String>,
}

impl GeneratedMigration {
    /// File contents in the loader's format.
    pub fn render(&self, pretty: bool) -> String {
        let body = |statements: &[String]| -> String {
            statements
                .iter()
                .map(|s| {
                    let s = if pretty { pretty_statement(s) } else { s.clone() };
                    format!("{};\n", s)
                })
                .collect()
        };
        format!(
            "-- Migration: {}\n-- Generated at: {}\n\n{}\n{}\n{}\n{}",
            self.name,
            self.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
            UP_MARKER,
            body(&self.up),
            DOWN_MARKER,
            body(&self.down)
        )
    }
}

/// Lowercase snake case: `CreatePost` and `create-post` become `create_post`.
fn sanitize_name(raw: &str) -> String {
    let mut out = String::new();
    let mut prev_lower = false;
    for c in raw.chars() {
        if c.is_ascii_alphanumeric() {
            if c.is_ascii_uppercase() && prev_lower {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
            prev_lower = c.is_ascii_lowercase() || c.is_ascii_digit();
        } else {
            if !out.is_empty() && !out.ends_with('_') {
                out.push('_');
            }
            prev_lower = false;
        }
    }
    out.trim_end_matches('_').to_string()
}

/// Put each top-level item of a `CREATE TABLE` on its own line.
pub fn pretty_statement(sql: &str) -> String {
    if !sql.starts_with("CREATE TABLE") {
        return sql.to_string();
    }
    let Some(open) = sql.find('(') else {
        return sql.to_string();
    };

    let mut items = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut close = None;

    for (i, c) in sql[open + 1..].char_indices() {
        if let Some(q) = quote {
            current.push(c);
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' | '`' => {
                quote = Some(c);
                current.push(c);
            }
            '[' => {
                quote = Some(']');
                current.push(c);
            }
            '(' => {
                depth += 1;
                current.push(c);
            }
            ')' if depth == 0 => {
                close = Some(open + 1 + i);
                break;
            }
            ')' => {
                depth -= 1;
                current.push(c);
            }
            ',' if depth == 0 => {
                items.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(c),
        }
    }
    let Some(close) = close else {
        return sql.to_string();
    };
    items.push(current.trim().to_string());

    format!(
        "{}(\n{}\n){}",
        &sql[..open],
        items
            .iter()
            .map(|item| format!("    {}", item))
            .collect::<Vec<_>>()
            .join(",\n"),
        &sql[close + 1..]
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrations::loader::parse_migration;
    use chrono::TimeZone;
    use dbshift_core::schema::{ColumnDef, Generation, LogicalType, TableDef};
    use tempfile::TempDir;

    fn post() -> SchemaModel {
        SchemaModel::new().with_table(
            TableDef::new("post")
                .column(
                    ColumnDef::new("id", LogicalType::Integer)
                        .primary()
                        .generated_by(Generation::Increment),
                )
                .column(ColumnDef::varchar("name", 50)),
        )
    }

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()
    }

    #[test]
    fn test_generate_migration() {
        let dir = TempDir::new().unwrap();
        let generator = MigrationGenerator::new(Dialect::Postgres, dir.path());

        let migration = generator
            .generate("CreatePost", &post(), &SchemaModel::new(), at())
            .unwrap()
            .unwrap();
        assert_eq!(migration.name, "create_post");
        assert_eq!(migration.timestamp, at().timestamp_millis());
        assert_eq!(migration.up.len(), 1);
        assert!(migration.up[0].starts_with("CREATE TABLE \"post\""));
        assert_eq!(migration.down, vec!["DROP TABLE \"post\""]);

        let path = generator.write(&migration, false).unwrap();
        assert_eq!(
            path.file_name().and_then(|n| n.to_str()),
            Some(format!("{}_create_post.sql", at().timestamp_millis()).as_str())
        );

        // The written file loads back into the same statements.
        let content = std::fs::read_to_string(&path).unwrap();
        let loaded = parse_migration(migration.timestamp, &migration.name, &content);
        assert_eq!(loaded.up, migration.up);
        assert_eq!(loaded.down, migration.down);
    }

    #[test]
    fn test_no_drift_generates_nothing() {
        let generator = MigrationGenerator::new(Dialect::Sqlite, "migrations");
        assert!(generator
            .generate("noop", &post(), &post(), at())
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_pretty_create_table() {
        let sql = "CREATE TABLE \"post\" (\"id\" serial NOT NULL, \"price\" numeric(10,2) NOT NULL, \"tag\" character varying(20) DEFAULT 'a,b', CONSTRAINT \"PK_post\" PRIMARY KEY (\"id\"))";
        assert_eq!(
            pretty_statement(sql),
            "CREATE TABLE \"post\" (\n    \"id\" serial NOT NULL,\n    \"price\" numeric(10,2) NOT NULL,\n    \"tag\" character varying(20) DEFAULT 'a,b',\n    CONSTRAINT \"PK_post\" PRIMARY KEY (\"id\")\n)"
        );
        assert_eq!(pretty_statement("DROP TABLE \"post\""), "DROP TABLE \"post\"");
    }

    #[test]
    fn test_pretty_output_still_loads() {
        let generator = MigrationGenerator::new(Dialect::MySql, "migrations");
        let migration = generator
            .generate("create post", &post(), &SchemaModel::new(), at())
            .unwrap()
            .unwrap();
        let loaded = parse_migration(1, "create_post", &migration.render(true));
        assert_eq!(loaded.up.len(), 1);
        assert!(loaded.up[0].contains("\n    `name` varchar(50) NOT NULL,\n"));
    }

    #[test]
    fn test_target_and_names() {
        let default = Path::new("migrations");
        assert_eq!(
            MigrationGenerator::target(Path::new("CreatePost"), default),
            (PathBuf::from("migrations"), "create_post".to_string())
        );
        assert_eq!(
            MigrationGenerator::target(Path::new("db/changes/add-body"), default),
            (PathBuf::from("db/changes"), "add_body".to_string())
        );
        assert!(MigrationGenerator::new(Dialect::Sqlite, "m").create("--", at()).is_err());
    }
}
