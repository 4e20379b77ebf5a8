//! Dialect capability table.
//!
//! Every per-database fact the introspector, differ and synthesizer need is a
//! field of a static [`DialectCapabilities`] record. Operation code looks the
//! record up instead of branching on the dialect.

mod normalize;
mod types;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ShiftError};
pub use types::TypeSpec;

/// Supported database families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Postgres,
    CockroachDb,
    MySql,
    MariaDb,
    Sqlite,
    Mssql,
}

impl Dialect {
    pub const ALL: [Dialect; 6] = [
        Dialect::Postgres,
        Dialect::CockroachDb,
        Dialect::MySql,
        Dialect::MariaDb,
        Dialect::Sqlite,
        Dialect::Mssql,
    ];

    /// Infer the dialect from a connection URL scheme.
    pub fn from_url(url: &str) -> Result<Self> {
        let scheme = url.split(':').next().unwrap_or_default().to_ascii_lowercase();
        match scheme.as_str() {
            "postgres" | "postgresql" => Ok(Dialect::Postgres),
            "cockroachdb" | "cockroach" => Ok(Dialect::CockroachDb),
            "mysql" => Ok(Dialect::MySql),
            "mariadb" => Ok(Dialect::MariaDb),
            "sqlite" => Ok(Dialect::Sqlite),
            "mssql" | "sqlserver" => Ok(Dialect::Mssql),
            _ => Err(ShiftError::Config(format!(
                "Cannot infer dialect from database URL scheme '{}'",
                scheme
            ))),
        }
    }

    /// The static capability record for this dialect.
    pub fn capabilities(&self) -> &'static DialectCapabilities {
        match self {
            Dialect::Postgres => &POSTGRES,
            Dialect::CockroachDb => &COCKROACH,
            Dialect::MySql => &MYSQL,
            Dialect::MariaDb => &MARIADB,
            Dialect::Sqlite => &SQLITE,
            Dialect::Mssql => &MSSQL,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Dialect::Postgres => "postgres",
            Dialect::CockroachDb => "cockroachdb",
            Dialect::MySql => "mysql",
            Dialect::MariaDb => "mariadb",
            Dialect::Sqlite => "sqlite",
            Dialect::Mssql => "mssql",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Dialect {
    type Err = ShiftError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(Dialect::Postgres),
            "cockroachdb" | "cockroach" | "crdb" => Ok(Dialect::CockroachDb),
            "mysql" => Ok(Dialect::MySql),
            "mariadb" => Ok(Dialect::MariaDb),
            "sqlite" | "sqlite3" => Ok(Dialect::Sqlite),
            "mssql" | "sqlserver" => Ok(Dialect::Mssql),
            other => Err(ShiftError::InvalidArgument(format!(
                "Unknown dialect '{}'",
                other
            ))),
        }
    }
}

/// Which catalog reader understands this dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogFamily {
    Postgres,
    MySql,
    Sqlite,
    Mssql,
}

/// How a column definition is changed in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlterColumnStyle {
    /// Piecewise `ALTER COLUMN c TYPE / SET NOT NULL / SET DEFAULT`.
    AlterColumn,
    /// `MODIFY COLUMN c <full definition>`.
    Modify,
    /// `CHANGE c c <full definition>`.
    Change,
    /// `ALTER COLUMN c <type> [NOT] NULL`, defaults handled separately.
    AlterColumnFull,
    /// No in-place change; the table is rebuilt.
    None,
}

/// Operation classes that need the table-rebuild strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RebuildTriggers {
    pub change_column: bool,
    pub drop_column: bool,
    /// `ADD COLUMN` is limited: no primary key, unique, stored generated
    /// column, or NOT NULL without a default.
    pub restricted_add_column: bool,
    /// Adding or dropping uniques, checks and foreign keys.
    pub constraints: bool,
    pub primary_key: bool,
}

/// Syntax used to rename an index or constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenameStyle {
    /// Not supported; rename becomes drop + add.
    None,
    /// `ALTER TABLE t RENAME CONSTRAINT|INDEX a TO b`.
    AlterTable,
    /// `ALTER INDEX a RENAME TO b`.
    AlterIndex,
    /// `EXEC sp_rename`.
    SpRename,
}

/// How `DROP INDEX` names its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropIndexStyle {
    /// `DROP INDEX "schema"."idx"`.
    Standalone,
    /// `DROP INDEX idx ON t`.
    OnTable,
}

/// Where column comments live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentStyle {
    None,
    /// Separate `COMMENT ON COLUMN` statements.
    CommentOn,
    /// Inline `COMMENT '...'` in the column definition.
    Inline,
}

/// How auto-increment columns are declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncrementStyle {
    /// `serial` / `bigserial` pseudo-types.
    Serial,
    /// `AUTO_INCREMENT` attribute.
    AutoIncrement,
    /// `IDENTITY(1,1)` attribute.
    Identity,
    /// `INTEGER PRIMARY KEY AUTOINCREMENT`.
    Autoincrement,
}

/// How computed columns are declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratedStyle {
    /// `<type> GENERATED ALWAYS AS (expr) STORED|VIRTUAL`.
    GeneratedAlways,
    /// `AS (expr) [PERSISTED]`, no declared type.
    Computed,
}

/// Parameter placeholder syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderStyle {
    /// `$1`
    Dollar,
    /// `?`
    Question,
    /// `@p1`
    AtP,
}

/// Per-dialect SQL type names for the logical vocabulary.
#[derive(Debug, Clone, Copy)]
pub struct TypeNames {
    pub small_int: &'static str,
    pub integer: &'static str,
    pub big_int: &'static str,
    pub decimal: &'static str,
    pub real: &'static str,
    pub double: &'static str,
    pub boolean: &'static str,
    pub char: &'static str,
    pub varchar: &'static str,
    pub text: &'static str,
    pub uuid: &'static str,
    pub date: &'static str,
    pub time: &'static str,
    pub timestamp: &'static str,
    pub timestamptz: &'static str,
    pub json: &'static str,
    /// Binary without a length.
    pub blob: &'static str,
    /// Binary with a length.
    pub varbinary: &'static str,
    /// Length used when a varchar has none and the dialect requires one.
    pub default_varchar_length: Option<u32>,
}

/// Static facts about one dialect.
#[derive(Debug, Clone)]
pub struct DialectCapabilities {
    pub dialect: Dialect,
    pub catalog: CatalogFamily,
    pub quote_open: char,
    pub quote_close: char,
    pub max_identifier_length: Option<usize>,
    pub types: TypeNames,
    pub alter_column: AlterColumnStyle,
    pub rebuild: RebuildTriggers,
    pub rename_constraint: RenameStyle,
    pub rename_index: RenameStyle,
    pub drop_index: DropIndexStyle,
    /// Clause dropping a foreign key, after `ALTER TABLE t`.
    pub drop_foreign_key: &'static str,
    /// Clause dropping a check, after `ALTER TABLE t`.
    pub drop_check: &'static str,
    /// Whether the primary key constraint carries a user-chosen name.
    pub named_primary_key: bool,
    /// Defaults are named constraints (`DF_<table>_<column>`).
    pub named_defaults: bool,
    pub transactional_ddl: bool,
    /// Unique constraints exist only as unique indices.
    pub unique_as_index: bool,
    pub checks: bool,
    pub exclusions: bool,
    pub partial_indexes: bool,
    pub comments: CommentStyle,
    pub generated_columns: bool,
    pub generated_style: GeneratedStyle,
    /// Per-column `CHARACTER SET`.
    pub column_charset: bool,
    /// Clause adding a column, after `ALTER TABLE t`.
    pub add_column: &'static str,
    pub on_update: bool,
    pub display_width: bool,
    pub collation: bool,
    /// Inline foreign keys may reference tables created later.
    pub forward_references: bool,
    pub placeholder: PlaceholderStyle,
    pub advisory_lock: Option<&'static str>,
    pub advisory_unlock: Option<&'static str>,
    /// Statements run on the connection before a migration transaction.
    pub session_setup: &'static [&'static str],
    /// Statements run after the transaction ends.
    pub session_teardown: &'static [&'static str],
    /// Query that returns rows when referential integrity is broken.
    pub integrity_check: Option<&'static str>,
    pub increment: IncrementStyle,
    /// Identity column clause, when distinct from increment.
    pub identity: Option<&'static str>,
    pub uuid_default: Option<&'static str>,
}

impl DialectCapabilities {
    /// Quote an identifier, doubling embedded close quotes.
    pub fn quote_ident(&self, name: &str) -> String {
        let escaped = name.replace(
            self.quote_close,
            &format!("{}{}", self.quote_close, self.quote_close),
        );
        format!("{}{}{}", self.quote_open, escaped, self.quote_close)
    }

    /// Quote an optionally qualified name.
    pub fn quote_path(&self, qualifier: Option<&str>, name: &str) -> String {
        match qualifier {
            Some(q) => format!("{}.{}", self.quote_ident(q), self.quote_ident(name)),
            None => self.quote_ident(name),
        }
    }

    /// Truncate an identifier to the dialect limit.
    pub fn truncate_identifier(&self, name: &str) -> String {
        match self.max_identifier_length {
            Some(max) if name.len() > max => name.chars().take(max).collect(),
            _ => name.to_string(),
        }
    }

    /// Parameter placeholder for the 1-based position `n`.
    pub fn placeholder(&self, n: usize) -> String {
        match self.placeholder {
            PlaceholderStyle::Dollar => format!("${}", n),
            PlaceholderStyle::Question => "?".to_string(),
            PlaceholderStyle::AtP => format!("@p{}", n),
        }
    }

    /// Quote a string literal.
    pub fn quote_literal(&self, value: &str) -> String {
        format!("'{}'", value.replace('\'', "''"))
    }

    /// Whether the catalog reports uniques as indices; desired uniques fold
    /// into unique indices before comparison.
    pub fn folds_uniques(&self) -> bool {
        self.unique_as_index
    }
}

const PG_TYPES: TypeNames = TypeNames {
    small_int: "smallint",
    integer: "integer",
    big_int: "bigint",
    decimal: "numeric",
    real: "real",
    double: "double precision",
    boolean: "boolean",
    char: "character",
    varchar: "character varying",
    text: "text",
    uuid: "uuid",
    date: "date",
    time: "time without time zone",
    timestamp: "timestamp without time zone",
    timestamptz: "timestamp with time zone",
    json: "jsonb",
    blob: "bytea",
    varbinary: "bytea",
    default_varchar_length: None,
};

const MYSQL_TYPES: TypeNames = TypeNames {
    small_int: "smallint",
    integer: "int",
    big_int: "bigint",
    decimal: "decimal",
    real: "float",
    double: "double",
    boolean: "tinyint(1)",
    char: "char",
    varchar: "varchar",
    text: "text",
    uuid: "varchar(36)",
    date: "date",
    time: "time",
    timestamp: "datetime",
    timestamptz: "timestamp",
    json: "json",
    blob: "blob",
    varbinary: "varbinary",
    default_varchar_length: Some(255),
};

pub static POSTGRES: DialectCapabilities = DialectCapabilities {
    dialect: Dialect::Postgres,
    catalog: CatalogFamily::Postgres,
    quote_open: '"',
    quote_close: '"',
    max_identifier_length: Some(63),
    types: PG_TYPES,
    alter_column: AlterColumnStyle::AlterColumn,
    rebuild: RebuildTriggers {
        change_column: false,
        drop_column: false,
        restricted_add_column: false,
        constraints: false,
        primary_key: false,
    },
    rename_constraint: RenameStyle::AlterTable,
    rename_index: RenameStyle::AlterIndex,
    drop_index: DropIndexStyle::Standalone,
    drop_foreign_key: "DROP CONSTRAINT",
    drop_check: "DROP CONSTRAINT",
    named_primary_key: true,
    named_defaults: false,
    transactional_ddl: true,
    unique_as_index: false,
    checks: true,
    exclusions: true,
    partial_indexes: true,
    comments: CommentStyle::CommentOn,
    generated_columns: true,
    generated_style: GeneratedStyle::GeneratedAlways,
    column_charset: false,
    add_column: "ADD COLUMN",
    on_update: false,
    display_width: false,
    collation: true,
    forward_references: false,
    placeholder: PlaceholderStyle::Dollar,
    advisory_lock: Some("SELECT CAST(pg_advisory_lock(4360012107) AS text)"),
    advisory_unlock: Some("SELECT CAST(pg_advisory_unlock(4360012107) AS text)"),
    session_setup: &[],
    session_teardown: &[],
    integrity_check: None,
    increment: IncrementStyle::Serial,
    identity: Some("GENERATED BY DEFAULT AS IDENTITY"),
    uuid_default: Some("gen_random_uuid()"),
};

pub static COCKROACH: DialectCapabilities = DialectCapabilities {
    dialect: Dialect::CockroachDb,
    catalog: CatalogFamily::Postgres,
    quote_open: '"',
    quote_close: '"',
    max_identifier_length: None,
    types: TypeNames {
        integer: "int4",
        ..PG_TYPES
    },
    alter_column: AlterColumnStyle::AlterColumn,
    rebuild: RebuildTriggers {
        change_column: false,
        drop_column: false,
        restricted_add_column: false,
        constraints: false,
        primary_key: false,
    },
    rename_constraint: RenameStyle::AlterTable,
    rename_index: RenameStyle::AlterIndex,
    drop_index: DropIndexStyle::Standalone,
    drop_foreign_key: "DROP CONSTRAINT",
    drop_check: "DROP CONSTRAINT",
    named_primary_key: true,
    named_defaults: false,
    transactional_ddl: true,
    unique_as_index: false,
    checks: true,
    exclusions: false,
    partial_indexes: true,
    comments: CommentStyle::CommentOn,
    generated_columns: true,
    generated_style: GeneratedStyle::GeneratedAlways,
    column_charset: false,
    add_column: "ADD COLUMN",
    on_update: false,
    display_width: false,
    collation: true,
    forward_references: false,
    placeholder: PlaceholderStyle::Dollar,
    advisory_lock: None,
    advisory_unlock: None,
    session_setup: &[],
    session_teardown: &[],
    integrity_check: None,
    increment: IncrementStyle::Serial,
    identity: Some("GENERATED BY DEFAULT AS IDENTITY"),
    uuid_default: Some("gen_random_uuid()"),
};

pub static MYSQL: DialectCapabilities = DialectCapabilities {
    dialect: Dialect::MySql,
    catalog: CatalogFamily::MySql,
    quote_open: '`',
    quote_close: '`',
    max_identifier_length: Some(64),
    types: MYSQL_TYPES,
    alter_column: AlterColumnStyle::Modify,
    rebuild: RebuildTriggers {
        change_column: false,
        drop_column: false,
        restricted_add_column: false,
        constraints: false,
        primary_key: false,
    },
    rename_constraint: RenameStyle::None,
    rename_index: RenameStyle::AlterTable,
    drop_index: DropIndexStyle::OnTable,
    drop_foreign_key: "DROP FOREIGN KEY",
    drop_check: "DROP CHECK",
    named_primary_key: false,
    named_defaults: false,
    transactional_ddl: false,
    unique_as_index: true,
    checks: true,
    exclusions: false,
    partial_indexes: false,
    comments: CommentStyle::Inline,
    generated_columns: true,
    generated_style: GeneratedStyle::GeneratedAlways,
    column_charset: true,
    add_column: "ADD COLUMN",
    on_update: true,
    display_width: true,
    collation: true,
    forward_references: false,
    placeholder: PlaceholderStyle::Question,
    advisory_lock: Some("SELECT GET_LOCK('dbshift_migrations', 60)"),
    advisory_unlock: Some("SELECT RELEASE_LOCK('dbshift_migrations')"),
    session_setup: &[],
    session_teardown: &[],
    integrity_check: None,
    increment: IncrementStyle::AutoIncrement,
    identity: None,
    uuid_default: Some("(UUID())"),
};

pub static MARIADB: DialectCapabilities = DialectCapabilities {
    dialect: Dialect::MariaDb,
    catalog: CatalogFamily::MySql,
    quote_open: '`',
    quote_close: '`',
    max_identifier_length: Some(64),
    types: TypeNames {
        json: "longtext",
        ..MYSQL_TYPES
    },
    alter_column: AlterColumnStyle::Change,
    rebuild: RebuildTriggers {
        change_column: false,
        drop_column: false,
        restricted_add_column: false,
        constraints: false,
        primary_key: false,
    },
    rename_constraint: RenameStyle::None,
    rename_index: RenameStyle::AlterTable,
    drop_index: DropIndexStyle::OnTable,
    drop_foreign_key: "DROP FOREIGN KEY",
    drop_check: "DROP CONSTRAINT",
    named_primary_key: false,
    named_defaults: false,
    transactional_ddl: false,
    unique_as_index: true,
    checks: true,
    exclusions: false,
    partial_indexes: false,
    comments: CommentStyle::Inline,
    generated_columns: true,
    generated_style: GeneratedStyle::GeneratedAlways,
    column_charset: true,
    add_column: "ADD COLUMN",
    on_update: true,
    display_width: true,
    collation: true,
    forward_references: false,
    placeholder: PlaceholderStyle::Question,
    advisory_lock: Some("SELECT GET_LOCK('dbshift_migrations', 60)"),
    advisory_unlock: Some("SELECT RELEASE_LOCK('dbshift_migrations')"),
    session_setup: &[],
    session_teardown: &[],
    integrity_check: None,
    increment: IncrementStyle::AutoIncrement,
    identity: None,
    uuid_default: Some("uuid()"),
};

pub static SQLITE: DialectCapabilities = DialectCapabilities {
    dialect: Dialect::Sqlite,
    catalog: CatalogFamily::Sqlite,
    quote_open: '"',
    quote_close: '"',
    max_identifier_length: None,
    types: TypeNames {
        small_int: "smallint",
        integer: "integer",
        big_int: "bigint",
        decimal: "decimal",
        real: "real",
        double: "double",
        boolean: "boolean",
        char: "char",
        varchar: "varchar",
        text: "text",
        uuid: "varchar(36)",
        date: "date",
        time: "time",
        timestamp: "datetime",
        timestamptz: "datetime",
        json: "json",
        blob: "blob",
        varbinary: "blob",
        default_varchar_length: None,
    },
    alter_column: AlterColumnStyle::None,
    rebuild: RebuildTriggers {
        change_column: true,
        drop_column: true,
        restricted_add_column: true,
        constraints: true,
        primary_key: true,
    },
    rename_constraint: RenameStyle::None,
    rename_index: RenameStyle::None,
    drop_index: DropIndexStyle::Standalone,
    drop_foreign_key: "DROP CONSTRAINT",
    drop_check: "DROP CONSTRAINT",
    named_primary_key: false,
    named_defaults: false,
    transactional_ddl: true,
    unique_as_index: false,
    checks: true,
    exclusions: false,
    partial_indexes: true,
    comments: CommentStyle::None,
    generated_columns: true,
    generated_style: GeneratedStyle::GeneratedAlways,
    column_charset: false,
    add_column: "ADD COLUMN",
    on_update: false,
    display_width: false,
    collation: false,
    forward_references: true,
    placeholder: PlaceholderStyle::Question,
    advisory_lock: None,
    advisory_unlock: None,
    session_setup: &["PRAGMA foreign_keys = OFF"],
    session_teardown: &["PRAGMA foreign_keys = ON"],
    integrity_check: Some("PRAGMA foreign_key_check"),
    increment: IncrementStyle::Autoincrement,
    identity: None,
    uuid_default: None,
};

pub static MSSQL: DialectCapabilities = DialectCapabilities {
    dialect: Dialect::Mssql,
    catalog: CatalogFamily::Mssql,
    quote_open: '[',
    quote_close: ']',
    max_identifier_length: Some(128),
    types: TypeNames {
        small_int: "smallint",
        integer: "int",
        big_int: "bigint",
        decimal: "decimal",
        real: "real",
        double: "float",
        boolean: "bit",
        char: "nchar",
        varchar: "nvarchar",
        text: "nvarchar(max)",
        uuid: "uniqueidentifier",
        date: "date",
        time: "time",
        timestamp: "datetime2",
        timestamptz: "datetimeoffset",
        json: "nvarchar(max)",
        blob: "varbinary(max)",
        varbinary: "varbinary",
        default_varchar_length: Some(255),
    },
    alter_column: AlterColumnStyle::AlterColumnFull,
    rebuild: RebuildTriggers {
        change_column: false,
        drop_column: false,
        restricted_add_column: false,
        constraints: false,
        primary_key: false,
    },
    rename_constraint: RenameStyle::SpRename,
    rename_index: RenameStyle::SpRename,
    drop_index: DropIndexStyle::OnTable,
    drop_foreign_key: "DROP CONSTRAINT",
    drop_check: "DROP CONSTRAINT",
    named_primary_key: true,
    named_defaults: true,
    transactional_ddl: true,
    unique_as_index: false,
    checks: true,
    exclusions: false,
    partial_indexes: true,
    comments: CommentStyle::None,
    generated_columns: true,
    generated_style: GeneratedStyle::Computed,
    column_charset: false,
    add_column: "ADD",
    on_update: false,
    display_width: false,
    collation: true,
    forward_references: false,
    placeholder: PlaceholderStyle::AtP,
    advisory_lock: Some(
        "EXEC sp_getapplock @Resource = 'dbshift_migrations', @LockMode = 'Exclusive', @LockOwner = 'Session'",
    ),
    advisory_unlock: Some(
        "EXEC sp_releaseapplock @Resource = 'dbshift_migrations', @LockOwner = 'Session'",
    ),
    session_setup: &[],
    session_teardown: &[],
    integrity_check: None,
    increment: IncrementStyle::Identity,
    identity: None,
    uuid_default: Some("NEWID()"),
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dialect_from_url() {
        assert_eq!(
            Dialect::from_url("postgres://localhost/app").unwrap(),
            Dialect::Postgres
        );
        assert_eq!(Dialect::from_url("sqlite::memory:").unwrap(), Dialect::Sqlite);
        assert_eq!(Dialect::from_url("mysql://root@db/app").unwrap(), Dialect::MySql);
        assert!(Dialect::from_url("redis://localhost").is_err());
    }

    #[test]
    fn test_dialect_round_trips_through_strings() {
        for dialect in Dialect::ALL {
            let parsed: Dialect = dialect.to_string().parse().unwrap();
            assert_eq!(parsed, dialect);
            assert_eq!(dialect.capabilities().dialect, dialect);
        }
    }

    #[test]
    fn test_quote_ident() {
        assert_eq!(POSTGRES.quote_ident("post"), "\"post\"");
        assert_eq!(POSTGRES.quote_ident("a\"b"), "\"a\"\"b\"");
        assert_eq!(MYSQL.quote_ident("post"), "`post`");
        assert_eq!(MSSQL.quote_ident("a]b"), "[a]]b]");
        assert_eq!(
            POSTGRES.quote_path(Some("public"), "post"),
            "\"public\".\"post\""
        );
    }

    #[test]
    fn test_placeholder() {
        assert_eq!(POSTGRES.placeholder(2), "$2");
        assert_eq!(SQLITE.placeholder(2), "?");
        assert_eq!(MSSQL.placeholder(1), "@p1");
    }

    #[test]
    fn test_truncate_identifier() {
        let long = "x".repeat(80);
        assert_eq!(POSTGRES.truncate_identifier(&long).len(), 63);
        assert_eq!(SQLITE.truncate_identifier(&long).len(), 80);
    }

    #[test]
    fn test_only_sqlite_rebuilds() {
        for dialect in Dialect::ALL {
            let caps = dialect.capabilities();
            assert_eq!(
                caps.rebuild.change_column,
                caps.alter_column == AlterColumnStyle::None
            );
        }
    }
}
