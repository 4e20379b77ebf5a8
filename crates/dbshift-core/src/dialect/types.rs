use super::{CatalogFamily, DialectCapabilities, IncrementStyle};
use crate::schema::{ColumnDef, Generation, LogicalType};

/// A parsed SQL type: logical type plus modifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeSpec {
    pub column_type: LogicalType,
    pub length: Option<u32>,
    pub precision: Option<u32>,
    pub scale: Option<u32>,
    pub width: Option<u32>,
}

impl TypeSpec {
    fn new(column_type: LogicalType) -> Self {
        Self {
            column_type,
            length: None,
            precision: None,
            scale: None,
            width: None,
        }
    }

    fn custom(spelled: &str) -> Self {
        Self::new(LogicalType::Custom(spelled.to_string()))
    }

    /// The type modifiers of a column.
    pub fn of(column: &ColumnDef) -> Self {
        Self {
            column_type: column.column_type.clone(),
            length: column.length,
            precision: column.precision,
            scale: column.scale,
            width: column.width,
        }
    }

    /// Copy the parsed type onto a column.
    pub fn apply_to(self, column: &mut ColumnDef) {
        column.column_type = self.column_type;
        column.length = self.length;
        column.precision = self.precision;
        column.scale = self.scale;
        column.width = self.width;
    }
}

impl DialectCapabilities {
    /// Render a column's SQL type, without increment pseudo-types.
    pub fn render_type(&self, column: &ColumnDef) -> String {
        self.render_spec(&TypeSpec::of(column))
    }

    /// Render the type used when declaring a column: increment columns use
    /// the dialect's serial pseudo-type or SQLite's rowid alias.
    pub fn render_declared_type(&self, column: &ColumnDef) -> String {
        if column.generation == Generation::Increment {
            match self.increment {
                IncrementStyle::Serial => {
                    return match column.column_type {
                        LogicalType::SmallInt => "smallserial",
                        LogicalType::BigInt => "bigserial",
                        _ => "serial",
                    }
                    .to_string();
                }
                IncrementStyle::Autoincrement => return "integer".to_string(),
                IncrementStyle::AutoIncrement | IncrementStyle::Identity => {}
            }
        }
        self.render_type(column)
    }

    pub fn render_spec(&self, spec: &TypeSpec) -> String {
        let t = &self.types;
        let with_width = |name: &str| match spec.width {
            Some(w) if self.display_width => format!("{}({})", name, w),
            _ => name.to_string(),
        };
        let with_length = |name: &str, length: Option<u32>| match length {
            Some(l) => format!("{}({})", name, l),
            None => name.to_string(),
        };

        match &spec.column_type {
            LogicalType::SmallInt => with_width(t.small_int),
            LogicalType::Integer => with_width(t.integer),
            LogicalType::BigInt => with_width(t.big_int),
            LogicalType::Decimal => match (spec.precision, spec.scale) {
                (Some(p), Some(s)) => format!("{}({},{})", t.decimal, p, s),
                (Some(p), None) => format!("{}({})", t.decimal, p),
                _ => t.decimal.to_string(),
            },
            LogicalType::Real => t.real.to_string(),
            LogicalType::Double => t.double.to_string(),
            LogicalType::Boolean => t.boolean.to_string(),
            LogicalType::Char => with_length(t.char, spec.length),
            LogicalType::Varchar => {
                with_length(t.varchar, spec.length.or(t.default_varchar_length))
            }
            LogicalType::Text => t.text.to_string(),
            LogicalType::Uuid => t.uuid.to_string(),
            LogicalType::Date => t.date.to_string(),
            LogicalType::Time => t.time.to_string(),
            LogicalType::Timestamp => t.timestamp.to_string(),
            LogicalType::TimestampTz => t.timestamptz.to_string(),
            LogicalType::Json => t.json.to_string(),
            LogicalType::Binary => match spec.length {
                Some(l) if t.varbinary != t.blob => format!("{}({})", t.varbinary, l),
                _ => t.blob.to_string(),
            },
            LogicalType::Custom(name) => name.clone(),
        }
    }

    /// Parse a catalog type spelling (with modifiers, e.g. `varchar(50)`)
    /// into the logical vocabulary.
    ///
    /// A spelling that would not render back to itself is kept verbatim as a
    /// custom type, so rendering a parsed type always reproduces the catalog.
    pub fn parse_type(&self, spelled: &str) -> TypeSpec {
        let canonical = canonical_spelling(spelled);
        match self.parse_known(&canonical) {
            Some(spec) if self.render_spec(&spec) == canonical => spec,
            _ => TypeSpec::custom(&canonical),
        }
    }

    fn parse_known(&self, canonical: &str) -> Option<TypeSpec> {
        let (base, args) = match canonical.find('(') {
            Some(open) => {
                let close = canonical.rfind(')')?;
                if close + 1 != canonical.len() {
                    return None;
                }
                (canonical[..open].trim(), Some(&canonical[open + 1..close]))
            }
            None => (canonical, None),
        };
        let nums: Vec<u32> = args
            .map(|a| a.split(',').filter_map(|n| n.trim().parse().ok()).collect())
            .unwrap_or_default();
        let first = nums.first().copied();
        let is_max = args.map(|a| a.trim() == "max").unwrap_or(false);
        let mysql = self.catalog == CatalogFamily::MySql;
        let mssql = self.catalog == CatalogFamily::Mssql;

        let mut spec = match base {
            "tinyint" if mysql && first == Some(1) => TypeSpec::new(LogicalType::Boolean),
            "smallint" | "int2" => width(LogicalType::SmallInt, first),
            "integer" | "int" | "int4" => width(LogicalType::Integer, first),
            "bigint" | "int8" => width(LogicalType::BigInt, first),
            "decimal" | "numeric" => {
                let mut spec = TypeSpec::new(LogicalType::Decimal);
                spec.precision = first;
                spec.scale = nums.get(1).copied();
                spec
            }
            "real" | "float4" => TypeSpec::new(LogicalType::Real),
            "float" if mssql => TypeSpec::new(LogicalType::Double),
            "float" => TypeSpec::new(LogicalType::Real),
            "double" | "double precision" | "float8" => TypeSpec::new(LogicalType::Double),
            "boolean" | "bool" => TypeSpec::new(LogicalType::Boolean),
            "bit" if mssql => TypeSpec::new(LogicalType::Boolean),
            "char" | "character" | "nchar" | "bpchar" => length(LogicalType::Char, first),
            "varchar" | "character varying" | "nvarchar" if is_max => {
                TypeSpec::new(LogicalType::Text)
            }
            "varchar" | "character varying" | "nvarchar" => length(LogicalType::Varchar, first),
            "text" | "ntext" | "clob" => TypeSpec::new(LogicalType::Text),
            "uuid" | "uniqueidentifier" => TypeSpec::new(LogicalType::Uuid),
            "date" => TypeSpec::new(LogicalType::Date),
            "time" | "time without time zone" => TypeSpec::new(LogicalType::Time),
            "timestamp" if mysql => TypeSpec::new(LogicalType::TimestampTz),
            "timestamp" | "timestamp without time zone" | "datetime" | "datetime2" => {
                TypeSpec::new(LogicalType::Timestamp)
            }
            "timestamptz" | "timestamp with time zone" | "datetimeoffset" => {
                TypeSpec::new(LogicalType::TimestampTz)
            }
            "json" | "jsonb" => TypeSpec::new(LogicalType::Json),
            "bytea" | "blob" => TypeSpec::new(LogicalType::Binary),
            "varbinary" | "binary" if is_max => TypeSpec::new(LogicalType::Binary),
            "varbinary" | "binary" => length(LogicalType::Binary, first),
            _ => return None,
        };

        if args.is_some() && nums.is_empty() && !is_max {
            spec = TypeSpec::custom(canonical);
        }
        Some(spec)
    }
}

fn width(column_type: LogicalType, width: Option<u32>) -> TypeSpec {
    let mut spec = TypeSpec::new(column_type);
    spec.width = width;
    spec
}

fn length(column_type: LogicalType, length: Option<u32>) -> TypeSpec {
    let mut spec = TypeSpec::new(column_type);
    spec.length = length;
    spec
}

/// Lowercase, collapse whitespace and drop spaces around modifier commas.
fn canonical_spelling(spelled: &str) -> String {
    spelled
        .trim()
        .to_ascii_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace(", ", ",")
        .replace(" (", "(")
}
