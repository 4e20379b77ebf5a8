use serde::{Deserialize, Serialize};

/// Referential action for `ON DELETE` / `ON UPDATE`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferentialAction {
    #[default]
    NoAction,
    Restrict,
    Cascade,
    SetNull,
    SetDefault,
}

impl ReferentialAction {
    /// SQL spelling.
    pub fn as_sql(&self) -> &'static str {
        match self {
            ReferentialAction::NoAction => "NO ACTION",
            ReferentialAction::Restrict => "RESTRICT",
            ReferentialAction::Cascade => "CASCADE",
            ReferentialAction::SetNull => "SET NULL",
            ReferentialAction::SetDefault => "SET DEFAULT",
        }
    }

    /// Parse a catalog spelling: full words or the Postgres single-letter codes.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_uppercase().replace('_', " ").as_str() {
            "RESTRICT" | "R" => ReferentialAction::Restrict,
            "CASCADE" | "C" => ReferentialAction::Cascade,
            "SET NULL" | "N" => ReferentialAction::SetNull,
            "SET DEFAULT" | "D" => ReferentialAction::SetDefault,
            _ => ReferentialAction::NoAction,
        }
    }
}

/// Constraint classes, used for naming and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConstraintKind {
    PrimaryKey,
    Index,
    Unique,
    Check,
    Exclusion,
    ForeignKey,
}

impl ConstraintKind {
    /// Prefix used by derived names.
    pub fn prefix(&self) -> &'static str {
        match self {
            ConstraintKind::PrimaryKey => "PK",
            ConstraintKind::Index => "IDX",
            ConstraintKind::Unique => "UQ",
            ConstraintKind::Check => "CHK",
            ConstraintKind::Exclusion => "XCL",
            ConstraintKind::ForeignKey => "FK",
        }
    }
}

impl std::fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConstraintKind::PrimaryKey => write!(f, "primary key"),
            ConstraintKind::Index => write!(f, "index"),
            ConstraintKind::Unique => write!(f, "unique"),
            ConstraintKind::Check => write!(f, "check"),
            ConstraintKind::Exclusion => write!(f, "exclusion"),
            ConstraintKind::ForeignKey => write!(f, "foreign key"),
        }
    }
}

/// A (possibly unique, possibly partial) index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub columns: Vec<String>,
    #[serde(default)]
    pub unique: bool,
    /// Partial index predicate (`WHERE ...`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predicate: Option<String>,
}

impl IndexDef {
    pub fn new(columns: &[&str]) -> Self {
        Self {
            name: None,
            columns: columns.iter().map(|c| c.to_string()).collect(),
            unique: false,
            predicate: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn predicate(mut self, predicate: impl Into<String>) -> Self {
        self.predicate = Some(predicate.into());
        self
    }

    /// Structural equality: ordered columns, uniqueness and predicate.
    pub fn same_shape(&self, other: &IndexDef) -> bool {
        self.columns == other.columns
            && self.unique == other.unique
            && self.predicate.as_deref().map(normalize_expression)
                == other.predicate.as_deref().map(normalize_expression)
    }

    /// Resolved name; panics never, returns empty when unresolved.
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or_default()
    }
}

/// A unique constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniqueDef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub columns: Vec<String>,
}

impl UniqueDef {
    pub fn new(columns: &[&str]) -> Self {
        Self {
            name: None,
            columns: columns.iter().map(|c| c.to_string()).collect(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Uniques compare as column sets.
    pub fn same_shape(&self, other: &UniqueDef) -> bool {
        sorted(&self.columns) == sorted(&other.columns)
    }

    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or_default()
    }
}

/// A CHECK constraint. Databases rewrite expressions, so checks are
/// identified by name (derived names hash the expression).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckDef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub expression: String,
}

impl CheckDef {
    pub fn new(expression: impl Into<String>) -> Self {
        Self {
            name: None,
            expression: expression.into(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or_default()
    }
}

/// An EXCLUDE constraint (Postgres family). Identified by name like checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExclusionDef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Everything after `EXCLUDE`, e.g. `USING gist ("room" WITH =)`.
    pub expression: String,
}

impl ExclusionDef {
    pub fn new(expression: impl Into<String>) -> Self {
        Self {
            name: None,
            expression: expression.into(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or_default()
    }
}

/// A foreign key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyDef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub columns: Vec<String>,
    pub referenced_table: String,
    /// Schema of the referenced table when it differs from the owner's.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referenced_schema: Option<String>,
    /// Attached database holding the referenced table.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referenced_database: Option<String>,
    pub referenced_columns: Vec<String>,
    #[serde(default)]
    pub on_delete: ReferentialAction,
    #[serde(default)]
    pub on_update: ReferentialAction,
}

impl ForeignKeyDef {
    pub fn new(columns: &[&str], referenced_table: impl Into<String>, referenced_columns: &[&str]) -> Self {
        Self {
            name: None,
            columns: columns.iter().map(|c| c.to_string()).collect(),
            referenced_table: referenced_table.into(),
            referenced_schema: None,
            referenced_database: None,
            referenced_columns: referenced_columns.iter().map(|c| c.to_string()).collect(),
            on_delete: ReferentialAction::NoAction,
            on_update: ReferentialAction::NoAction,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn on_delete(mut self, action: ReferentialAction) -> Self {
        self.on_delete = action;
        self
    }

    pub fn on_update(mut self, action: ReferentialAction) -> Self {
        self.on_update = action;
        self
    }

    /// Structural equality: columns, target and referential actions.
    ///
    /// `NO ACTION` and `RESTRICT` are kept distinct; some catalogs report
    /// one for the other, so readers normalize before comparing.
    pub fn same_shape(&self, other: &ForeignKeyDef) -> bool {
        self.columns == other.columns
            && self.referenced_table == other.referenced_table
            && self.referenced_columns == other.referenced_columns
            && self.on_delete == other.on_delete
            && self.on_update == other.on_update
    }

    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or_default()
    }

    /// Whether this key points at `table`.
    pub fn references(&self, table: &str) -> bool {
        self.referenced_table == table
    }
}

fn sorted(columns: &[String]) -> Vec<&str> {
    let mut out: Vec<&str> = columns.iter().map(String::as_str).collect();
    out.sort_unstable();
    out
}

/// Normalize an SQL expression for comparison: trim, drop balanced outer
/// parentheses, collapse whitespace.
pub fn normalize_expression(expr: &str) -> String {
    let mut s = expr.trim();
    while s.starts_with('(') && s.ends_with(')') && wraps_whole(s) {
        s = s[1..s.len() - 1].trim();
    }
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// True when the first '(' closes at the final character.
fn wraps_whole(s: &str) -> bool {
    let mut depth = 0usize;
    for (i, c) in s.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth = depth.saturating_sub(1);
                if depth == 0 && i != s.len() - 1 {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0
}
