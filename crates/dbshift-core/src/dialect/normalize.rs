use super::{CatalogFamily, DialectCapabilities};
use crate::schema::{ColumnDef, LogicalType};

impl DialectCapabilities {
    /// Normalize a default expression so desired and introspected defaults
    /// compare equal when the database would treat them the same.
    ///
    /// Strips redundant outer parentheses, Postgres casts and the SQL Server
    /// `N` prefix, folds boolean and numeric literals, and lowercases
    /// non-literal expressions. `NULL` normalizes to no default.
    pub fn normalize_default(&self, column: &ColumnDef, raw: Option<&str>) -> Option<String> {
        let mut expr = strip_parens(raw?.trim()).to_string();
        if self.catalog == CatalogFamily::Postgres {
            expr = strip_parens(&strip_casts(&expr)).to_string();
        }
        if let Some(rest) = expr.strip_prefix("N'").map(str::to_string) {
            expr = format!("'{}", rest);
        }
        if expr.is_empty() || expr.eq_ignore_ascii_case("null") {
            return None;
        }

        let ty = &column.column_type;
        if *ty == LogicalType::Boolean {
            if let Some(b) = boolean_literal(&expr) {
                return Some(b.to_string());
            }
        }
        if is_numeric(ty) {
            if let Some(n) = numeric_literal(unquote(&expr).unwrap_or(&expr)) {
                return Some(n);
            }
        }
        if unquote(&expr).is_some() {
            return Some(expr);
        }

        let lowered = expr.to_ascii_lowercase();
        let folded = match lowered.as_str() {
            "now()" | "current_timestamp()" | "getdate()" | "sysdatetime()" => {
                "current_timestamp".to_string()
            }
            _ => lowered,
        };
        Some(folded)
    }

    /// Whether a default expression is this dialect's UUID generator.
    pub fn is_uuid_default(&self, expr: &str) -> bool {
        let expr = strip_parens(expr.trim()).to_ascii_lowercase();
        let known = self
            .uuid_default
            .map(|d| strip_parens(d).to_ascii_lowercase() == expr)
            .unwrap_or(false);
        known || expr == "uuid_generate_v4()" || expr == "newid()" || expr == "uuid()"
    }

    /// Whether a default expression is a sequence-backed increment
    /// (`nextval(...)`, `unique_rowid()`).
    pub fn is_increment_default(&self, expr: &str) -> bool {
        let expr = expr.trim().to_ascii_lowercase();
        expr.starts_with("nextval(") || expr == "unique_rowid()"
    }
}

fn is_numeric(ty: &LogicalType) -> bool {
    matches!(
        ty,
        LogicalType::SmallInt
            | LogicalType::Integer
            | LogicalType::BigInt
            | LogicalType::Decimal
            | LogicalType::Real
            | LogicalType::Double
    )
}

/// Remove parentheses that wrap the whole expression.
fn strip_parens(mut s: &str) -> &str {
    while s.starts_with('(') && s.ends_with(')') && closes_at_end(s) {
        s = s[1..s.len() - 1].trim();
    }
    s
}

fn closes_at_end(s: &str) -> bool {
    let mut depth = 0i32;
    let mut in_quote = false;
    for (i, c) in s.char_indices() {
        match c {
            '\'' => in_quote = !in_quote,
            '(' if !in_quote => depth += 1,
            ')' if !in_quote => {
                depth -= 1;
                if depth == 0 && i != s.len() - 1 {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0
}

/// Remove `::type` casts outside string literals.
fn strip_casts(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut out = String::with_capacity(s.len());
    let mut in_quote = false;
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c == '\'' {
            in_quote = !in_quote;
        }
        if !in_quote && c == ':' && chars.get(i + 1) == Some(&':') {
            i += 2;
            let mut depth = 0;
            while i < chars.len() {
                let t = chars[i];
                let part_of_type = t.is_ascii_alphanumeric()
                    || t == '_'
                    || t == '"'
                    || t == '.'
                    || t == '['
                    || t == ']'
                    || (t == ' ' && next_is_word(&chars, i))
                    || t == '('
                    || (t == ')' && depth > 0)
                    || (t == ',' && depth > 0);
                if !part_of_type {
                    break;
                }
                match t {
                    '(' => depth += 1,
                    ')' => depth -= 1,
                    _ => {}
                }
                i += 1;
            }
            continue;
        }
        out.push(c);
        i += 1;
    }
    out.trim().to_string()
}

/// A space continues a multi-word type name (`character varying`).
fn next_is_word(chars: &[char], i: usize) -> bool {
    chars
        .get(i + 1)
        .map(|c| c.is_ascii_alphabetic())
        .unwrap_or(false)
}

fn unquote(s: &str) -> Option<&str> {
    if s.len() >= 2 && s.starts_with('\'') && s.ends_with('\'') {
        Some(&s[1..s.len() - 1])
    } else {
        None
    }
}

fn boolean_literal(s: &str) -> Option<bool> {
    let inner = unquote(s).unwrap_or(s).to_ascii_lowercase();
    match inner.as_str() {
        "true" | "t" | "1" | "b'1'" | "yes" => Some(true),
        "false" | "f" | "0" | "b'0'" | "no" => Some(false),
        _ => None,
    }
}

fn numeric_literal(s: &str) -> Option<String> {
    let s = s.trim();
    if let Ok(i) = s.parse::<i64>() {
        return Some(i.to_string());
    }
    s.parse::<f64>().ok().map(|f| f.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::Dialect;

    fn text() -> ColumnDef {
        ColumnDef::varchar("name", 50)
    }

    #[test]
    fn test_pg_casts_are_stripped() {
        let pg = Dialect::Postgres.capabilities();
        assert_eq!(
            pg.normalize_default(&text(), Some("'draft'::character varying")),
            Some("'draft'".to_string())
        );
        assert_eq!(
            pg.normalize_default(&text(), Some("'a::b'::text")),
            Some("'a::b'".to_string())
        );
    }

    #[test]
    fn test_mssql_parens_and_prefix() {
        let mssql = Dialect::Mssql.capabilities();
        let int = ColumnDef::new("n", LogicalType::Integer);
        assert_eq!(mssql.normalize_default(&int, Some("((0))")), Some("0".to_string()));
        assert_eq!(
            mssql.normalize_default(&text(), Some("(N'x')")),
            Some("'x'".to_string())
        );
    }

    #[test]
    fn test_boolean_and_numeric_fold() {
        let mysql = Dialect::MySql.capabilities();
        let flag = ColumnDef::new("flag", LogicalType::Boolean);
        assert_eq!(mysql.normalize_default(&flag, Some("1")), Some("true".to_string()));
        assert_eq!(mysql.normalize_default(&flag, Some("false")), Some("false".to_string()));

        let price = ColumnDef::new("price", LogicalType::Decimal).precision(10, 2);
        assert_eq!(mysql.normalize_default(&price, Some("'0.00'")), Some("0".to_string()));
        assert_eq!(mysql.normalize_default(&price, Some("0")), Some("0".to_string()));
    }

    #[test]
    fn test_expressions_fold_case() {
        let pg = Dialect::Postgres.capabilities();
        let ts = ColumnDef::new("at", LogicalType::Timestamp);
        assert_eq!(
            pg.normalize_default(&ts, Some("now()")),
            pg.normalize_default(&ts, Some("CURRENT_TIMESTAMP"))
        );
        assert_eq!(pg.normalize_default(&ts, Some("NULL")), None);
        assert_eq!(pg.normalize_default(&ts, None), None);
    }

    #[test]
    fn test_generator_defaults() {
        let pg = Dialect::Postgres.capabilities();
        assert!(pg.is_uuid_default("gen_random_uuid()"));
        assert!(pg.is_increment_default("nextval('post_id_seq'::regclass)"));
        assert!(Dialect::MySql.capabilities().is_uuid_default("(uuid())"));
        assert!(!pg.is_uuid_default("'abc'"));
    }
}
