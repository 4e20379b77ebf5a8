use serde::{Deserialize, Serialize};

/// Dialect-independent column type vocabulary.
///
/// Introspection folds every dialect spelling (`int4`, `integer`, `int`) into
/// one of these; the dialect's capability record renders it back to SQL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogicalType {
    /// 16-bit integer
    SmallInt,
    /// 32-bit integer
    Integer,
    /// 64-bit integer
    BigInt,
    /// Exact numeric with precision and scale
    Decimal,
    /// 32-bit floating point
    Real,
    /// 64-bit floating point
    Double,
    /// Boolean
    Boolean,
    /// Fixed-length string
    Char,
    /// Variable-length string
    Varchar,
    /// Unlimited text
    Text,
    /// UUID (native where available)
    Uuid,
    /// Date without time
    Date,
    /// Time of day
    Time,
    /// Timestamp without time zone
    Timestamp,
    /// Timestamp with time zone
    TimestampTz,
    /// JSON document
    Json,
    /// Binary data
    Binary,
    /// A type outside the vocabulary, rendered verbatim.
    Custom(String),
}

impl LogicalType {
    /// Integer types eligible for increment generation.
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            LogicalType::SmallInt | LogicalType::Integer | LogicalType::BigInt
        )
    }

    /// Types whose default literals are quoted strings.
    pub fn is_textual(&self) -> bool {
        matches!(
            self,
            LogicalType::Char
                | LogicalType::Varchar
                | LogicalType::Text
                | LogicalType::Uuid
                | LogicalType::Json
                | LogicalType::Date
                | LogicalType::Time
                | LogicalType::Timestamp
                | LogicalType::TimestampTz
        )
    }

    /// Types that carry a length modifier.
    pub fn takes_length(&self) -> bool {
        matches!(
            self,
            LogicalType::Char | LogicalType::Varchar | LogicalType::Binary
        )
    }

    /// Types that carry precision and scale.
    pub fn takes_precision(&self) -> bool {
        matches!(self, LogicalType::Decimal)
    }
}

impl std::fmt::Display for LogicalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogicalType::SmallInt => write!(f, "smallint"),
            LogicalType::Integer => write!(f, "integer"),
            LogicalType::BigInt => write!(f, "bigint"),
            LogicalType::Decimal => write!(f, "decimal"),
            LogicalType::Real => write!(f, "real"),
            LogicalType::Double => write!(f, "double"),
            LogicalType::Boolean => write!(f, "boolean"),
            LogicalType::Char => write!(f, "char"),
            LogicalType::Varchar => write!(f, "varchar"),
            LogicalType::Text => write!(f, "text"),
            LogicalType::Uuid => write!(f, "uuid"),
            LogicalType::Date => write!(f, "date"),
            LogicalType::Time => write!(f, "time"),
            LogicalType::Timestamp => write!(f, "timestamp"),
            LogicalType::TimestampTz => write!(f, "timestamptz"),
            LogicalType::Json => write!(f, "json"),
            LogicalType::Binary => write!(f, "binary"),
            LogicalType::Custom(name) => write!(f, "{}", name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_classes() {
        assert!(LogicalType::BigInt.is_integer());
        assert!(!LogicalType::Decimal.is_integer());
        assert!(LogicalType::Varchar.takes_length());
        assert!(LogicalType::Decimal.takes_precision());
        assert!(LogicalType::Uuid.is_textual());
    }

    #[test]
    fn test_custom_type_deserializes() {
        let ty: LogicalType = serde_json::from_str(r#"{"custom":"citext"}"#).unwrap();
        assert_eq!(ty, LogicalType::Custom("citext".into()));
        assert_eq!(ty.to_string(), "citext");

        let ty: LogicalType = serde_json::from_str(r#""timestamptz""#).unwrap();
        assert_eq!(ty, LogicalType::TimestampTz);
    }
}
