//! Semantic column types and the typed values rows carry.
//!
//! The set of column types is closed: every backend maps its native type names onto
//! one of these variants during schema discovery, and row decoding dispatches on them.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Semantic type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    String,
    Integer,
    BigInt,
    Float,
    Boolean,
    Date,
    Timestamp,
    Uuid,
    Binary,
}

impl ColumnType {
    pub fn is_number(self) -> bool {
        matches!(self, ColumnType::Integer | ColumnType::BigInt | ColumnType::Float)
    }

    pub fn is_time_based(self) -> bool {
        matches!(self, ColumnType::Date | ColumnType::Timestamp)
    }

    pub fn is_boolean(self) -> bool {
        self == ColumnType::Boolean
    }

    /// Map a backend-reported type name onto a semantic type.
    ///
    /// Covers the names used by wide-column stores (CQL), search-index mappings and
    /// graph property types. Unknown names are treated as strings, which is the only
    /// safe choice for schema-less stores.
    pub fn from_native_name(name: &str) -> ColumnType {
        match name.trim().to_ascii_lowercase().as_str() {
            "uuid" | "timeuuid" => ColumnType::Uuid,
            "int" | "integer" | "smallint" | "tinyint" | "short" | "byte" => ColumnType::Integer,
            "bigint" | "long" | "counter" | "varint" => ColumnType::BigInt,
            "float" | "double" | "decimal" | "half_float" | "scaled_float" => ColumnType::Float,
            "boolean" | "bool" => ColumnType::Boolean,
            "timestamp" | "datetime" => ColumnType::Timestamp,
            "date" => ColumnType::Date,
            "blob" | "binary" => ColumnType::Binary,
            _ => ColumnType::String,
        }
    }

    /// Infer a type from a sampled JSON value. `None` for nulls, which carry no type.
    pub fn infer_from_json(value: &serde_json::Value) -> Option<ColumnType> {
        match value {
            serde_json::Value::Null => None,
            serde_json::Value::Bool(_) => Some(ColumnType::Boolean),
            serde_json::Value::Number(n) => {
                if n.is_f64() {
                    Some(ColumnType::Float)
                } else if n.as_i64().is_some_and(|v| i32::try_from(v).is_ok()) {
                    Some(ColumnType::Integer)
                } else {
                    Some(ColumnType::BigInt)
                }
            }
            serde_json::Value::String(s) => {
                if Uuid::parse_str(s).is_ok() && s.len() == 36 {
                    Some(ColumnType::Uuid)
                } else if DateTime::parse_from_rfc3339(s).is_ok() {
                    Some(ColumnType::Timestamp)
                } else {
                    Some(ColumnType::String)
                }
            }
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => Some(ColumnType::String),
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnType::String => "STRING",
            ColumnType::Integer => "INTEGER",
            ColumnType::BigInt => "BIGINT",
            ColumnType::Float => "FLOAT",
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::Date => "DATE",
            ColumnType::Timestamp => "TIMESTAMP",
            ColumnType::Uuid => "UUID",
            ColumnType::Binary => "BINARY",
        };
        f.write_str(name)
    }
}

/// A typed cell value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    String(String),
    Integer(i32),
    BigInt(i64),
    Float(f64),
    Boolean(bool),
    Timestamp(DateTime<Utc>),
    Uuid(Uuid),
    Binary(Vec<u8>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(v) => Some(f64::from(*v)),
            Value::BigInt(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(i64::from(*v)),
            Value::BigInt(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Whether this value may be stored in a column of the given type.
    ///
    /// Null conforms to every type (nullability is checked separately); integers
    /// widen into bigint and float columns.
    pub fn conforms_to(&self, column_type: ColumnType) -> bool {
        match (self, column_type) {
            (Value::Null, _) => true,
            (Value::String(_), ColumnType::String) => true,
            (Value::Integer(_), ColumnType::Integer | ColumnType::BigInt | ColumnType::Float) => {
                true
            }
            (Value::BigInt(_), ColumnType::BigInt | ColumnType::Float) => true,
            (Value::Float(_), ColumnType::Float) => true,
            (Value::Boolean(_), ColumnType::Boolean) => true,
            (Value::Timestamp(_), ColumnType::Date | ColumnType::Timestamp) => true,
            (Value::Uuid(_), ColumnType::Uuid) => true,
            (Value::Binary(_), ColumnType::Binary) => true,
            _ => false,
        }
    }

    /// Equality used by predicates: numbers compare numerically across widths, and
    /// UUIDs/timestamps compare equal to their canonical string form.
    pub fn loosely_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Null, _) | (_, Value::Null) => false,
            _ => self.partial_compare(other) == Some(Ordering::Equal),
        }
    }

    /// Ordering between two values of compatible kinds; `None` if they cannot be
    /// compared (e.g. a boolean against a number).
    pub fn partial_compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, Value::Null) => Some(Ordering::Equal),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
            (Value::Timestamp(a), Value::Timestamp(b)) => Some(a.cmp(b)),
            (Value::Uuid(a), Value::Uuid(b)) => Some(a.cmp(b)),
            (Value::Binary(a), Value::Binary(b)) => Some(a.cmp(b)),
            (Value::Uuid(a), Value::String(b)) => Uuid::parse_str(b).ok().map(|b| a.cmp(&b)),
            (Value::String(a), Value::Uuid(b)) => Uuid::parse_str(a).ok().map(|a| a.cmp(b)),
            (Value::Timestamp(a), Value::String(b)) => parse_timestamp(b).map(|b| a.cmp(&b)),
            (Value::String(a), Value::Timestamp(b)) => parse_timestamp(a).map(|a| a.cmp(b)),
            (a, b) => match (a.as_i64(), b.as_i64()) {
                (Some(x), Some(y)) => Some(x.cmp(&y)),
                _ => match (a.as_f64(), b.as_f64()) {
                    (Some(x), Some(y)) => x.partial_cmp(&y),
                    _ => None,
                },
            },
        }
    }

    /// Total order for sorting: nulls first, then values by `partial_compare`;
    /// incomparable pairs are treated as equal so sorting stays stable.
    pub fn sort_compare(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Null, _) => Ordering::Less,
            (_, Value::Null) => Ordering::Greater,
            _ => self.partial_compare(other).unwrap_or(Ordering::Equal),
        }
    }
}

pub(crate) fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::String(s) => f.write_str(s),
            Value::Integer(v) => write!(f, "{}", v),
            Value::BigInt(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Boolean(v) => write!(f, "{}", v),
            Value::Timestamp(v) => write!(f, "{}", v.to_rfc3339()),
            Value::Uuid(v) => write!(f, "{}", v),
            Value::Binary(bytes) => {
                f.write_str("0x")?;
                for b in bytes {
                    write!(f, "{:02x}", b)?;
                }
                Ok(())
            }
        }
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::BigInt(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<Uuid> for Value {
    fn from(v: Uuid) -> Self {
        Value::Uuid(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Timestamp(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Binary(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_native_type_names() {
        assert_eq!(ColumnType::from_native_name("uuid"), ColumnType::Uuid);
        assert_eq!(ColumnType::from_native_name("text"), ColumnType::String);
        assert_eq!(ColumnType::from_native_name("boolean"), ColumnType::Boolean);
        assert_eq!(ColumnType::from_native_name("float"), ColumnType::Float);
        assert_eq!(ColumnType::from_native_name("int"), ColumnType::Integer);
        assert_eq!(ColumnType::from_native_name("timestamp"), ColumnType::Timestamp);
        assert_eq!(ColumnType::from_native_name("counter"), ColumnType::BigInt);
        assert_eq!(ColumnType::from_native_name("long"), ColumnType::BigInt);
        assert_eq!(ColumnType::from_native_name("date"), ColumnType::Date);
        assert_eq!(ColumnType::from_native_name("something_new"), ColumnType::String);
    }

    #[test]
    fn test_infer_from_json() {
        assert_eq!(ColumnType::infer_from_json(&json!(null)), None);
        assert_eq!(ColumnType::infer_from_json(&json!(true)), Some(ColumnType::Boolean));
        assert_eq!(ColumnType::infer_from_json(&json!(3)), Some(ColumnType::Integer));
        assert_eq!(
            ColumnType::infer_from_json(&json!(9_000_000_000i64)),
            Some(ColumnType::BigInt)
        );
        assert_eq!(ColumnType::infer_from_json(&json!(2.15)), Some(ColumnType::Float));
        assert_eq!(
            ColumnType::infer_from_json(&json!("756716f7-2e54-4715-9f00-91dcbea6cf51")),
            Some(ColumnType::Uuid)
        );
        assert_eq!(
            ColumnType::infer_from_json(&json!("2013-01-04T15:55:51.217+01:00")),
            Some(ColumnType::Timestamp)
        );
        assert_eq!(ColumnType::infer_from_json(&json!("hello")), Some(ColumnType::String));
    }

    #[test]
    fn test_conforms_to() {
        assert!(Value::Null.conforms_to(ColumnType::Uuid));
        assert!(Value::Integer(1).conforms_to(ColumnType::BigInt));
        assert!(Value::Integer(1).conforms_to(ColumnType::Float));
        assert!(!Value::Float(1.0).conforms_to(ColumnType::Integer));
        assert!(!Value::from("x").conforms_to(ColumnType::Boolean));
        assert!(Value::Timestamp(Utc::now()).conforms_to(ColumnType::Date));
    }

    #[test]
    fn test_compare_across_kinds() {
        assert!(Value::Integer(2).loosely_equals(&Value::BigInt(2)));
        assert!(Value::Integer(2).loosely_equals(&Value::Float(2.0)));
        assert_eq!(
            Value::Float(2.55).partial_compare(&Value::Integer(3)),
            Some(Ordering::Less)
        );

        let id = Uuid::parse_str("756716f7-2e54-4715-9f00-91dcbea6cf51").unwrap();
        assert!(Value::Uuid(id).loosely_equals(&Value::from("756716f7-2e54-4715-9f00-91dcbea6cf51")));
        assert_eq!(Value::Boolean(true).partial_compare(&Value::Integer(1)), None);
        assert!(!Value::Null.loosely_equals(&Value::from("x")));
    }

    #[test]
    fn test_sort_compare_nulls_first() {
        assert_eq!(Value::Null.sort_compare(&Value::Integer(1)), Ordering::Less);
        assert_eq!(Value::from("b").sort_compare(&Value::from("a")), Ordering::Greater);
        assert_eq!(Value::Boolean(true).sort_compare(&Value::from("a")), Ordering::Equal);
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::from("My first song").to_string(), "My first song");
        assert_eq!(Value::Integer(1).to_string(), "1");
        assert_eq!(Value::Binary(vec![0xca, 0xfe]).to_string(), "0xcafe");
        assert_eq!(Value::Null.to_string(), "null");
        assert_eq!(Value::from(None::<i32>), Value::Null);
    }
}
