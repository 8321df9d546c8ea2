//! Decoding of raw backend fields into typed values, and the reverse for mutations.
//!
//! Dispatch is a single match over [`ColumnType`]; every type has exactly one coercion
//! rule. Backends that store numbers or dates as strings (search indexes commonly do)
//! are handled by parsing the string form.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use super::{DataSetHeader, RawRecord, Row};
use crate::error::{DataError, DataResult};
use crate::query::SelectItem;
use crate::schema::{parse_timestamp, ColumnType, Value};

/// Backend-specific conversion of a raw record into a typed row.
pub trait RowTranslator: Send + Sync {
    fn translate_row(&self, raw: &RawRecord, header: &Arc<DataSetHeader>) -> DataResult<Row>;
}

/// Translator for JSON-shaped records: primary-key columns take the record's native
/// identifier when it has one, other columns are decoded from the same-named field.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultRowTranslator;

impl RowTranslator for DefaultRowTranslator {
    fn translate_row(&self, raw: &RawRecord, header: &Arc<DataSetHeader>) -> DataResult<Row> {
        let mut values = Vec::with_capacity(header.size());
        for item in header.items() {
            let column = match item {
                SelectItem::Column(c) => c,
                SelectItem::Aggregate { .. } => {
                    return Err(DataError::TypeError(format!(
                        "Aggregate '{}' cannot be decoded from a raw record",
                        item
                    )));
                }
            };

            let value = match (&raw.id, column.is_primary_key()) {
                (Some(id), true) => decode_value(&JsonValue::String(id.clone()), column.column_type())?,
                _ => decode_value(raw.field(column.name()), column.column_type())?,
            };
            values.push(value);
        }
        Row::new(header.clone(), values)
    }
}

static NULL: JsonValue = JsonValue::Null;

/// Decode one field. Missing fields arrive as JSON null.
pub fn decode_value(field: &JsonValue, column_type: ColumnType) -> DataResult<Value> {
    if field.is_null() {
        return Ok(Value::Null);
    }
    if let JsonValue::String(s) = field {
        if s.is_empty() && column_type != ColumnType::String && column_type != ColumnType::Binary {
            return Ok(Value::Null);
        }
    }

    match column_type {
        ColumnType::String => Ok(Value::String(match field {
            JsonValue::String(s) => s.clone(),
            other => other.to_string(),
        })),
        ColumnType::Integer => {
            let n = as_i64(field, column_type)?;
            i32::try_from(n)
                .map(Value::Integer)
                .map_err(|_| mismatch(field, column_type))
        }
        ColumnType::BigInt => as_i64(field, column_type).map(Value::BigInt),
        ColumnType::Float => match field {
            JsonValue::Number(n) => n.as_f64().map(Value::Float).ok_or_else(|| mismatch(field, column_type)),
            JsonValue::String(s) => s
                .trim()
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|_| mismatch(field, column_type)),
            _ => Err(mismatch(field, column_type)),
        },
        ColumnType::Boolean => match field {
            JsonValue::Bool(b) => Ok(Value::Boolean(*b)),
            JsonValue::String(s) if s.eq_ignore_ascii_case("true") => Ok(Value::Boolean(true)),
            JsonValue::String(s) if s.eq_ignore_ascii_case("false") => Ok(Value::Boolean(false)),
            JsonValue::Number(n) if n.as_i64() == Some(0) => Ok(Value::Boolean(false)),
            JsonValue::Number(n) if n.as_i64() == Some(1) => Ok(Value::Boolean(true)),
            _ => Err(mismatch(field, column_type)),
        },
        ColumnType::Date | ColumnType::Timestamp => match field {
            JsonValue::String(s) => parse_date(s)
                .map(Value::Timestamp)
                .ok_or_else(|| mismatch(field, column_type)),
            JsonValue::Number(n) => n
                .as_i64()
                .and_then(|millis| Utc.timestamp_millis_opt(millis).single())
                .map(Value::Timestamp)
                .ok_or_else(|| mismatch(field, column_type)),
            _ => Err(mismatch(field, column_type)),
        },
        ColumnType::Uuid => match field {
            JsonValue::String(s) => Uuid::parse_str(s)
                .map(Value::Uuid)
                .map_err(|_| mismatch(field, column_type)),
            _ => Err(mismatch(field, column_type)),
        },
        ColumnType::Binary => match field {
            JsonValue::String(s) => Ok(Value::Binary(s.as_bytes().to_vec())),
            JsonValue::Array(items) => items
                .iter()
                .map(|b| b.as_u64().and_then(|b| u8::try_from(b).ok()))
                .collect::<Option<Vec<u8>>>()
                .map(Value::Binary)
                .ok_or_else(|| mismatch(field, column_type)),
            _ => Err(mismatch(field, column_type)),
        },
    }
}

/// Encode a typed value into the JSON shape stored by document backends.
pub fn encode_value(value: &Value) -> JsonValue {
    match value {
        Value::Null => JsonValue::Null,
        Value::String(s) => JsonValue::String(s.clone()),
        Value::Integer(v) => JsonValue::from(*v),
        Value::BigInt(v) => JsonValue::from(*v),
        Value::Float(v) => serde_json::Number::from_f64(*v)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        Value::Boolean(v) => JsonValue::Bool(*v),
        Value::Timestamp(v) => JsonValue::String(v.to_rfc3339()),
        Value::Uuid(v) => JsonValue::String(v.to_string()),
        Value::Binary(bytes) => JsonValue::Array(bytes.iter().map(|b| JsonValue::from(*b)).collect()),
    }
}

pub(crate) fn null_field() -> &'static JsonValue {
    &NULL
}

fn as_i64(field: &JsonValue, column_type: ColumnType) -> DataResult<i64> {
    match field {
        JsonValue::Number(n) => n
            .as_i64()
            .or_else(|| {
                n.as_f64()
                    .filter(|f| f.fract() == 0.0 && *f >= i64::MIN as f64 && *f < i64::MAX as f64)
                    .map(|f| f as i64)
            })
            .ok_or_else(|| mismatch(field, column_type)),
        JsonValue::String(s) => s.trim().parse::<i64>().map_err(|_| mismatch(field, column_type)),
        _ => Err(mismatch(field, column_type)),
    }
}

fn parse_date(s: &str) -> Option<DateTime<Utc>> {
    if let Some(dt) = parse_timestamp(s) {
        return Some(dt);
    }
    const FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"];
    for format in FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

fn mismatch(field: &JsonValue, column_type: ColumnType) -> DataError {
    DataError::TypeError(format!("Cannot decode {} as {}", field, column_type))
}
