//! Bindable SQL values and row decoding for MySQL.
//!
//! Everything the compiler binds travels as a [`SqlValue`]; everything a
//! statement returns is decoded into `serde_json::Value` keyed by column
//! name, dispatching on the driver's declared column type.

use base64::Engine;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde_json::{Map as JsonMap, Value as JsonValue};
use sqlx::mysql::{MySql, MySqlArguments, MySqlRow};
use sqlx::query::Query;
use sqlx::{Column, Row as SqlxRow, TypeInfo};

use crate::{GatewayError, Result};

/// A value bound into a parameterized statement.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// NULL
    Null,
    /// BOOLEAN / TINYINT(1)
    Bool(bool),
    /// Signed integer (TINYINT..BIGINT)
    Int(i64),
    /// Unsigned BIGINT
    UInt(u64),
    /// FLOAT / DOUBLE
    Double(f64),
    /// Character data (CHAR, VARCHAR, TEXT, ENUM, dates as text)
    String(String),
    /// JSON column payload, bound as serialized text
    Json(JsonValue),
}

impl SqlValue {
    /// Converts a JSON scalar into its natural bound representation.
    ///
    /// Objects and arrays keep their JSON form; the executor serializes them
    /// to text at bind time, which is what MySQL JSON columns accept.
    pub fn from_json(value: &JsonValue) -> SqlValue {
        match value {
            JsonValue::Null => SqlValue::Null,
            JsonValue::Bool(v) => SqlValue::Bool(*v),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    SqlValue::Int(i)
                } else if let Some(u) = n.as_u64() {
                    SqlValue::UInt(u)
                } else {
                    SqlValue::Double(n.as_f64().unwrap_or(0.0))
                }
            }
            JsonValue::String(s) => SqlValue::String(s.clone()),
            other => SqlValue::Json(other.clone()),
        }
    }

    /// Forces JSON-text encoding regardless of the value shape.
    ///
    /// Used for catalog columns declared as JSON, where even scalar inputs
    /// must arrive as valid JSON text.
    pub fn as_json_text(value: &JsonValue) -> SqlValue {
        SqlValue::String(value.to_string())
    }
}

/// Binds a slice of values onto a sqlx query in order.
pub fn bind_values<'q>(
    mut query: Query<'q, MySql, MySqlArguments>,
    params: &'q [SqlValue],
) -> Query<'q, MySql, MySqlArguments> {
    for param in params {
        query = match param {
            SqlValue::Null => query.bind(Option::<String>::None),
            SqlValue::Bool(v) => query.bind(*v),
            SqlValue::Int(v) => query.bind(*v),
            SqlValue::UInt(v) => query.bind(*v),
            SqlValue::Double(v) => query.bind(*v),
            SqlValue::String(v) => query.bind(v.as_str()),
            SqlValue::Json(v) => query.bind(v.to_string()),
        };
    }
    query
}

macro_rules! decode_column {
    ($row:expr, $idx:expr, $name:expr, $ty:ty, $map:expr) => {
        match $row.try_get::<Option<$ty>, _>($idx) {
            Ok(Some(v)) => $map(v),
            Ok(None) => JsonValue::Null,
            Err(e) => {
                return Err(GatewayError::Serialization(format!(
                    "Failed to decode column '{}': {}",
                    $name, e
                )))
            }
        }
    };
}

/// Decodes a MySQL row into a JSON object keyed by column name.
///
/// Type dispatch follows the driver's declared type name. DECIMAL values are
/// surfaced as JSON strings to preserve precision; temporal values use their
/// canonical MySQL text representation; binary payloads are base64.
pub fn row_to_json(row: &MySqlRow) -> Result<JsonValue> {
    let mut object = JsonMap::with_capacity(row.columns().len());

    for (idx, column) in row.columns().iter().enumerate() {
        let name = column.name().to_string();
        let type_name = column.type_info().name();

        let value = match type_name {
            "BOOLEAN" => decode_column!(row, idx, name, bool, JsonValue::Bool),
            "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => {
                decode_column!(row, idx, name, i64, JsonValue::from)
            }
            "TINYINT UNSIGNED" | "SMALLINT UNSIGNED" | "MEDIUMINT UNSIGNED" | "INT UNSIGNED"
            | "BIGINT UNSIGNED" | "YEAR" => {
                decode_column!(row, idx, name, u64, JsonValue::from)
            }
            "FLOAT" => decode_column!(row, idx, name, f32, |v: f32| JsonValue::from(v as f64)),
            "DOUBLE" => decode_column!(row, idx, name, f64, JsonValue::from),
            "DECIMAL" => {
                decode_column!(row, idx, name, Decimal, |v: Decimal| JsonValue::String(
                    v.to_string()
                ))
            }
            "CHAR" | "VARCHAR" | "TEXT" | "TINYTEXT" | "MEDIUMTEXT" | "LONGTEXT" | "ENUM"
            | "SET" => decode_column!(row, idx, name, String, JsonValue::String),
            "BINARY" | "VARBINARY" | "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB" => {
                decode_column!(row, idx, name, Vec<u8>, |v: Vec<u8>| JsonValue::String(
                    base64::engine::general_purpose::STANDARD.encode(v)
                ))
            }
            "DATE" => decode_column!(row, idx, name, NaiveDate, |v: NaiveDate| JsonValue::String(
                v.format("%Y-%m-%d").to_string()
            )),
            "TIME" => decode_column!(row, idx, name, NaiveTime, |v: NaiveTime| JsonValue::String(
                v.format("%H:%M:%S").to_string()
            )),
            "DATETIME" => {
                decode_column!(row, idx, name, NaiveDateTime, |v: NaiveDateTime| {
                    JsonValue::String(v.format("%Y-%m-%d %H:%M:%S").to_string())
                })
            }
            "TIMESTAMP" => {
                decode_column!(row, idx, name, DateTime<Utc>, |v: DateTime<Utc>| {
                    JsonValue::String(v.format("%Y-%m-%d %H:%M:%S").to_string())
                })
            }
            "JSON" => decode_column!(row, idx, name, JsonValue, |v| v),
            _ => {
                // Unknown type: best effort as text, NULL when that fails too
                match row.try_get::<Option<String>, _>(idx) {
                    Ok(Some(v)) => JsonValue::String(v),
                    _ => JsonValue::Null,
                }
            }
        };

        object.insert(name, value);
    }

    Ok(JsonValue::Object(object))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_scalars() {
        assert_eq!(SqlValue::from_json(&json!(null)), SqlValue::Null);
        assert_eq!(SqlValue::from_json(&json!(true)), SqlValue::Bool(true));
        assert_eq!(SqlValue::from_json(&json!(42)), SqlValue::Int(42));
        assert_eq!(SqlValue::from_json(&json!(2.5)), SqlValue::Double(2.5));
        assert_eq!(
            SqlValue::from_json(&json!("abc")),
            SqlValue::String("abc".to_string())
        );
    }

    #[test]
    fn test_from_json_large_unsigned() {
        let value = json!(u64::MAX);
        assert_eq!(SqlValue::from_json(&value), SqlValue::UInt(u64::MAX));
    }

    #[test]
    fn test_from_json_compound_stays_json() {
        let value = json!({"a": 1});
        assert!(matches!(SqlValue::from_json(&value), SqlValue::Json(_)));
    }

    #[test]
    fn test_as_json_text() {
        assert_eq!(
            SqlValue::as_json_text(&json!({"a": 1})),
            SqlValue::String("{\"a\":1}".to_string())
        );
        // Even scalar inputs become JSON text for JSON columns
        assert_eq!(
            SqlValue::as_json_text(&json!(7)),
            SqlValue::String("7".to_string())
        );
    }
}
