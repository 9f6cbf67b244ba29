//! Compiler helper functions.

use chrono::{NaiveDate, NaiveDateTime};

use crate::catalog::ColumnType;
use crate::types::SqlValue;
use crate::{GatewayError, Result};

/// Maximum identifier length accepted by MySQL.
const MAX_IDENTIFIER_LEN: usize = 64;

/// Quotes a SQL identifier with backticks.
pub fn quote_identifier(name: &str) -> String {
    format!("`{}`", name)
}

/// Validates a SQL identifier (table/column name).
///
/// Identifiers reach the SQL text unparameterized, so they are restricted to
/// `[A-Za-z0-9_$]` regardless of what MySQL would itself accept.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(GatewayError::Query("Identifier cannot be empty".to_string()));
    }

    if name.len() > MAX_IDENTIFIER_LEN {
        return Err(GatewayError::Query(format!(
            "Identifier '{}' exceeds maximum length of {}",
            name, MAX_IDENTIFIER_LEN
        )));
    }

    for ch in name.chars() {
        if !ch.is_ascii_alphanumeric() && ch != '_' && ch != '$' {
            return Err(GatewayError::Query(format!(
                "Identifier '{}' contains invalid character '{}'",
                name, ch
            )));
        }
    }

    Ok(())
}

/// Produces a typed bound value for a raw path/id component.
///
/// Integers and floats are parsed, dates are coerced through chrono, and
/// everything else binds as a string.
pub fn typed_value(column_type: ColumnType, raw: &str) -> Result<SqlValue> {
    match column_type {
        ColumnType::Int => raw
            .parse::<i64>()
            .map(SqlValue::Int)
            .map_err(|_| GatewayError::Validation(format!("'{}' is not an integer", raw))),
        ColumnType::Float => raw
            .parse::<f64>()
            .map(SqlValue::Double)
            .map_err(|_| GatewayError::Validation(format!("'{}' is not a number", raw))),
        ColumnType::Date => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map(|d| SqlValue::String(d.format("%Y-%m-%d").to_string()))
            .map_err(|_| GatewayError::Validation(format!("'{}' is not a date", raw))),
        ColumnType::DateTime => NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
            .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S"))
            .map(|d| SqlValue::String(d.format("%Y-%m-%d %H:%M:%S").to_string()))
            .map_err(|_| GatewayError::Validation(format!("'{}' is not a datetime", raw))),
        _ => Ok(SqlValue::String(raw.to_string())),
    }
}

/// The aggregate expressions emitted for one `_fields` column, each aliased
/// `<fn>_of_<field>`.
pub fn aggregate_exprs(field: &str) -> Result<Vec<String>> {
    validate_identifier(field)?;
    let quoted = quote_identifier(field);
    Ok(["min", "max", "avg", "sum", "stddev", "variance"]
        .iter()
        .map(|func| {
            format!(
                "{}({}) AS {}",
                func.to_uppercase(),
                quoted,
                quote_identifier(&format!("{}_of_{}", func, field))
            )
        })
        .collect())
}
