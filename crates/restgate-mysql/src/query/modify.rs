//! INSERT, UPDATE, DELETE emission.

use serde_json::Map as JsonMap;
use serde_json::Value as JsonValue;

use crate::catalog::Table;
use crate::types::SqlValue;
use crate::{GatewayError, Result};

use super::builder::QueryBuilder;
use super::helpers::{quote_identifier, validate_identifier};
use super::types::SqlFragment;

/// Duplicate-key resolution selected by the `Resolution` request header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertOptions {
    /// `INSERT IGNORE` (ignore-duplicates)
    pub ignore_duplicates: bool,
    /// `ON DUPLICATE KEY UPDATE col = VALUES(col)` (merge-duplicates)
    pub merge_duplicates: bool,
}

/// Converts one input value for a column, JSON-encoding values bound for
/// catalog JSON columns.
fn column_value(table: &Table, column: &str, value: Option<&JsonValue>) -> SqlValue {
    match value {
        None => SqlValue::Null,
        Some(value) => {
            let is_json = table
                .column(column)
                .map(|c| c.needs_json_encoding())
                .unwrap_or(false);
            if is_json {
                SqlValue::as_json_text(value)
            } else {
                SqlValue::from_json(value)
            }
        }
    }
}

impl QueryBuilder {
    /// Builds an INSERT statement for one or more rows.
    ///
    /// The column list comes from the first row; later rows bind NULL for
    /// any column they omit. Bulk inputs use multi-row VALUES.
    pub fn build_insert(
        &self,
        table: &Table,
        rows: &[JsonMap<String, JsonValue>],
        options: InsertOptions,
    ) -> Result<SqlFragment> {
        let first = rows
            .first()
            .ok_or_else(|| GatewayError::Query("Cannot insert with no rows".to_string()))?;

        let columns: Vec<&String> = first.keys().collect();
        if columns.is_empty() {
            return Err(GatewayError::Query("Cannot insert with no values".to_string()));
        }
        for col in &columns {
            validate_identifier(col)?;
        }

        let verb = if options.ignore_duplicates {
            "INSERT IGNORE INTO"
        } else {
            "INSERT INTO"
        };

        let mut sql = format!("{} {} (", verb, quote_identifier(&self.table));
        let quoted: Vec<String> = columns.iter().map(|c| quote_identifier(c)).collect();
        sql.push_str(&quoted.join(", "));
        sql.push_str(") VALUES ");

        let row_placeholder = format!("({})", vec!["?"; columns.len()].join(", "));
        let placeholders = vec![row_placeholder; rows.len()].join(", ");
        sql.push_str(&placeholders);

        let mut params: Vec<SqlValue> = Vec::with_capacity(columns.len() * rows.len());
        for row in rows {
            for col in &columns {
                params.push(column_value(table, col, row.get(*col)));
            }
        }

        if options.merge_duplicates {
            sql.push_str(" ON DUPLICATE KEY UPDATE ");
            let updates: Vec<String> = columns
                .iter()
                .map(|c| {
                    let quoted = quote_identifier(c);
                    format!("{} = VALUES({})", quoted, quoted)
                })
                .collect();
            sql.push_str(&updates.join(", "));
        }

        Ok(SqlFragment::new(sql, params))
    }

    /// Builds an UPDATE statement; the WHERE clause carries the builder's
    /// policy predicate and conditions.
    pub fn build_update(
        &self,
        table: &Table,
        data: &JsonMap<String, JsonValue>,
    ) -> Result<SqlFragment> {
        if data.is_empty() {
            return Err(GatewayError::Query("Cannot update with no values".to_string()));
        }

        let mut params: Vec<SqlValue> = Vec::new();
        let mut sql = format!("UPDATE {} SET ", quote_identifier(&self.table));

        let set_parts: Vec<String> = data
            .iter()
            .map(|(col, value)| {
                validate_identifier(col)?;
                params.push(column_value(table, col, Some(value)));
                Ok(format!("{} = ?", quote_identifier(col)))
            })
            .collect::<Result<Vec<String>>>()?;
        sql.push_str(&set_parts.join(", "));

        sql.push_str(&self.where_clause(&mut params));

        Ok(SqlFragment::new(sql, params))
    }

    /// Builds a DELETE statement; the WHERE clause carries the builder's
    /// policy predicate and conditions. An unrestricted builder deletes
    /// every row, which matches the PostgREST default.
    pub fn build_delete(&self) -> SqlFragment {
        let mut params: Vec<SqlValue> = Vec::new();
        let mut sql = format!("DELETE FROM {}", quote_identifier(&self.table));
        sql.push_str(&self.where_clause(&mut params));
        SqlFragment::new(sql, params)
    }
}
