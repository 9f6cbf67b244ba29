//! QueryBuilder struct and WHERE composition.

use crate::params::{FilterOp, FilterSet, FilterValue};
use crate::types::SqlValue;
use crate::Result;

use super::helpers::{quote_identifier, validate_identifier};
use super::types::{OrderDirection, SqlFragment};

/// A single WHERE predicate in compiled form.
#[derive(Debug, Clone)]
pub(crate) enum Condition {
    /// `col <op> ?`
    Compare {
        column: String,
        op: &'static str,
        value: SqlValue,
    },
    /// `col IS NULL`
    IsNull { column: String },
    /// `col IS NOT NULL`
    IsNotNull { column: String },
    /// `col IS TRUE` / `col IS FALSE`
    IsLiteral {
        column: String,
        literal: &'static str,
    },
    /// `col IS ?` — only meaningful for boolean-ish operands, kept for
    /// compatibility with the original routing of `is.<value>`
    IsBound { column: String, value: SqlValue },
    /// `col IN (?, ?, ...)`
    In {
        column: String,
        values: Vec<SqlValue>,
    },
}

/// Fluent builder emitting parameterized MySQL statements.
///
/// The policy predicate, when present, always leads the WHERE clause:
/// `WHERE (policy) AND (user predicates)`.
#[derive(Debug, Default)]
pub struct QueryBuilder {
    pub(crate) table: String,
    /// Pre-rendered select expressions (columns, subqueries, aggregates)
    pub(crate) select_exprs: Vec<String>,
    /// Composed RLS predicate, injected verbatim in parentheses
    pub(crate) policy_predicate: Option<String>,
    pub(crate) conditions: Vec<Condition>,
    pub(crate) group_by_columns: Vec<String>,
    pub(crate) order_by_clauses: Vec<(String, OrderDirection)>,
    pub(crate) limit_value: Option<i64>,
    pub(crate) offset_value: Option<i64>,
}

fn comparison_sql(op: FilterOp) -> Option<&'static str> {
    match op {
        FilterOp::Eq => Some("="),
        FilterOp::Neq => Some("<>"),
        FilterOp::Gt => Some(">"),
        FilterOp::Gte => Some(">="),
        FilterOp::Lt => Some("<"),
        FilterOp::Lte => Some("<="),
        // MySQL LIKE case behavior follows the column collation, so both
        // spellings compile to LIKE
        FilterOp::Like | FilterOp::ILike => Some("LIKE"),
        FilterOp::Is | FilterOp::In => None,
    }
}

impl QueryBuilder {
    /// Creates a new query builder for a table.
    ///
    /// # Errors
    ///
    /// Returns error if the table name is not a valid identifier.
    pub fn new(table: &str) -> Result<Self> {
        validate_identifier(table)?;
        Ok(Self {
            table: table.to_string(),
            ..Default::default()
        })
    }

    /// Sets the select expressions. Expressions are emitted verbatim and must
    /// already be validated or compiler-rendered.
    pub fn columns(mut self, exprs: Vec<String>) -> Self {
        self.select_exprs = exprs;
        self
    }

    /// Sets the composed RLS predicate. `None` leaves the statement
    /// unrestricted.
    pub fn policy(mut self, predicate: Option<String>) -> Self {
        self.policy_predicate = predicate;
        self
    }

    /// Adds the predicates of a parsed filter set.
    ///
    /// Null comparisons short-circuit to `IS NULL` / `IS NOT NULL`;
    /// predicates that cannot compile (e.g. a list value on a comparison
    /// operator) are dropped, which narrows rather than widens results.
    pub fn filters(mut self, set: &FilterSet) -> Result<Self> {
        for filter in &set.predicates {
            validate_identifier(&filter.column)?;
            let column = filter.column.clone();

            let condition = match (filter.op, &filter.value) {
                (FilterOp::Is, FilterValue::Null) => Condition::IsNull { column },
                (FilterOp::Is, FilterValue::Scalar(s)) if s == "null" => {
                    Condition::IsNull { column }
                }
                (FilterOp::Is, FilterValue::Scalar(s)) if s == "true" => Condition::IsLiteral {
                    column,
                    literal: "TRUE",
                },
                (FilterOp::Is, FilterValue::Scalar(s)) if s == "false" => Condition::IsLiteral {
                    column,
                    literal: "FALSE",
                },
                (FilterOp::Is, FilterValue::Scalar(s)) => Condition::IsBound {
                    column,
                    value: SqlValue::String(s.clone()),
                },
                (FilterOp::In, FilterValue::List(values)) => Condition::In {
                    column,
                    values: values
                        .iter()
                        .map(|v| SqlValue::String(v.clone()))
                        .collect(),
                },
                (FilterOp::Eq, FilterValue::Null) => Condition::IsNull { column },
                (FilterOp::Neq, FilterValue::Null) => Condition::IsNotNull { column },
                (op, FilterValue::Scalar(s)) => match comparison_sql(op) {
                    Some(sql_op) => Condition::Compare {
                        column,
                        op: sql_op,
                        value: SqlValue::String(s.clone()),
                    },
                    None => continue,
                },
                _ => continue,
            };

            self.conditions.push(condition);
        }
        Ok(self)
    }

    /// Adds one `col = value` predicate with an already-typed value.
    pub fn equals(mut self, column: &str, value: SqlValue) -> Result<Self> {
        validate_identifier(column)?;
        self.conditions.push(Condition::Compare {
            column: column.to_string(),
            op: "=",
            value,
        });
        Ok(self)
    }

    /// Adds a `col IN (...)` predicate with already-typed values.
    pub fn within(mut self, column: &str, values: Vec<SqlValue>) -> Result<Self> {
        validate_identifier(column)?;
        self.conditions.push(Condition::In {
            column: column.to_string(),
            values,
        });
        Ok(self)
    }

    /// Adds the primary-key predicate: one `col = value` per key component.
    pub fn pk(mut self, components: Vec<(String, SqlValue)>) -> Self {
        for (column, value) in components {
            self.conditions.push(Condition::Compare {
                column,
                op: "=",
                value,
            });
        }
        self
    }

    /// Adds GROUP BY columns.
    pub fn group_by(mut self, columns: &[String]) -> Result<Self> {
        for col in columns {
            validate_identifier(col)?;
            self.group_by_columns.push(col.clone());
        }
        Ok(self)
    }

    /// Adds ORDER BY clauses.
    pub fn order_by(mut self, clauses: &[(String, OrderDirection)]) -> Result<Self> {
        for (col, dir) in clauses {
            validate_identifier(col)?;
            self.order_by_clauses.push((col.clone(), *dir));
        }
        Ok(self)
    }

    /// Sets LIMIT.
    pub fn limit(mut self, limit: i64) -> Self {
        self.limit_value = Some(limit);
        self
    }

    /// Sets OFFSET.
    pub fn offset(mut self, offset: i64) -> Self {
        self.offset_value = Some(offset);
        self
    }

    /// True when neither filters nor a policy restrict the statement.
    pub fn is_unrestricted(&self) -> bool {
        self.conditions.is_empty() && self.policy_predicate.is_none()
    }

    /// Renders the WHERE clause (leading space included) and appends bound
    /// values to `params`.
    pub(crate) fn where_clause(&self, params: &mut Vec<SqlValue>) -> String {
        let mut parts: Vec<String> = Vec::new();

        for condition in &self.conditions {
            let part = match condition {
                Condition::Compare { column, op, value } => {
                    params.push(value.clone());
                    format!("{} {} ?", quote_identifier(column), op)
                }
                Condition::IsNull { column } => {
                    format!("{} IS NULL", quote_identifier(column))
                }
                Condition::IsNotNull { column } => {
                    format!("{} IS NOT NULL", quote_identifier(column))
                }
                Condition::IsLiteral { column, literal } => {
                    format!("{} IS {}", quote_identifier(column), literal)
                }
                Condition::IsBound { column, value } => {
                    params.push(value.clone());
                    format!("{} IS ?", quote_identifier(column))
                }
                Condition::In { column, values } => {
                    if values.is_empty() {
                        format!("{} IN (NULL)", quote_identifier(column))
                    } else {
                        let placeholders = vec!["?"; values.len()].join(", ");
                        params.extend(values.iter().cloned());
                        format!("{} IN ({})", quote_identifier(column), placeholders)
                    }
                }
            };
            parts.push(part);
        }

        let user_sql = parts.join(" AND ");
        match (&self.policy_predicate, user_sql.is_empty()) {
            (Some(policy), false) => format!(" WHERE ({}) AND ({})", policy, user_sql),
            (Some(policy), true) => format!(" WHERE ({})", policy),
            (None, false) => format!(" WHERE {}", user_sql),
            (None, true) => String::new(),
        }
    }
}
