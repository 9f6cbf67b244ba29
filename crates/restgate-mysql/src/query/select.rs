//! SELECT emission: column-list resolution, embedded-relation subqueries,
//! and key predicates.

use crate::catalog::{Catalog, ForeignKey, Table};
use crate::plan::{resolve_relation, RelationKind, RelationNode, SelectItem, SelectTree, MAX_EMBED_DEPTH};
use crate::types::SqlValue;
use crate::{GatewayError, Result};

use super::builder::QueryBuilder;
use super::helpers::{quote_identifier, typed_value, validate_identifier};
use super::types::SqlFragment;

impl QueryBuilder {
    /// Builds the SELECT statement.
    pub fn build_select(&self) -> SqlFragment {
        let mut params: Vec<SqlValue> = Vec::new();
        let mut sql = String::from("SELECT ");

        if self.select_exprs.is_empty() {
            sql.push('*');
        } else {
            sql.push_str(&self.select_exprs.join(", "));
        }

        sql.push_str(" FROM ");
        sql.push_str(&quote_identifier(&self.table));
        sql.push_str(&self.where_clause(&mut params));

        if !self.group_by_columns.is_empty() {
            sql.push_str(" GROUP BY ");
            let group_parts: Vec<String> = self
                .group_by_columns
                .iter()
                .map(|col| quote_identifier(col))
                .collect();
            sql.push_str(&group_parts.join(", "));
        }

        if !self.order_by_clauses.is_empty() {
            sql.push_str(" ORDER BY ");
            let order_parts: Vec<String> = self
                .order_by_clauses
                .iter()
                .map(|(col, dir)| format!("{} {}", quote_identifier(col), dir.to_sql()))
                .collect();
            sql.push_str(&order_parts.join(", "));
        }

        if let Some(limit) = self.limit_value {
            params.push(SqlValue::Int(limit));
            sql.push_str(" LIMIT ?");
        }

        if let Some(offset) = self.offset_value {
            params.push(SqlValue::Int(offset));
            sql.push_str(" OFFSET ?");
        }

        SqlFragment::new(sql, params)
    }

    /// Builds the companion count statement: the same WHERE, no ordering or
    /// pagination, `COUNT(1)` aliased `no_of_rows`.
    pub fn build_count(&self) -> SqlFragment {
        let mut params: Vec<SqlValue> = Vec::new();
        let mut sql = format!(
            "SELECT COUNT(1) AS no_of_rows FROM {}",
            quote_identifier(&self.table)
        );
        sql.push_str(&self.where_clause(&mut params));
        SqlFragment::new(sql, params)
    }
}

/// Resolves a select tree into rendered column expressions.
///
/// With a star (or an empty tree) every catalog column minus exclusions is
/// listed first; explicit columns follow; each relation becomes a correlated
/// subquery aliased to its target name. Unknown columns are ignored.
pub fn resolve_columns(
    catalog: &Catalog,
    table: &Table,
    tree: &SelectTree,
) -> Result<Vec<String>> {
    let mut exprs: Vec<String> = Vec::new();

    if tree.wants_star() {
        let exclusions = tree.exclusions();
        for column in &table.columns {
            if !exclusions.contains(&column.name.as_str()) {
                exprs.push(quote_identifier(&column.name));
            }
        }
    }

    for item in &tree.items {
        match item {
            SelectItem::Column(name) => {
                if table.column(name).is_some() {
                    exprs.push(quote_identifier(name));
                }
            }
            SelectItem::Relation(node) => {
                let subquery = embed_expr(catalog, table, node, 1)?;
                exprs.push(format!("{} AS {}", subquery, quote_identifier(&node.target)));
            }
            SelectItem::Star | SelectItem::Exclude(_) => {}
        }
    }

    Ok(exprs)
}

/// Renders the bare correlated subquery for an embedded relation.
///
/// 1:N relations aggregate child rows into a JSON array (empty array when no
/// rows match); N:1 relations produce a single JSON object or NULL. A
/// relation with no connecting foreign key degrades to a literal NULL
/// subquery.
pub fn embed_expr(
    catalog: &Catalog,
    parent: &Table,
    node: &RelationNode,
    depth: usize,
) -> Result<String> {
    if depth > MAX_EMBED_DEPTH {
        return Err(GatewayError::Validation(format!(
            "embedding exceeds maximum depth of {}",
            MAX_EMBED_DEPTH
        )));
    }

    match resolve_relation(catalog, &parent.name, node) {
        RelationKind::OneToMany { fk } => {
            let child = catalog
                .table(&node.target)
                .ok_or_else(|| GatewayError::Catalog(format!("unknown table '{}'", node.target)))?;
            let pairs = json_object_pairs(catalog, child, &node.inner, depth)?;
            Ok(format!(
                "(SELECT CAST(COALESCE(JSON_ARRAYAGG(JSON_OBJECT({})), '[]') AS JSON) FROM {} WHERE {}.{} = {}.{})",
                pairs,
                quote_identifier(&child.name),
                quote_identifier(&child.name),
                quote_identifier(&fk.column),
                quote_identifier(&parent.name),
                quote_identifier(&fk.referenced_column),
            ))
        }
        RelationKind::ManyToOne { fk } => {
            let child = catalog
                .table(&node.target)
                .ok_or_else(|| GatewayError::Catalog(format!("unknown table '{}'", node.target)))?;
            let pairs = json_object_pairs(catalog, child, &node.inner, depth)?;
            Ok(format!(
                "(SELECT JSON_OBJECT({}) FROM {} WHERE {}.{} = {}.{})",
                pairs,
                quote_identifier(&child.name),
                quote_identifier(&child.name),
                quote_identifier(&fk.referenced_column),
                quote_identifier(&parent.name),
                quote_identifier(&fk.column),
            ))
        }
        RelationKind::Unrelated => Ok("(SELECT NULL)".to_string()),
    }
}

/// Renders `'name', table.name` pairs for JSON_OBJECT, expanding child
/// columns by the same star/exclusion rules and recursing into nested
/// relations.
fn json_object_pairs(
    catalog: &Catalog,
    table: &Table,
    tree: &SelectTree,
    depth: usize,
) -> Result<String> {
    let mut pairs: Vec<String> = Vec::new();

    if tree.wants_star() {
        let exclusions = tree.exclusions();
        for column in &table.columns {
            if !exclusions.contains(&column.name.as_str()) {
                pairs.push(format!(
                    "'{}', {}.{}",
                    column.name,
                    quote_identifier(&table.name),
                    quote_identifier(&column.name)
                ));
            }
        }
    }

    for item in &tree.items {
        match item {
            SelectItem::Column(name) => {
                if table.column(name).is_some() {
                    pairs.push(format!(
                        "'{}', {}.{}",
                        name,
                        quote_identifier(&table.name),
                        quote_identifier(name)
                    ));
                }
            }
            SelectItem::Relation(node) => {
                let subquery = embed_expr(catalog, table, node, depth + 1)?;
                pairs.push(format!("'{}', {}", node.target, subquery));
            }
            SelectItem::Star | SelectItem::Exclude(_) => {}
        }
    }

    Ok(pairs.join(", "))
}

/// Splits an `id` path segment on `___` and types each component against the
/// table's primary-key columns.
///
/// # Errors
///
/// `CompositeKey` when the component count differs from the key arity;
/// `Validation` when a component fails its column's type coercion.
pub fn pk_conditions(table: &Table, id: &str) -> Result<Vec<(String, SqlValue)>> {
    let parts: Vec<&str> = id.split("___").collect();

    if parts.len() != table.primary_key.len() {
        return Err(GatewayError::CompositeKey(format!(
            "table '{}' has {} primary key column(s), id '{}' has {} component(s)",
            table.name,
            table.primary_key.len(),
            id,
            parts.len()
        )));
    }

    table
        .primary_key
        .iter()
        .zip(parts)
        .map(|(column, raw)| {
            validate_identifier(column)?;
            let column_type = table
                .column(column)
                .map(|c| c.data_type)
                .unwrap_or(crate::catalog::ColumnType::String);
            Ok((column.clone(), typed_value(column_type, raw)?))
        })
        .collect()
}

/// The foreign-key predicate for a nested list: `child.fk = typed parent id`.
pub fn fk_condition(fk: &ForeignKey, parent_id: &str) -> Result<(String, SqlValue)> {
    Ok((fk.column.clone(), typed_value(fk.column_type, parent_id)?))
}
