//! Statement execution with per-request claim context.
//!
//! Session variables are only visible to statements on the same connection,
//! so the context path borrows one pooled connection, issues a single
//! `SET @request_jwt_claim_<name> = ?, ...` with one positional parameter per
//! claim, and runs the main statement on that same connection. The borrowed
//! connection returns to the pool when it drops, on success and on every
//! error path alike; the next checkout re-binds its own variables, so no
//! handler ever observes another request's claims.

use serde_json::Value as JsonValue;
use sqlx::mysql::MySqlPool;
use tracing::{debug, instrument};

use restgate_common::{sanitize_claim_name, RequestContext};

use crate::query::SqlFragment;
use crate::types::{bind_values, row_to_json, SqlValue};
use crate::Result;

/// Driver metadata for a mutating statement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecResult {
    pub rows_affected: u64,
    pub last_insert_id: u64,
}

/// Builds the claim-injection statement for a context.
///
/// Claim names are sanitized to `[A-Za-z0-9_]`; non-scalar claim values are
/// serialized to JSON text. Returns `None` for an empty context.
pub fn claim_set_fragment(ctx: &RequestContext) -> Option<SqlFragment> {
    if ctx.is_empty() {
        return None;
    }

    let assignments: Vec<String> = ctx
        .iter()
        .map(|(name, _)| format!("@request_jwt_claim_{} = ?", sanitize_claim_name(name)))
        .collect();

    let params: Vec<SqlValue> = ctx
        .iter()
        .map(|(_, value)| SqlValue::from_json(&value.to_bind_value()))
        .collect();

    Some(SqlFragment::new(
        format!("SET {}", assignments.join(", ")),
        params,
    ))
}

/// Executes compiled statements, with or without a claim context.
pub struct Executor<'a> {
    pool: &'a MySqlPool,
}

impl<'a> Executor<'a> {
    pub fn new(pool: &'a MySqlPool) -> Self {
        Self { pool }
    }

    /// Runs a query and decodes every row to JSON.
    #[instrument(skip(self, fragment, ctx), fields(sql_preview = %fragment.sql.chars().take(100).collect::<String>()))]
    pub async fn fetch_all(
        &self,
        fragment: &SqlFragment,
        ctx: Option<&RequestContext>,
    ) -> Result<Vec<JsonValue>> {
        let rows = match ctx.and_then(claim_set_fragment) {
            None => {
                // context-free: the pool owns allocation and release
                bind_values(sqlx::query(&fragment.sql), &fragment.params)
                    .fetch_all(self.pool)
                    .await?
            }
            Some(set) => {
                let mut conn = self.pool.acquire().await?;
                bind_values(sqlx::query(&set.sql), &set.params)
                    .execute(&mut *conn)
                    .await?;
                bind_values(sqlx::query(&fragment.sql), &fragment.params)
                    .fetch_all(&mut *conn)
                    .await?
            }
        };

        debug!(rows = rows.len(), "Query completed");
        rows.iter().map(row_to_json).collect()
    }

    /// Runs a mutating statement and returns the driver metadata.
    #[instrument(skip(self, fragment, ctx), fields(sql_preview = %fragment.sql.chars().take(100).collect::<String>()))]
    pub async fn execute(
        &self,
        fragment: &SqlFragment,
        ctx: Option<&RequestContext>,
    ) -> Result<ExecResult> {
        let result = match ctx.and_then(claim_set_fragment) {
            None => {
                bind_values(sqlx::query(&fragment.sql), &fragment.params)
                    .execute(self.pool)
                    .await?
            }
            Some(set) => {
                let mut conn = self.pool.acquire().await?;
                bind_values(sqlx::query(&set.sql), &set.params)
                    .execute(&mut *conn)
                    .await?;
                bind_values(sqlx::query(&fragment.sql), &fragment.params)
                    .execute(&mut *conn)
                    .await?
            }
        };

        let exec = ExecResult {
            rows_affected: result.rows_affected(),
            last_insert_id: result.last_insert_id(),
        };
        debug!(rows_affected = exec.rows_affected, "Statement executed");
        Ok(exec)
    }

    /// Runs several statements in one transaction under an optional claim
    /// context. Commits when every statement succeeds; any error rolls the
    /// transaction back (sqlx rolls back uncommitted transactions on drop)
    /// and the connection returns to the pool either way.
    #[instrument(skip(self, fragments, ctx), fields(statements = fragments.len()))]
    pub async fn execute_in_transaction(
        &self,
        fragments: &[SqlFragment],
        ctx: Option<&RequestContext>,
    ) -> Result<Vec<ExecResult>> {
        let mut tx = self.pool.begin().await?;

        if let Some(set) = ctx.and_then(claim_set_fragment) {
            bind_values(sqlx::query(&set.sql), &set.params)
                .execute(&mut *tx)
                .await?;
        }

        let mut results = Vec::with_capacity(fragments.len());
        for fragment in fragments {
            let result = bind_values(sqlx::query(&fragment.sql), &fragment.params)
                .execute(&mut *tx)
                .await?;
            results.push(ExecResult {
                rows_affected: result.rows_affected(),
                last_insert_id: result.last_insert_id(),
            });
        }

        tx.commit().await?;
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use restgate_common::RequestContext;
    use serde_json::json;

    fn context(payload: serde_json::Value) -> RequestContext {
        RequestContext::from_payload(payload.as_object().unwrap())
    }

    #[test]
    fn test_claim_set_statement_text() {
        let ctx = context(json!({"role": "WRITE_TABLE", "sub": "42"}));
        let set = claim_set_fragment(&ctx).unwrap();
        assert_eq!(
            set.sql,
            "SET @request_jwt_claim_role = ?, @request_jwt_claim_sub = ?"
        );
        assert_eq!(
            set.params,
            vec![
                SqlValue::String("WRITE_TABLE".to_string()),
                SqlValue::String("42".to_string())
            ]
        );
    }

    #[test]
    fn test_one_assignment_per_claim() {
        let ctx = context(json!({"a": 1, "b": 2, "c": 3}));
        let set = claim_set_fragment(&ctx).unwrap();
        let placeholders = set.sql.matches('?').count();
        assert_eq!(placeholders, ctx.len());
        assert_eq!(set.params.len(), ctx.len());
    }

    #[test]
    fn test_empty_context_yields_no_statement() {
        let ctx = RequestContext::default();
        assert!(claim_set_fragment(&ctx).is_none());
    }

    #[test]
    fn test_claim_names_sanitized() {
        let ctx = context(json!({"https://example.com/role": "x"}));
        let set = claim_set_fragment(&ctx).unwrap();
        assert_eq!(
            set.sql,
            "SET @request_jwt_claim_https___example_com_role = ?"
        );
    }

    #[test]
    fn test_compound_claims_bind_as_json_text() {
        let ctx = context(json!({"roles": ["a", "b"]}));
        let set = claim_set_fragment(&ctx).unwrap();
        assert_eq!(
            set.params,
            vec![SqlValue::String("[\"a\",\"b\"]".to_string())]
        );
    }

    #[test]
    fn test_numeric_claims_stay_numeric() {
        let ctx = context(json!({"exp": 1712345678}));
        let set = claim_set_fragment(&ctx).unwrap();
        assert_eq!(set.params, vec![SqlValue::Int(1712345678)]);
    }
}
