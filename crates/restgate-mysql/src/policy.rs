//! Row-level-security policies.
//!
//! Policies live in a gateway-owned store table so they survive restarts and
//! are auditable. They are loaded into an in-memory index keyed by
//! (table, operation) at startup and on explicit reload; every request reads
//! the index, never the store. Tables without policies are unrestricted,
//! a deliberate opt-in model.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use sqlx::mysql::MySqlPool;
use sqlx::Row as SqlxRow;
use tracing::{info, instrument, warn};

use crate::{GatewayError, Result};

/// Name of the policy store table. Excluded from the public catalog.
pub const POLICY_TABLE: &str = "rls_policies";

/// The four concrete operations a policy can guard. `ALL` rows in the store
/// fan out to these at load time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PolicyOp {
    Select,
    Insert,
    Update,
    Delete,
}

impl PolicyOp {
    pub const ALL_OPS: [PolicyOp; 4] = [
        PolicyOp::Select,
        PolicyOp::Insert,
        PolicyOp::Update,
        PolicyOp::Delete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyOp::Select => "SELECT",
            PolicyOp::Insert => "INSERT",
            PolicyOp::Update => "UPDATE",
            PolicyOp::Delete => "DELETE",
        }
    }

    fn from_str(op: &str) -> Option<PolicyOp> {
        match op {
            "SELECT" => Some(PolicyOp::Select),
            "INSERT" => Some(PolicyOp::Insert),
            "UPDATE" => Some(PolicyOp::Update),
            "DELETE" => Some(PolicyOp::Delete),
            _ => None,
        }
    }
}

/// A row-level rule as stored.
#[derive(Debug, Clone)]
pub struct Policy {
    pub id: u64,
    pub table_name: String,
    pub policy_name: String,
    /// SQL boolean expression every row must satisfy
    pub using_expression: String,
    /// Stored but not evaluated; reserved for insert validation
    pub check_expression: Option<String>,
    pub enabled: bool,
}

/// The in-memory index: (table, operation) -> ordered active policies.
#[derive(Debug, Default)]
pub struct PolicyIndex {
    map: HashMap<(String, PolicyOp), Vec<Policy>>,
}

impl PolicyIndex {
    /// Registers a policy under one concrete operation.
    pub fn insert(&mut self, op: PolicyOp, policy: Policy) {
        self.map
            .entry((policy.table_name.clone(), op))
            .or_default()
            .push(policy);
    }

    /// Active policies for a (table, operation), in load order.
    pub fn policies(&self, table: &str, op: PolicyOp) -> &[Policy] {
        self.map
            .get(&(table.to_string(), op))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Composes the policies for a (table, operation) into one predicate:
    /// each `using_expression` parenthesized, all ANDed together. `None`
    /// when the table/operation is unrestricted.
    pub fn predicate(&self, table: &str, op: PolicyOp) -> Option<String> {
        let policies = self.policies(table, op);
        if policies.is_empty() {
            return None;
        }
        Some(
            policies
                .iter()
                .map(|p| format!("({})", p.using_expression))
                .collect::<Vec<_>>()
                .join(" AND "),
        )
    }

    /// Total number of indexed (policy, operation) entries.
    pub fn len(&self) -> usize {
        self.map.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Shared policy engine: a published, atomically replaceable index.
///
/// Readers take a cheap `Arc` snapshot; reload builds a fresh index and swaps
/// the pointer, so in-flight requests keep the index they started with.
#[derive(Debug, Default)]
pub struct PolicyEngine {
    index: RwLock<Arc<PolicyIndex>>,
}

impl PolicyEngine {
    /// An engine with no policies (everything unrestricted).
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the current index.
    pub fn index(&self) -> Arc<PolicyIndex> {
        self.index
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Composed predicate for a (table, operation) from the current index.
    pub fn predicate(&self, table: &str, op: PolicyOp) -> Option<String> {
        self.index().predicate(table, op)
    }

    /// Publishes a freshly loaded index.
    pub fn replace(&self, index: PolicyIndex) {
        let mut guard = self
            .index
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = Arc::new(index);
    }

    /// Creates the policy store table when missing. Idempotent.
    #[instrument(skip(pool))]
    pub async fn ensure_store(pool: &MySqlPool) -> Result<()> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (\
             id BIGINT UNSIGNED NOT NULL AUTO_INCREMENT, \
             table_name VARCHAR(64) NOT NULL, \
             policy_name VARCHAR(64) NOT NULL, \
             operation VARCHAR(10) NOT NULL DEFAULT 'ALL', \
             using_expression TEXT NOT NULL, \
             check_expression TEXT NULL, \
             enabled TINYINT(1) NOT NULL DEFAULT 1, \
             created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP, \
             updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP, \
             PRIMARY KEY (id), \
             UNIQUE KEY uq_policy (table_name, policy_name), \
             KEY idx_policy_lookup (table_name, operation, enabled))",
            POLICY_TABLE
        );
        sqlx::query(&sql)
            .execute(pool)
            .await
            .map_err(|e| GatewayError::Policy(format!("failed to create policy store: {}", e)))?;
        Ok(())
    }

    /// Reads all enabled policies and builds a fresh index, fanning `ALL`
    /// rows out to the four concrete operations.
    #[instrument(skip(pool))]
    pub async fn load(pool: &MySqlPool) -> Result<PolicyIndex> {
        let sql = format!(
            "SELECT id, table_name, policy_name, operation, using_expression, \
             check_expression, enabled FROM {} WHERE enabled = 1 ORDER BY id",
            POLICY_TABLE
        );
        let rows = sqlx::query(&sql)
            .fetch_all(pool)
            .await
            .map_err(|e| GatewayError::Policy(format!("failed to load policies: {}", e)))?;

        let mut index = PolicyIndex::default();
        for row in &rows {
            let operation: String = row
                .try_get("operation")
                .map_err(|e| GatewayError::Policy(e.to_string()))?;
            let policy = Policy {
                id: row
                    .try_get("id")
                    .map_err(|e| GatewayError::Policy(e.to_string()))?,
                table_name: row
                    .try_get("table_name")
                    .map_err(|e| GatewayError::Policy(e.to_string()))?,
                policy_name: row
                    .try_get("policy_name")
                    .map_err(|e| GatewayError::Policy(e.to_string()))?,
                using_expression: row
                    .try_get("using_expression")
                    .map_err(|e| GatewayError::Policy(e.to_string()))?,
                check_expression: row.try_get("check_expression").unwrap_or(None),
                enabled: true,
            };

            let operation = operation.to_ascii_uppercase();
            if operation == "ALL" {
                for op in PolicyOp::ALL_OPS {
                    index.insert(op, policy.clone());
                }
            } else if let Some(op) = PolicyOp::from_str(&operation) {
                index.insert(op, policy);
            } else {
                warn!(
                    policy = %policy.policy_name,
                    operation = %operation,
                    "Skipping policy with unknown operation"
                );
            }
        }

        info!(entries = index.len(), "Policy index loaded");
        Ok(index)
    }

    /// Bootstrap + load + publish. Policy failures degrade to an empty index
    /// rather than refusing traffic.
    pub async fn initialize(pool: &MySqlPool) -> Arc<PolicyEngine> {
        let engine = Arc::new(PolicyEngine::new());
        match Self::ensure_store(pool).await {
            Ok(()) => match Self::load(pool).await {
                Ok(index) => engine.replace(index),
                Err(e) => warn!(error = %e, "Policy load failed, serving without policies"),
            },
            Err(e) => warn!(error = %e, "Policy store bootstrap failed, serving without policies"),
        }
        engine
    }

    /// Rebuilds the index from the store and swaps it in.
    pub async fn reload(&self, pool: &MySqlPool) -> Result<usize> {
        let index = Self::load(pool).await?;
        let entries = index.len();
        self.replace(index);
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(table: &str, name: &str, expr: &str) -> Policy {
        Policy {
            id: 1,
            table_name: table.to_string(),
            policy_name: name.to_string(),
            using_expression: expr.to_string(),
            check_expression: None,
            enabled: true,
        }
    }

    #[test]
    fn test_all_fan_out() {
        let mut index = PolicyIndex::default();
        let p = policy("t", "p", "1 = 1");
        for op in PolicyOp::ALL_OPS {
            index.insert(op, p.clone());
        }
        for op in PolicyOp::ALL_OPS {
            assert_eq!(index.policies("t", op).len(), 1, "missing for {:?}", op);
        }
        assert_eq!(index.len(), 4);
    }

    #[test]
    fn test_predicate_composition() {
        let mut index = PolicyIndex::default();
        index.insert(
            PolicyOp::Select,
            policy("t", "a", "owner = @request_jwt_claim_sub"),
        );
        index.insert(PolicyOp::Select, policy("t", "b", "visible = 1"));
        assert_eq!(
            index.predicate("t", PolicyOp::Select),
            Some("(owner = @request_jwt_claim_sub) AND (visible = 1)".to_string())
        );
    }

    #[test]
    fn test_predicate_none_when_unrestricted() {
        let index = PolicyIndex::default();
        assert_eq!(index.predicate("t", PolicyOp::Select), None);
    }

    #[test]
    fn test_operations_are_independent() {
        let mut index = PolicyIndex::default();
        index.insert(PolicyOp::Update, policy("t", "a", "1 = 1"));
        assert!(index.predicate("t", PolicyOp::Select).is_none());
        assert!(index.predicate("t", PolicyOp::Update).is_some());
    }

    #[test]
    fn test_engine_snapshot_and_replace() {
        let engine = PolicyEngine::new();
        assert!(engine.predicate("t", PolicyOp::Select).is_none());

        let before = engine.index();
        let mut index = PolicyIndex::default();
        index.insert(PolicyOp::Select, policy("t", "a", "1 = 1"));
        engine.replace(index);

        // the old snapshot is untouched, the engine serves the new one
        assert!(before.predicate("t", PolicyOp::Select).is_none());
        assert_eq!(
            engine.predicate("t", PolicyOp::Select),
            Some("(1 = 1)".to_string())
        );
    }

    #[test]
    fn test_policy_op_round_trip() {
        for op in PolicyOp::ALL_OPS {
            assert_eq!(PolicyOp::from_str(op.as_str()), Some(op));
        }
        assert_eq!(PolicyOp::from_str("TRUNCATE"), None);
    }
}
