//! Request-to-SQL core of the restgate gateway.
//!
//! This crate turns parsed HTTP requests into parameterized MySQL/MariaDB
//! statements and result rows back into JSON. It holds everything that knows
//! SQL:
//!
//! - connection pooling over sqlx with startup retry
//! - startup schema introspection into an immutable catalog
//! - the PostgREST query-parameter parser and the `select` planner
//! - the MySQL-dialect query compiler, including recursive JSON-valued
//!   subqueries for embedded relations
//! - the row-level-security policy engine
//! - the claim-context executor that binds token claims as session variables
//!   on the same connection that runs the main statement
//!
//! # Architecture
//!
//! ```text
//! HTTP layer (restgate-api)
//!        |
//!   params / plan  ->  query (compiler)  <-  policy (RLS predicates)
//!        |                   |
//!     catalog  ---------  executor
//!        |                   |
//!           SQLx (MySQL driver)
//! ```
//!
//! # Safety
//!
//! All user-supplied values travel as bound parameters. Identifiers (table
//! and column names) are validated before they are interpolated into SQL.
//! Policy predicates are operator-authored SQL and are injected verbatim, in
//! parentheses, the same trust model as database-native row security.

/// Database connection management with connection pooling.
pub mod connection;

/// Startup schema introspection and the immutable in-memory catalog.
pub mod catalog;

/// Query-parameter parsing into the neutral filter/order/pagination model.
pub mod params;

/// `select` expression parsing and relation resolution.
pub mod plan;

/// The MySQL-dialect query compiler.
pub mod query;

/// Row-level-security policy store, index, and predicate injection.
pub mod policy;

/// Statement execution, claim-context injection, and transactions.
pub mod executor;

/// Bindable SQL values and row-to-JSON decoding.
pub mod types;

pub use catalog::{Catalog, Column, ColumnType, ForeignKey, KeyRole, ParamMode, Routine, RoutineKind, RoutineParam, Table};
pub use connection::{Connection, PoolConfig, RetryConfig};
pub use executor::{ExecResult, Executor};
pub use params::{parse_query, Filter, FilterOp, FilterSet, FilterValue, Page, ParsedQuery};
pub use plan::{parse_select, resolve_relation, RelationKind, RelationNode, SelectItem, SelectTree, MAX_EMBED_DEPTH};
pub use policy::{Policy, PolicyEngine, PolicyIndex, PolicyOp, POLICY_TABLE};
pub use query::{
    aggregate_exprs, fk_condition, pk_conditions, resolve_columns, InsertOptions, OrderDirection,
    QueryBuilder, SqlFragment,
};
pub use types::{row_to_json, SqlValue};

pub use restgate_common::{GatewayError, Result};
