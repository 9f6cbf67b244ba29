//! The MySQL-dialect query compiler.
//!
//! Emits parameterized SQL with positional `?` placeholders from the neutral
//! filter/select/order model. Identifiers are backtick-quoted and validated
//! before interpolation; values always travel as bound parameters. Embedded
//! relations compile to correlated JSON-valued subqueries.

mod builder;
mod helpers;
mod modify;
mod select;
mod types;


pub use builder::QueryBuilder;
pub use helpers::{aggregate_exprs, quote_identifier, typed_value, validate_identifier};
pub use modify::InsertOptions;
pub use select::{embed_expr, fk_condition, pk_conditions, resolve_columns};
pub use types::{OrderDirection, SqlFragment};
