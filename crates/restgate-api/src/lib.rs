//! HTTP layer of the restgate gateway.
//!
//! Builds the axum router over the introspected catalog: every table gets
//! PostgREST-compatible CRUD routes, every stored routine an rpc route. The
//! handlers compose the parser, planner, policy engine, compiler, and
//! executor from `restgate-mysql` and shape responses with the
//! PostgREST-specific headers.

pub mod config;
pub mod error;
pub mod handlers;
pub mod response;
pub mod security;
pub mod server;

pub use config::{DatabaseUrl, GatewayConfig};
pub use error::{ApiError, ApiResult};
pub use handlers::AppState;
pub use security::JwtVerifier;
pub use server::{build_router, serve};
