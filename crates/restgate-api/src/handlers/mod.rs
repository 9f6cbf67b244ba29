//! Operation handlers.
//!
//! Each handler composes the same pipeline: parse query parameters, plan the
//! select tree, look up policies, compile SQL, execute under the request's
//! claim context, and shape the response.

pub mod meta;
pub mod records;
pub mod rpc;

use std::sync::Arc;

use axum::http::HeaderMap;

use restgate_common::RequestContext;
use restgate_mysql::{Catalog, Connection, PolicyEngine, Table, POLICY_TABLE};

use crate::config::GatewayConfig;
use crate::error::{ApiError, ApiResult};
use crate::security;

/// Shared state for every handler.
#[derive(Clone)]
pub struct AppState {
    pub connection: Connection,
    pub catalog: Arc<Catalog>,
    pub policies: Arc<PolicyEngine>,
    pub config: Arc<GatewayConfig>,
}

/// Resolves a path segment to a catalog table. The policy store is hidden.
pub(crate) fn lookup_table<'a>(state: &'a AppState, name: &str) -> ApiResult<&'a Table> {
    if name == POLICY_TABLE {
        return Err(ApiError::NotFound(format!("unknown table '{}'", name)));
    }
    state
        .catalog
        .table(name)
        .ok_or_else(|| ApiError::NotFound(format!("unknown table '{}'", name)))
}

/// Builds the request's claim context from its Authorization header.
pub(crate) fn auth(state: &AppState, headers: &HeaderMap) -> ApiResult<Option<RequestContext>> {
    Ok(security::request_context(&state.config, headers)?)
}
