//! Catalog and aggregate handlers: tables, count, describe, groupby,
//! aggregate, policy reload, health.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value as JsonValue};

use restgate_mysql::query::quote_identifier;
use restgate_mysql::{aggregate_exprs, parse_query, Executor, OrderDirection, QueryBuilder};

use crate::error::{ApiError, ApiResult};
use crate::handlers::{auth, lookup_table, AppState};

/// `GET /api/tables` — catalog table names, policy store excluded.
pub async fn tables(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Response> {
    auth(&state, &headers)?;
    let names: Vec<&str> = state.catalog.table_names();
    Ok(Json(json!(names)).into_response())
}

/// `GET /api/health` — liveness probe that also pings the pool.
pub async fn health(State(state): State<AppState>) -> ApiResult<Response> {
    state.connection.ping().await?;
    Ok(Json(json!({"status": "ok"})).into_response())
}

/// `POST /api/_policies/reload` — rebuild the policy index from the store.
pub async fn reload_policies(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    auth(&state, &headers)?;
    let reloaded = state.policies.reload(state.connection.pool()).await?;
    Ok(Json(json!({"reloaded": reloaded})).into_response())
}

pub(crate) async fn count_inner(
    state: &AppState,
    table: &str,
    headers: &HeaderMap,
) -> ApiResult<Response> {
    let table = lookup_table(state, table)?;
    let ctx = auth(state, headers)?;

    let builder = QueryBuilder::new(&table.name)?;
    let rows = Executor::new(state.connection.pool())
        .fetch_all(&builder.build_count(), ctx.as_ref())
        .await?;
    Ok(Json(JsonValue::Array(rows)).into_response())
}

pub(crate) async fn describe_inner(
    state: &AppState,
    table: &str,
    headers: &HeaderMap,
) -> ApiResult<Response> {
    let table = lookup_table(state, table)?;
    auth(state, headers)?;
    Ok(Json(serde_json::to_value(table).map_err(|e| ApiError::Internal(e.to_string()))?)
        .into_response())
}

pub(crate) async fn groupby_inner(
    state: &AppState,
    table: &str,
    params: &[(String, String)],
    headers: &HeaderMap,
) -> ApiResult<Response> {
    let table = lookup_table(state, table)?;
    let ctx = auth(state, headers)?;
    let parsed = parse_query(params);

    if parsed.fields.is_empty() {
        return Err(ApiError::BadRequest(
            "groupby requires the _fields parameter".to_string(),
        ));
    }

    let mut columns: Vec<String> = parsed.fields.iter().map(|f| quote_identifier(f)).collect();
    columns.push("COUNT(*) AS `count`".to_string());

    let order = if parsed.order.is_empty() {
        vec![("count".to_string(), OrderDirection::Desc)]
    } else {
        parsed.order.clone()
    };

    let builder = QueryBuilder::new(&table.name)?
        .columns(columns)
        .group_by(&parsed.fields)?
        .order_by(&order)?;

    let rows = Executor::new(state.connection.pool())
        .fetch_all(&builder.build_select(), ctx.as_ref())
        .await?;
    Ok(Json(JsonValue::Array(rows)).into_response())
}

pub(crate) async fn aggregate_inner(
    state: &AppState,
    table: &str,
    params: &[(String, String)],
    headers: &HeaderMap,
) -> ApiResult<Response> {
    let table = lookup_table(state, table)?;
    let ctx = auth(state, headers)?;
    let parsed = parse_query(params);

    if parsed.fields.is_empty() {
        return Err(ApiError::BadRequest(
            "aggregate requires the _fields parameter".to_string(),
        ));
    }

    let mut columns: Vec<String> = Vec::new();
    for field in &parsed.fields {
        columns.extend(aggregate_exprs(field)?);
    }

    let builder = QueryBuilder::new(&table.name)?.columns(columns);
    let rows = Executor::new(state.connection.pool())
        .fetch_all(&builder.build_select(), ctx.as_ref())
        .await?;
    Ok(Json(JsonValue::Array(rows)).into_response())
}
