//! Table record handlers: list, read, exists, create, update, patch, delete,
//! and the nested relational list.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Map as JsonMap, Value as JsonValue};
use tracing::warn;

use restgate_mysql::query::quote_identifier;
use restgate_mysql::{
    fk_condition, parse_query, parse_select, pk_conditions, resolve_columns, resolve_relation,
    ExecResult, Executor, ParsedQuery, PolicyOp, QueryBuilder, RelationKind, RelationNode,
    SelectTree, SqlFragment, SqlValue, Table,
};

use crate::error::{ApiError, ApiResult};
use crate::handlers::{auth, lookup_table, meta, AppState};
use crate::response::{
    list_response, mutation_metadata, upsert_options, Preferences,
};

fn select_tree(parsed: &ParsedQuery) -> ApiResult<SelectTree> {
    match &parsed.select {
        Some(select) => Ok(parse_select(select)?),
        None => Ok(SelectTree::default()),
    }
}

/// Shared list pipeline for `GET /:table` and the nested relational list.
async fn run_list(
    state: &AppState,
    table: &Table,
    parsed: &ParsedQuery,
    extra: Option<(String, SqlValue)>,
    headers: &HeaderMap,
) -> ApiResult<Response> {
    let ctx = auth(state, headers)?;
    let tree = select_tree(parsed)?;
    let columns = resolve_columns(&state.catalog, table, &tree)?;
    let policy = state.policies.predicate(&table.name, PolicyOp::Select);
    let prefs = Preferences::from_headers(headers);

    let mut builder = QueryBuilder::new(&table.name)?
        .columns(columns)
        .policy(policy)
        .filters(&parsed.filters)?;
    if let Some((column, value)) = extra {
        builder = builder.equals(&column, value)?;
    }
    let builder = builder
        .order_by(&parsed.order)?
        .limit(parsed.page.limit)
        .offset(parsed.page.offset);

    let executor = Executor::new(state.connection.pool());

    let total = if prefs.count_exact {
        let rows = executor
            .fetch_all(&builder.build_count(), ctx.as_ref())
            .await?;
        Some(
            rows.first()
                .and_then(|row| row.get("no_of_rows"))
                .and_then(JsonValue::as_i64)
                .unwrap_or(0),
        )
    } else {
        None
    };

    let rows = executor
        .fetch_all(&builder.build_select(), ctx.as_ref())
        .await?;

    list_response(rows, parsed.page.offset, total, &prefs)
}

/// `GET /api/:table`
pub async fn list(
    State(state): State<AppState>,
    Path(table): Path<String>,
    Query(params): Query<Vec<(String, String)>>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let table = lookup_table(&state, &table)?;
    let parsed = parse_query(&params);
    run_list(&state, table, &parsed, None, &headers).await
}

/// `GET /api/:table/:id` — `count`, `describe`, `groupby`, and `aggregate`
/// are reserved id values dispatching to the meta handlers.
pub async fn read_dispatch(
    State(state): State<AppState>,
    Path((table, id)): Path<(String, String)>,
    Query(params): Query<Vec<(String, String)>>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    match id.as_str() {
        "count" => meta::count_inner(&state, &table, &headers).await,
        "describe" => meta::describe_inner(&state, &table, &headers).await,
        "groupby" => meta::groupby_inner(&state, &table, &params, &headers).await,
        "aggregate" => meta::aggregate_inner(&state, &table, &params, &headers).await,
        _ => read_row(&state, &table, &id, &headers).await,
    }
}

async fn read_row(
    state: &AppState,
    table: &str,
    id: &str,
    headers: &HeaderMap,
) -> ApiResult<Response> {
    let table = lookup_table(state, table)?;
    let ctx = auth(state, headers)?;
    let policy = state.policies.predicate(&table.name, PolicyOp::Select);

    let builder = QueryBuilder::new(&table.name)?
        .policy(policy)
        .pk(pk_conditions(table, id)?)
        .limit(1);

    let rows = Executor::new(state.connection.pool())
        .fetch_all(&builder.build_select(), ctx.as_ref())
        .await?;
    Ok(Json(JsonValue::Array(rows)).into_response())
}

/// `GET /api/:table/:id/:child` — `exists` is a reserved child value.
pub async fn child_dispatch(
    State(state): State<AppState>,
    Path((table, id, child)): Path<(String, String, String)>,
    Query(params): Query<Vec<(String, String)>>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    if child == "exists" {
        exists_row(&state, &table, &id, &headers).await
    } else {
        relational(&state, &table, &id, &child, &params, &headers).await
    }
}

/// Existence check. Deliberately skips the SELECT policy: observability of
/// existence is looser than full read.
async fn exists_row(
    state: &AppState,
    table: &str,
    id: &str,
    headers: &HeaderMap,
) -> ApiResult<Response> {
    let table = lookup_table(state, table)?;
    let ctx = auth(state, headers)?;

    let builder = QueryBuilder::new(&table.name)?
        .pk(pk_conditions(table, id)?)
        .limit(1);

    let rows = Executor::new(state.connection.pool())
        .fetch_all(&builder.build_select(), ctx.as_ref())
        .await?;
    Ok(Json(JsonValue::Array(rows)).into_response())
}

async fn relational(
    state: &AppState,
    parent: &str,
    id: &str,
    child: &str,
    params: &[(String, String)],
    headers: &HeaderMap,
) -> ApiResult<Response> {
    let parent = lookup_table(state, parent)?;
    let child = lookup_table(state, child)?;

    let node = RelationNode {
        target: child.name.clone(),
        hint: None,
        inner: SelectTree::default(),
    };
    let fk = match resolve_relation(&state.catalog, &parent.name, &node) {
        RelationKind::OneToMany { fk } => fk,
        _ => {
            return Err(ApiError::NotFound(format!(
                "no relation from '{}' to '{}'",
                parent.name, child.name
            )))
        }
    };

    let (column, value) = fk_condition(fk, id)?;
    let parsed = parse_query(params);
    run_list(state, child, &parsed, Some((column, value)), headers).await
}

/// `POST /api/:table` — single object or array; the `Resolution` header
/// selects the upsert mode.
pub async fn create(
    State(state): State<AppState>,
    Path(table): Path<String>,
    headers: HeaderMap,
    Json(body): Json<JsonValue>,
) -> ApiResult<Response> {
    let table = lookup_table(&state, &table)?;
    let ctx = auth(&state, &headers)?;

    let rows: Vec<JsonMap<String, JsonValue>> = match body {
        JsonValue::Object(map) => vec![map],
        JsonValue::Array(items) => items
            .into_iter()
            .map(|item| match item {
                JsonValue::Object(map) => Ok(map),
                _ => Err(ApiError::BadRequest(
                    "array elements must be objects".to_string(),
                )),
            })
            .collect::<ApiResult<_>>()?,
        _ => {
            return Err(ApiError::BadRequest(
                "body must be an object or an array of objects".to_string(),
            ))
        }
    };
    if rows.is_empty() {
        return Err(ApiError::BadRequest("empty insert body".to_string()));
    }

    let options = upsert_options(&headers);
    let prefs = Preferences::from_headers(&headers);

    let fragment = QueryBuilder::new(&table.name)?.build_insert(table, &rows, options)?;
    let executor = Executor::new(state.connection.pool());
    let result = executor.execute(&fragment, ctx.as_ref()).await?;

    if prefs.return_representation {
        if let Some(inserted) = fetch_inserted(&state, table, &rows, result, ctx.as_ref()).await? {
            return Ok((StatusCode::CREATED, Json(JsonValue::Array(inserted))).into_response());
        }
        return Ok((StatusCode::CREATED, Json(mutation_metadata(result))).into_response());
    }

    Ok(Json(mutation_metadata(result)).into_response())
}

/// Re-selects freshly inserted rows for `Prefer: return=representation`.
///
/// A single auto-incrementing key is re-read as the id range the driver
/// reported. Natural and composite keys are re-read only when the input row
/// carried every key component.
async fn fetch_inserted(
    state: &AppState,
    table: &Table,
    rows: &[JsonMap<String, JsonValue>],
    result: ExecResult,
    ctx: Option<&restgate_common::RequestContext>,
) -> ApiResult<Option<Vec<JsonValue>>> {
    let executor = Executor::new(state.connection.pool());

    if table.has_auto_increment_pk() && result.last_insert_id > 0 {
        let first = result.last_insert_id;
        let last = first + result.rows_affected.saturating_sub(1);
        let fragment = SqlFragment::new(
            format!(
                "SELECT * FROM {} WHERE {} BETWEEN ? AND ?",
                quote_identifier(&table.name),
                quote_identifier(&table.primary_key[0])
            ),
            vec![SqlValue::UInt(first), SqlValue::UInt(last)],
        );
        return Ok(Some(executor.fetch_all(&fragment, ctx).await?));
    }

    if rows.len() == 1 && !table.primary_key.is_empty() {
        let row = &rows[0];
        if table.primary_key.iter().all(|pk| row.contains_key(pk)) {
            let components = table
                .primary_key
                .iter()
                .map(|pk| (pk.clone(), SqlValue::from_json(&row[pk])))
                .collect();
            let builder = QueryBuilder::new(&table.name)?.pk(components);
            return Ok(Some(
                executor.fetch_all(&builder.build_select(), ctx).await?,
            ));
        }
    }

    Ok(None)
}

/// `PUT /api/:table/:id` — full update of one row.
pub async fn update(
    State(state): State<AppState>,
    Path((table, id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<JsonValue>,
) -> ApiResult<Response> {
    let table = lookup_table(&state, &table)?;
    let ctx = auth(&state, &headers)?;

    let data = body
        .as_object()
        .cloned()
        .ok_or_else(|| ApiError::BadRequest("body must be an object".to_string()))?;

    let policy = state.policies.predicate(&table.name, PolicyOp::Update);
    let builder = QueryBuilder::new(&table.name)?
        .policy(policy)
        .pk(pk_conditions(table, &id)?);

    let fragment = builder.build_update(table, &data)?;
    let result = Executor::new(state.connection.pool())
        .execute(&fragment, ctx.as_ref())
        .await?;

    Ok(Json(mutation_metadata(result)).into_response())
}

/// `PATCH /api/:table` — partial update of every row matching the filters.
pub async fn patch(
    State(state): State<AppState>,
    Path(table): Path<String>,
    Query(params): Query<Vec<(String, String)>>,
    headers: HeaderMap,
    Json(body): Json<JsonValue>,
) -> ApiResult<Response> {
    let table = lookup_table(&state, &table)?;
    let ctx = auth(&state, &headers)?;

    let data = body
        .as_object()
        .cloned()
        .ok_or_else(|| ApiError::BadRequest("body must be an object".to_string()))?;
    if data.is_empty() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    let parsed = parse_query(&params);
    let policy = state.policies.predicate(&table.name, PolicyOp::Update);
    let prefs = Preferences::from_headers(&headers);
    let executor = Executor::new(state.connection.pool());

    // For return=representation, capture candidate primary keys before the
    // update so the changed rows can be re-read afterwards.
    let captured: Option<Vec<SqlValue>> =
        if prefs.return_representation && table.primary_key.len() == 1 {
            let pk = &table.primary_key[0];
            let pre = QueryBuilder::new(&table.name)?
                .columns(vec![quote_identifier(pk)])
                .policy(policy.clone())
                .filters(&parsed.filters)?;
            let ids = executor
                .fetch_all(&pre.build_select(), ctx.as_ref())
                .await?
                .iter()
                .filter_map(|row| row.get(pk.as_str()))
                .map(SqlValue::from_json)
                .collect();
            Some(ids)
        } else {
            None
        };

    let builder = QueryBuilder::new(&table.name)?
        .policy(policy)
        .filters(&parsed.filters)?;
    let fragment = builder.build_update(table, &data)?;
    let result = executor.execute(&fragment, ctx.as_ref()).await?;

    if let Some(ids) = captured {
        if ids.is_empty() {
            return Ok(Json(json!([])).into_response());
        }
        let pk = &table.primary_key[0];
        let re = QueryBuilder::new(&table.name)?.within(pk, ids)?;
        let rows = executor
            .fetch_all(&re.build_select(), ctx.as_ref())
            .await?;
        return Ok(Json(JsonValue::Array(rows)).into_response());
    }

    Ok(Json(mutation_metadata(result)).into_response())
}

/// `DELETE /api/:table/:id` — single-row delete.
pub async fn delete_row(
    State(state): State<AppState>,
    Path((table, id)): Path<(String, String)>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let table = lookup_table(&state, &table)?;
    let ctx = auth(&state, &headers)?;
    let prefs = Preferences::from_headers(&headers);

    let policy = state.policies.predicate(&table.name, PolicyOp::Delete);
    let builder = QueryBuilder::new(&table.name)?
        .policy(policy)
        .pk(pk_conditions(table, &id)?);

    delete_with_builder(&state, builder, &prefs, ctx.as_ref()).await
}

/// `DELETE /api/:table` — filter-driven bulk delete. An empty filter with no
/// policy deletes everything, matching the PostgREST default.
pub async fn delete_bulk(
    State(state): State<AppState>,
    Path(table): Path<String>,
    Query(params): Query<Vec<(String, String)>>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let table = lookup_table(&state, &table)?;
    let ctx = auth(&state, &headers)?;
    let prefs = Preferences::from_headers(&headers);

    let parsed = parse_query(&params);
    let policy = state.policies.predicate(&table.name, PolicyOp::Delete);
    let builder = QueryBuilder::new(&table.name)?
        .policy(policy)
        .filters(&parsed.filters)?;

    if builder.is_unrestricted() {
        warn!(table = %table.name, "Unrestricted bulk delete removes every row");
    }

    delete_with_builder(&state, builder, &prefs, ctx.as_ref()).await
}

async fn delete_with_builder(
    state: &AppState,
    builder: QueryBuilder,
    prefs: &Preferences,
    ctx: Option<&restgate_common::RequestContext>,
) -> ApiResult<Response> {
    let executor = Executor::new(state.connection.pool());

    let captured = if prefs.return_representation {
        Some(
            executor
                .fetch_all(&builder.build_select(), ctx)
                .await?,
        )
    } else {
        None
    };

    let result = executor.execute(&builder.build_delete(), ctx).await?;

    match captured {
        Some(rows) => Ok(Json(JsonValue::Array(rows)).into_response()),
        None => Ok(Json(mutation_metadata(result)).into_response()),
    }
}
