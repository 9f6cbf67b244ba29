//! Stored-routine invocation.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::Value as JsonValue;

use restgate_mysql::query::{quote_identifier, validate_identifier};
use restgate_mysql::{Executor, RoutineKind, SqlFragment, SqlValue};

use crate::error::{ApiError, ApiResult};
use crate::handlers::{auth, AppState};

/// `POST /api/rpc/:name` — invoke a stored procedure or function.
///
/// Parameters bind in declared order; any parameter missing from the body
/// binds as SQL NULL. Procedures run via `CALL`, functions via
/// `SELECT name(...) AS result`.
pub async fn call_routine(
    State(state): State<AppState>,
    Path(name): Path<String>,
    headers: HeaderMap,
    body: Option<Json<JsonValue>>,
) -> ApiResult<Response> {
    let ctx = auth(&state, &headers)?;
    validate_identifier(&name)?;

    let routine = state
        .catalog
        .routine(&name)
        .ok_or_else(|| ApiError::NotFound(format!("unknown routine '{}'", name)))?;

    let args = match body {
        Some(Json(JsonValue::Object(map))) => map,
        Some(Json(JsonValue::Null)) | None => serde_json::Map::new(),
        Some(Json(_)) => {
            return Err(ApiError::BadRequest(
                "rpc body must be an object".to_string(),
            ))
        }
    };

    let params: Vec<SqlValue> = routine
        .params
        .iter()
        .map(|param| match args.get(&param.name) {
            Some(value) => SqlValue::from_json(value),
            None => SqlValue::Null,
        })
        .collect();
    let placeholders = vec!["?"; params.len()].join(", ");

    let sql = match routine.kind {
        RoutineKind::Procedure => {
            format!("CALL {}({})", quote_identifier(&routine.name), placeholders)
        }
        RoutineKind::Function => format!(
            "SELECT {}({}) AS result",
            quote_identifier(&routine.name),
            placeholders
        ),
    };

    let rows = Executor::new(state.connection.pool())
        .fetch_all(&SqlFragment::new(sql, params), ctx.as_ref())
        .await?;
    Ok(Json(JsonValue::Array(rows)).into_response())
}
