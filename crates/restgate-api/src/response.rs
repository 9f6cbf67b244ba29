//! PostgREST response shaping.
//!
//! Parses the `Prefer`, `Accept`, and `Resolution` request headers and
//! produces the `Content-Range` header, the singular-object contract, and
//! mutation metadata bodies.

use axum::http::{header, HeaderMap, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value as JsonValue};

use restgate_mysql::{ExecResult, InsertOptions};

use crate::error::{ApiError, ApiResult};

/// The media type requesting a single object instead of an array.
pub const SINGULAR_MEDIA_TYPE: &str = "application/vnd.pgrst.object+json";

/// Client preferences extracted from request headers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Preferences {
    /// `Prefer: count=exact` — populate Content-Range totals
    pub count_exact: bool,
    /// `Prefer: return=representation` — echo affected rows
    pub return_representation: bool,
    /// `Accept: application/vnd.pgrst.object+json` — exactly one object
    pub singular: bool,
}

impl Preferences {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let mut prefs = Preferences::default();

        for value in headers.get_all("prefer") {
            if let Ok(value) = value.to_str() {
                for token in value.split(',') {
                    match token.trim() {
                        "count=exact" => prefs.count_exact = true,
                        "return=representation" => prefs.return_representation = true,
                        _ => {}
                    }
                }
            }
        }

        if let Some(accept) = headers.get(header::ACCEPT).and_then(|v| v.to_str().ok()) {
            if accept.contains(SINGULAR_MEDIA_TYPE) {
                prefs.singular = true;
            }
        }

        prefs
    }
}

/// Upsert mode selected by the `Resolution` header.
pub fn upsert_options(headers: &HeaderMap) -> InsertOptions {
    match headers
        .get("resolution")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
    {
        Some("merge-duplicates") => InsertOptions {
            merge_duplicates: true,
            ignore_duplicates: false,
        },
        Some("ignore-duplicates") => InsertOptions {
            merge_duplicates: false,
            ignore_duplicates: true,
        },
        _ => InsertOptions::default(),
    }
}

/// Renders the `Content-Range` value: `start-end/total`, or `*/total` for an
/// empty page; `*` stands in for an unknown total.
pub fn content_range(offset: i64, row_count: usize, total: Option<i64>) -> String {
    let total = total
        .map(|t| t.to_string())
        .unwrap_or_else(|| "*".to_string());
    if row_count == 0 {
        format!("*/{}", total)
    } else {
        format!("{}-{}/{}", offset, offset + row_count as i64 - 1, total)
    }
}

/// Shapes a list/relational result.
///
/// Under the singular-object contract the result must hold exactly one row;
/// anything else is 406. `Content-Range` is emitted when the client asked
/// for a count.
pub fn list_response(
    rows: Vec<JsonValue>,
    offset: i64,
    total: Option<i64>,
    prefs: &Preferences,
) -> ApiResult<Response> {
    if prefs.singular {
        let mut rows = rows;
        if rows.len() == 1 {
            return Ok(Json(rows.remove(0)).into_response());
        }
        return Err(ApiError::NotAcceptable(format!(
            "requested a single object, got {} rows",
            rows.len()
        )));
    }

    let row_count = rows.len();
    let mut response = Json(JsonValue::Array(rows)).into_response();

    if prefs.count_exact {
        let range = content_range(offset, row_count, total);
        if let Ok(value) = HeaderValue::from_str(&range) {
            response
                .headers_mut()
                .insert(header::CONTENT_RANGE, value);
        }
    }

    Ok(response)
}

/// Driver metadata body for mutations without return-representation.
pub fn mutation_metadata(result: ExecResult) -> JsonValue {
    json!({
        "affectedRows": result.rows_affected,
        "insertId": result.last_insert_id,
    })
}
