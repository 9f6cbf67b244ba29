//! Query-parameter parsing.
//!
//! Decodes the PostgREST horizontal-filter syntax (`col=eq.103`), the
//! `select`/`order`/`limit`/`offset` keys, and the legacy DSL (`_where`,
//! `_sort`, `_fields`, `_p`, `_size`) into a neutral model the compiler
//! consumes. This module emits no SQL.

use crate::query::OrderDirection;

/// Comparison operator carried by a parsed filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    ILike,
    Is,
    In,
}

/// A parsed filter value.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Scalar(String),
    Null,
    List(Vec<String>),
}

/// One predicate of the flat AND-conjunction.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: String,
    pub op: FilterOp,
    pub value: FilterValue,
}

/// A flat conjunction of predicates. Repeated keys on the same column stay
/// separate predicates and are ANDed by the compiler.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterSet {
    pub predicates: Vec<Filter>,
}

impl FilterSet {
    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }
}

/// Pagination bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: i64,
    pub offset: i64,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            offset: 0,
        }
    }
}

/// Everything the parser extracts from the query string.
#[derive(Debug, Clone, Default)]
pub struct ParsedQuery {
    pub filters: FilterSet,
    /// Raw `select` expression, parsed later by the planner
    pub select: Option<String>,
    pub order: Vec<(String, OrderDirection)>,
    pub page: Page,
    /// Columns named by `_fields` (groupby/aggregate requests)
    pub fields: Vec<String>,
}

const DEFAULT_LIMIT: i64 = 20;
const MAX_LEGACY_SIZE: i64 = 100;

/// Keys that never become filter predicates.
const RESERVED_KEYS: &[&str] = &["select", "order", "limit", "offset", "on_conflict", "columns"];

fn is_reserved(key: &str) -> bool {
    key.starts_with('_') || RESERVED_KEYS.contains(&key)
}

/// Boolean literals become the numeric forms MySQL compares against.
fn map_boolean(value: &str) -> String {
    match value {
        "true" => "1".to_string(),
        "false" => "0".to_string(),
        other => other.to_string(),
    }
}

/// Parses one PostgREST filter parameter, `<col>=<op>.<value>`.
///
/// Unknown operators and values without an operator prefix yield `None`;
/// dropping them narrows results, never widens them.
fn parse_filter(column: &str, raw: &str) -> Option<Filter> {
    let (op_str, rest) = raw.split_once('.')?;

    let op = match op_str {
        "eq" => FilterOp::Eq,
        "neq" => FilterOp::Neq,
        "gt" => FilterOp::Gt,
        "gte" => FilterOp::Gte,
        "lt" => FilterOp::Lt,
        "lte" => FilterOp::Lte,
        "like" => FilterOp::Like,
        "ilike" => FilterOp::ILike,
        "is" => FilterOp::Is,
        "in" => FilterOp::In,
        _ => return None,
    };

    let value = match op {
        FilterOp::Is => {
            if rest == "null" {
                FilterValue::Null
            } else {
                // IS TRUE / IS FALSE and friends keep their literal text
                FilterValue::Scalar(rest.to_string())
            }
        }
        FilterOp::In => {
            let inner = rest.strip_prefix('(')?.strip_suffix(')')?;
            FilterValue::List(
                inner
                    .split(',')
                    .map(|v| map_boolean(v.trim()))
                    .collect(),
            )
        }
        _ => FilterValue::Scalar(map_boolean(rest)),
    };

    Some(Filter {
        column: column.to_string(),
        op,
        value,
    })
}

/// Parses the legacy `_where` DSL: `(col,op,val)` segments joined with
/// `~and`. `~or`/`~not` groups cannot express a flat conjunction and are
/// dropped, as are unknown operators.
fn parse_legacy_where(raw: &str) -> Vec<Filter> {
    let mut filters = Vec::new();

    for segment in raw.split('~') {
        let group = if let Some(rest) = segment.strip_prefix("and") {
            rest
        } else if segment.starts_with("or") || segment.starts_with("not") {
            continue;
        } else {
            segment
        };

        let inner = match group
            .strip_prefix('(')
            .and_then(|g| g.strip_suffix(')'))
        {
            Some(inner) => inner,
            None => continue,
        };

        let mut parts = inner.splitn(3, ',');
        let (column, op_str, value) = match (parts.next(), parts.next(), parts.next()) {
            (Some(c), Some(o), Some(v)) => (c, o, v),
            _ => continue,
        };

        let op = match op_str {
            "eq" => FilterOp::Eq,
            "ne" => FilterOp::Neq,
            "gt" => FilterOp::Gt,
            "gte" => FilterOp::Gte,
            "lt" => FilterOp::Lt,
            "lte" => FilterOp::Lte,
            "like" => FilterOp::Like,
            "is" => FilterOp::Is,
            "in" => FilterOp::In,
            _ => continue,
        };

        let value = match op {
            FilterOp::Is if value == "null" => FilterValue::Null,
            FilterOp::Is => FilterValue::Scalar(value.to_string()),
            FilterOp::In => {
                FilterValue::List(value.split(',').map(|v| map_boolean(v.trim())).collect())
            }
            _ => FilterValue::Scalar(map_boolean(value)),
        };

        filters.push(Filter {
            column: column.to_string(),
            op,
            value,
        });
    }

    filters
}

fn parse_order_spec(raw: &str) -> Vec<(String, OrderDirection)> {
    raw.split(',')
        .filter(|part| !part.is_empty())
        .map(|part| match part.rsplit_once('.') {
            Some((col, "desc")) => (col.to_string(), OrderDirection::Desc),
            Some((col, "asc")) => (col.to_string(), OrderDirection::Asc),
            _ => (part.to_string(), OrderDirection::Asc),
        })
        .collect()
}

fn parse_legacy_sort(raw: &str) -> Vec<(String, OrderDirection)> {
    raw.split(',')
        .filter(|part| !part.is_empty())
        .map(|part| match part.strip_prefix('-') {
            Some(col) => (col.to_string(), OrderDirection::Desc),
            None => (part.to_string(), OrderDirection::Asc),
        })
        .collect()
}

/// Parses the decoded query-parameter multimap.
///
/// Repeated keys produce multiple predicates on the same column.
pub fn parse_query(pairs: &[(String, String)]) -> ParsedQuery {
    let mut parsed = ParsedQuery::default();

    let mut size: Option<i64> = None;
    let mut page_number: Option<i64> = None;
    let mut limit: Option<i64> = None;
    let mut offset: Option<i64> = None;
    let mut legacy_sort: Vec<(String, OrderDirection)> = Vec::new();

    for (key, value) in pairs {
        match key.as_str() {
            "select" => parsed.select = Some(value.clone()),
            "order" => parsed.order = parse_order_spec(value),
            "limit" => limit = value.parse().ok(),
            "offset" => offset = value.parse().ok(),
            "_sort" => legacy_sort = parse_legacy_sort(value),
            "_size" => size = value.parse().ok(),
            "_p" => page_number = value.parse().ok(),
            "_fields" => {
                parsed.fields = value
                    .split(',')
                    .filter(|f| !f.is_empty())
                    .map(str::to_string)
                    .collect()
            }
            "_where" => parsed
                .filters
                .predicates
                .extend(parse_legacy_where(value)),
            _ if is_reserved(key) => {}
            _ => {
                if let Some(filter) = parse_filter(key, value) {
                    parsed.filters.predicates.push(filter);
                }
            }
        }
    }

    if parsed.order.is_empty() {
        parsed.order = legacy_sort;
    }

    // `limit` overrides the capped legacy `_size`
    parsed.page.limit = limit.unwrap_or_else(|| {
        size.map(|s| s.min(MAX_LEGACY_SIZE)).unwrap_or(DEFAULT_LIMIT)
    });

    // `offset` overrides the 1-based `_p` conversion
    parsed.page.offset = offset.unwrap_or_else(|| {
        page_number
            .map(|p| (p - 1) * parsed.page.limit + 1)
            .unwrap_or(0)
    });

    parsed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(entries: &[(&str, &str)]) -> Vec<(String, String)> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_eq_filter() {
        let parsed = parse_query(&pairs(&[("customerNumber", "eq.103")]));
        assert_eq!(
            parsed.filters.predicates,
            vec![Filter {
                column: "customerNumber".to_string(),
                op: FilterOp::Eq,
                value: FilterValue::Scalar("103".to_string()),
            }]
        );
    }

    #[test]
    fn test_all_operator_mappings() {
        let cases = [
            ("eq.1", FilterOp::Eq),
            ("neq.1", FilterOp::Neq),
            ("gt.1", FilterOp::Gt),
            ("gte.1", FilterOp::Gte),
            ("lt.1", FilterOp::Lt),
            ("lte.1", FilterOp::Lte),
            ("like.a%", FilterOp::Like),
            ("ilike.a%", FilterOp::ILike),
        ];
        for (raw, op) in cases {
            let filter = parse_filter("c", raw).unwrap();
            assert_eq!(filter.op, op, "for {}", raw);
        }
    }

    #[test]
    fn test_value_with_dots_reassembles() {
        let filter = parse_filter("version", "eq.1.2.3").unwrap();
        assert_eq!(filter.value, FilterValue::Scalar("1.2.3".to_string()));
    }

    #[test]
    fn test_is_null() {
        let filter = parse_filter("shippedDate", "is.null").unwrap();
        assert_eq!(filter.op, FilterOp::Is);
        assert_eq!(filter.value, FilterValue::Null);
    }

    #[test]
    fn test_is_true_keeps_literal() {
        let filter = parse_filter("active", "is.true").unwrap();
        assert_eq!(filter.value, FilterValue::Scalar("true".to_string()));
    }

    #[test]
    fn test_in_list() {
        let filter = parse_filter("status", "in.(Shipped,Cancelled)").unwrap();
        assert_eq!(
            filter.value,
            FilterValue::List(vec!["Shipped".to_string(), "Cancelled".to_string()])
        );
    }

    #[test]
    fn test_in_requires_parentheses() {
        assert!(parse_filter("status", "in.Shipped,Cancelled").is_none());
    }

    #[test]
    fn test_boolean_literals_map_to_numeric() {
        let filter = parse_filter("active", "eq.true").unwrap();
        assert_eq!(filter.value, FilterValue::Scalar("1".to_string()));
        let filter = parse_filter("active", "neq.false").unwrap();
        assert_eq!(filter.value, FilterValue::Scalar("0".to_string()));
    }

    #[test]
    fn test_unknown_operator_dropped() {
        assert!(parse_filter("c", "fts.hello").is_none());
        assert!(parse_filter("c", "plain-value").is_none());
    }

    #[test]
    fn test_reserved_keys_skipped() {
        let parsed = parse_query(&pairs(&[
            ("select", "a,b"),
            ("order", "a.asc"),
            ("limit", "5"),
            ("offset", "2"),
            ("on_conflict", "id"),
            ("columns", "a,b"),
            ("_anything", "x"),
        ]));
        assert!(parsed.filters.is_empty());
    }

    #[test]
    fn test_repeated_keys_become_multiple_predicates() {
        let parsed = parse_query(&pairs(&[("age", "gte.18"), ("age", "lt.65")]));
        assert_eq!(parsed.filters.predicates.len(), 2);
        assert_eq!(parsed.filters.predicates[0].op, FilterOp::Gte);
        assert_eq!(parsed.filters.predicates[1].op, FilterOp::Lt);
    }

    #[test]
    fn test_pagination_defaults() {
        let parsed = parse_query(&[]);
        assert_eq!(parsed.page, Page { limit: 20, offset: 0 });
    }

    #[test]
    fn test_limit_overrides_size() {
        let parsed = parse_query(&pairs(&[("_size", "50"), ("limit", "5")]));
        assert_eq!(parsed.page.limit, 5);
    }

    #[test]
    fn test_size_capped_at_100() {
        let parsed = parse_query(&pairs(&[("_size", "500")]));
        assert_eq!(parsed.page.limit, 100);
    }

    #[test]
    fn test_page_number_conversion() {
        let parsed = parse_query(&pairs(&[("_p", "3"), ("_size", "10")]));
        assert_eq!(parsed.page.limit, 10);
        assert_eq!(parsed.page.offset, 21);
    }

    #[test]
    fn test_offset_overrides_page_number() {
        let parsed = parse_query(&pairs(&[("_p", "3"), ("offset", "40")]));
        assert_eq!(parsed.page.offset, 40);
    }

    #[test]
    fn test_order_postgrest_syntax() {
        let parsed = parse_query(&pairs(&[("order", "a.asc,b.desc")]));
        assert_eq!(
            parsed.order,
            vec![
                ("a".to_string(), OrderDirection::Asc),
                ("b".to_string(), OrderDirection::Desc)
            ]
        );
    }

    #[test]
    fn test_order_legacy_sort() {
        let parsed = parse_query(&pairs(&[("_sort", "a,-b")]));
        assert_eq!(
            parsed.order,
            vec![
                ("a".to_string(), OrderDirection::Asc),
                ("b".to_string(), OrderDirection::Desc)
            ]
        );
    }

    #[test]
    fn test_order_wins_over_legacy_sort() {
        let parsed = parse_query(&pairs(&[("_sort", "a"), ("order", "b.desc")]));
        assert_eq!(parsed.order, vec![("b".to_string(), OrderDirection::Desc)]);
    }

    #[test]
    fn test_fields_parsing() {
        let parsed = parse_query(&pairs(&[("_fields", "country,city")]));
        assert_eq!(parsed.fields, vec!["country", "city"]);
    }

    #[test]
    fn test_legacy_where_single_group() {
        let filters = parse_legacy_where("(status,eq,Shipped)");
        assert_eq!(
            filters,
            vec![Filter {
                column: "status".to_string(),
                op: FilterOp::Eq,
                value: FilterValue::Scalar("Shipped".to_string()),
            }]
        );
    }

    #[test]
    fn test_legacy_where_and_chain() {
        let filters = parse_legacy_where("(age,gte,18)~and(age,lt,65)");
        assert_eq!(filters.len(), 2);
        assert_eq!(filters[1].op, FilterOp::Lt);
    }

    #[test]
    fn test_legacy_where_or_group_dropped() {
        let filters = parse_legacy_where("(a,eq,1)~or(b,eq,2)");
        assert_eq!(filters.len(), 1);
        assert_eq!(filters[0].column, "a");
    }

    #[test]
    fn test_legacy_where_in_value() {
        let filters = parse_legacy_where("(status,in,Shipped,Cancelled)");
        assert_eq!(
            filters[0].value,
            FilterValue::List(vec!["Shipped".to_string(), "Cancelled".to_string()])
        );
    }

    #[test]
    fn test_legacy_where_unknown_op_dropped() {
        assert!(parse_legacy_where("(a,nlike,x)").is_empty());
    }
}
