//! `select` expression planning.
//!
//! Parses the PostgREST `select` parameter into a [`SelectTree`] and resolves
//! relation nodes against the catalog's foreign keys. The parser is
//! depth-correct: commas split items only at parenthesis depth 0, so nested
//! relation lists pass through unharmed.

use crate::catalog::{Catalog, ForeignKey};
use crate::{GatewayError, Result};

/// Maximum embedding depth. Self-referential schemas would otherwise admit
/// unbounded correlated-subquery nesting.
pub const MAX_EMBED_DEPTH: usize = 8;

/// One item of a select list.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectItem {
    /// `*`
    Star,
    /// A plain column
    Column(String),
    /// `-name`: remove the column from a star expansion
    Exclude(String),
    /// `[hint:]target(inner)`: an embedded relation
    Relation(RelationNode),
}

/// An embedded relation request.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationNode {
    /// Target table name; also the alias of the embedded value
    pub target: String,
    /// Optional FK column disambiguating among multiple foreign keys
    pub hint: Option<String>,
    /// The child's own select list
    pub inner: SelectTree,
}

/// The planned shape of a response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectTree {
    pub items: Vec<SelectItem>,
}

impl SelectTree {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Column names removed from star expansion.
    pub fn exclusions(&self) -> Vec<&str> {
        self.items
            .iter()
            .filter_map(|item| match item {
                SelectItem::Exclude(name) => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }

    /// True when the list contains `*` or nothing at all.
    pub fn wants_star(&self) -> bool {
        self.is_empty()
            || self
                .items
                .iter()
                .any(|item| matches!(item, SelectItem::Star))
    }
}

/// How an embedded relation connects to its parent.
#[derive(Debug, Clone, PartialEq)]
pub enum RelationKind<'a> {
    /// The child table owns the FK: many child rows per parent row.
    OneToMany { fk: &'a ForeignKey },
    /// The parent table owns the FK: at most one child row per parent row.
    ManyToOne { fk: &'a ForeignKey },
    /// No foreign key connects the two tables.
    Unrelated,
}

/// Parses a `select` expression into a tree.
///
/// Returns a `Validation` error for unbalanced parentheses or nesting deeper
/// than [`MAX_EMBED_DEPTH`].
pub fn parse_select(input: &str) -> Result<SelectTree> {
    parse_level(input, 0)
}

fn parse_level(input: &str, depth: usize) -> Result<SelectTree> {
    if depth > MAX_EMBED_DEPTH {
        return Err(GatewayError::Validation(format!(
            "select nesting exceeds maximum depth of {}",
            MAX_EMBED_DEPTH
        )));
    }

    let mut tree = SelectTree::default();

    for item in split_top_level(input)? {
        let item = item.trim();
        if item.is_empty() {
            continue;
        }

        if let Some(open) = item.find('(') {
            if !item.ends_with(')') {
                return Err(GatewayError::Validation(format!(
                    "malformed relation item '{}'",
                    item
                )));
            }
            let head = &item[..open];
            let inner = &item[open + 1..item.len() - 1];

            let (hint, target) = match head.split_once(':') {
                Some((hint, target)) => (Some(hint.to_string()), target.to_string()),
                None => (None, head.to_string()),
            };
            if target.is_empty() {
                return Err(GatewayError::Validation(format!(
                    "relation item '{}' has no target table",
                    item
                )));
            }

            tree.items.push(SelectItem::Relation(RelationNode {
                target,
                hint,
                inner: parse_level(inner, depth + 1)?,
            }));
        } else if item == "*" {
            tree.items.push(SelectItem::Star);
        } else if let Some(excluded) = item.strip_prefix('-') {
            tree.items.push(SelectItem::Exclude(excluded.to_string()));
        } else {
            tree.items.push(SelectItem::Column(item.to_string()));
        }
    }

    Ok(tree)
}

/// Splits on commas at parenthesis depth 0, verifying the depth returns to 0.
fn split_top_level(input: &str) -> Result<Vec<&str>> {
    let mut items = Vec::new();
    let mut depth: i32 = 0;
    let mut start = 0;

    for (i, c) in input.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 {
                    return Err(GatewayError::Validation(
                        "unbalanced parentheses in select".to_string(),
                    ));
                }
            }
            ',' if depth == 0 => {
                items.push(&input[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }

    if depth != 0 {
        return Err(GatewayError::Validation(
            "unbalanced parentheses in select".to_string(),
        ));
    }

    items.push(&input[start..]);
    Ok(items)
}

/// Resolves a relation node against the catalog.
///
/// A hint must equal the FK's owning column (or its referenced column) to
/// select among multiple foreign keys between the same two tables. The
/// child-owned direction is checked first.
pub fn resolve_relation<'a>(
    catalog: &'a Catalog,
    parent: &str,
    node: &RelationNode,
) -> RelationKind<'a> {
    let hint_matches = |fk: &ForeignKey| match &node.hint {
        Some(hint) => *hint == fk.column || *hint == fk.referenced_column,
        None => true,
    };

    if let Some(child) = catalog.table(&node.target) {
        if let Some(fk) = child
            .foreign_keys
            .iter()
            .find(|fk| fk.referenced_table == parent && hint_matches(fk))
        {
            return RelationKind::OneToMany { fk };
        }
    }

    if let Some(parent_table) = catalog.table(parent) {
        if let Some(fk) = parent_table
            .foreign_keys
            .iter()
            .find(|fk| fk.referenced_table == node.target && hint_matches(fk))
        {
            return RelationKind::ManyToOne { fk };
        }
    }

    RelationKind::Unrelated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::test_fixtures::sample_catalog;

    #[test]
    fn test_simple_columns() {
        let tree = parse_select("a,b,c").unwrap();
        assert_eq!(
            tree.items,
            vec![
                SelectItem::Column("a".to_string()),
                SelectItem::Column("b".to_string()),
                SelectItem::Column("c".to_string()),
            ]
        );
    }

    #[test]
    fn test_star_and_exclusion() {
        let tree = parse_select("*,-secret").unwrap();
        assert!(tree.wants_star());
        assert_eq!(tree.exclusions(), vec!["secret"]);
    }

    #[test]
    fn test_empty_select_wants_star() {
        let tree = parse_select("").unwrap();
        assert!(tree.wants_star());
    }

    #[test]
    fn test_relation_item() {
        let tree = parse_select("customerNumber,orders(orderNumber,status)").unwrap();
        assert_eq!(tree.items.len(), 2);
        match &tree.items[1] {
            SelectItem::Relation(node) => {
                assert_eq!(node.target, "orders");
                assert_eq!(node.hint, None);
                assert_eq!(node.inner.items.len(), 2);
            }
            other => panic!("expected relation, got {:?}", other),
        }
    }

    #[test]
    fn test_relation_with_hint() {
        let tree = parse_select("customerNumber:customers(customerName)").unwrap();
        match &tree.items[0] {
            SelectItem::Relation(node) => {
                assert_eq!(node.hint.as_deref(), Some("customerNumber"));
                assert_eq!(node.target, "customers");
            }
            other => panic!("expected relation, got {:?}", other),
        }
    }

    #[test]
    fn test_nested_relations_split_correctly() {
        let tree =
            parse_select("orderNumber,orderdetails(productCode,quantityOrdered),status").unwrap();
        assert_eq!(tree.items.len(), 3);
        assert!(matches!(tree.items[2], SelectItem::Column(_)));
    }

    #[test]
    fn test_deeply_nested() {
        let tree = parse_select("a,b(c,d(e,f))").unwrap();
        match &tree.items[1] {
            SelectItem::Relation(node) => match &node.inner.items[1] {
                SelectItem::Relation(inner) => assert_eq!(inner.target, "d"),
                other => panic!("expected nested relation, got {:?}", other),
            },
            other => panic!("expected relation, got {:?}", other),
        }
    }

    #[test]
    fn test_unbalanced_parentheses_rejected() {
        assert!(parse_select("a,b(c").is_err());
        assert!(parse_select("a)b").is_err());
        assert!(parse_select("a,b(c))").is_err());
    }

    #[test]
    fn test_depth_bound() {
        let mut input = String::new();
        for _ in 0..10 {
            input.push_str("t(");
        }
        input.push('a');
        for _ in 0..10 {
            input.push(')');
        }
        assert!(parse_select(&input).is_err());
    }

    #[test]
    fn test_resolve_one_to_many() {
        let catalog = sample_catalog();
        let node = RelationNode {
            target: "orders".to_string(),
            hint: None,
            inner: SelectTree::default(),
        };
        match resolve_relation(&catalog, "customers", &node) {
            RelationKind::OneToMany { fk } => {
                assert_eq!(fk.table, "orders");
                assert_eq!(fk.column, "customerNumber");
            }
            other => panic!("expected OneToMany, got {:?}", other),
        }
    }

    #[test]
    fn test_resolve_many_to_one() {
        let catalog = sample_catalog();
        let node = RelationNode {
            target: "customers".to_string(),
            hint: None,
            inner: SelectTree::default(),
        };
        match resolve_relation(&catalog, "orders", &node) {
            RelationKind::ManyToOne { fk } => {
                assert_eq!(fk.table, "orders");
                assert_eq!(fk.referenced_table, "customers");
            }
            other => panic!("expected ManyToOne, got {:?}", other),
        }
    }

    #[test]
    fn test_resolve_with_hint() {
        let catalog = sample_catalog();
        let node = RelationNode {
            target: "customers".to_string(),
            hint: Some("customerNumber".to_string()),
            inner: SelectTree::default(),
        };
        assert!(matches!(
            resolve_relation(&catalog, "orders", &node),
            RelationKind::ManyToOne { .. }
        ));

        let wrong_hint = RelationNode {
            target: "customers".to_string(),
            hint: Some("salesRepEmployeeNumber".to_string()),
            inner: SelectTree::default(),
        };
        assert_eq!(
            resolve_relation(&catalog, "orders", &wrong_hint),
            RelationKind::Unrelated
        );
    }

    #[test]
    fn test_resolve_unrelated() {
        let catalog = sample_catalog();
        let node = RelationNode {
            target: "orderdetails".to_string(),
            hint: None,
            inner: SelectTree::default(),
        };
        assert_eq!(
            resolve_relation(&catalog, "customers", &node),
            RelationKind::Unrelated
        );
    }
}
