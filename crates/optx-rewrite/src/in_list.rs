//! # OR to IN-List Conversion
//!
//! A disjunction of equalities over the same column(s) is one IN-list probe, which the
//! estimator and the executor handle far better than a chain of independent `Or`s:
//!
//! ```text
//! (a = 1 OR (a = 2 OR (a IN (3, 4) OR FALSE)))                 ->  a IN (1, 2, 3, 4)
//! ((a = 1 AND b = 2) OR ((b = 4 AND a = 3) OR FALSE))           ->  (a, b) IN ((1, 2), (3, 4))
//! ```
//!
//! A chain converts only when all of these hold:
//!
//! - it has at least two disjuncts and ends in `FALSE`;
//! - every disjunct is `column = constant` (either way round), a single-column `IN` list, or a
//!   conjunction of equalities on distinct columns;
//! - every disjunct names the same set of columns, all from the same table;
//! - no disjunct is an `IN` list over several columns.
//!
//! Otherwise the chain is left alone and its disjuncts are searched for convertible chains
//! of their own. Duplicate value rows are dropped, keeping the first occurrence.
//!
//! [`expand_in_list`] performs the opposite rewrite.

use std::collections::HashSet;
use tracing::debug;

use optx_core::expr::{ColumnRef, RelOp, ScalarValue};
use optx_core::tree::{BoolExpr, NodeId, Operand, PredicateTree};

use crate::cnf::{and_chain, or_chain};
use crate::RewriteStage;

pub struct OrToInList;

impl RewriteStage for OrToInList {
    fn name(&self) -> &str {
        "OrToInList"
    }

    fn apply(&self, tree: &mut PredicateTree) {
        let root = tree.root();
        let root = visit(tree, root);
        tree.set_root(root);
    }
}

fn visit(tree: &mut PredicateTree, id: NodeId) -> NodeId {
    match tree.node(id).clone() {
        BoolExpr::And { left, right } => {
            let left = visit(tree, left);
            let right = visit(tree, right);
            *tree.node_mut(id) = BoolExpr::And { left, right };
            id
        }
        BoolExpr::Or { .. } => {
            if let Some(in_list) = convert_chain(tree, id) {
                return tree.add(in_list);
            }
            // Not convertible as a whole: look inside each disjunct.
            let mut current = id;
            while let BoolExpr::Or { left, right } = tree.node(current).clone() {
                let left = visit(tree, left);
                *tree.node_mut(current) = BoolExpr::Or { left, right };
                current = right;
            }
            id
        }
        BoolExpr::Not(operand) => {
            let operand = visit(tree, operand);
            *tree.node_mut(id) = BoolExpr::Not(operand);
            id
        }
        _ => id,
    }
}

/// One disjunct reduced to `(column, value)` pairs; several rows for an `IN` list.
type Rows = Vec<Vec<(ColumnRef, ScalarValue)>>;

fn convert_chain(tree: &PredicateTree, head: NodeId) -> Option<BoolExpr> {
    if !terminates_in_false(tree, head) {
        return None;
    }
    let disjuncts = tree.disjuncts(head);
    if disjuncts.len() < 2 {
        return None;
    }

    let mut columns: Option<Vec<ColumnRef>> = None;
    let mut values = Vec::new();
    let mut seen = HashSet::new();
    for disjunct in disjuncts {
        for row in disjunct_rows(tree, disjunct)? {
            let columns = columns.get_or_insert_with(|| row.iter().map(|(c, _)| c.clone()).collect());
            let ordered = align(columns, row)?;
            if seen.insert(ordered.clone()) {
                values.push(ordered);
            }
        }
    }
    let columns = columns?;
    let table = &columns.first()?.table;
    if columns.iter().any(|c| &c.table != table) {
        return None;
    }

    debug!(
        columns = columns.len(),
        values = values.len(),
        "OR chain converted to IN list"
    );
    Some(BoolExpr::InList {
        columns,
        values,
        negated: false,
    })
}

fn terminates_in_false(tree: &PredicateTree, head: NodeId) -> bool {
    let mut current = head;
    while let BoolExpr::Or { right, .. } = tree.node(current) {
        current = *right;
    }
    tree.node(current).is_constant(false)
}

fn disjunct_rows(tree: &PredicateTree, id: NodeId) -> Option<Rows> {
    match tree.node(id) {
        BoolExpr::Compare { .. } => Some(vec![vec![equality(tree.node(id))?]]),
        BoolExpr::InList {
            columns,
            values,
            negated: false,
        } if columns.len() == 1 => {
            let column = &columns[0];
            values
                .iter()
                .map(|row| match row.as_slice() {
                    [value] if !value.is_null() => Some(vec![(column.clone(), value.clone())]),
                    _ => None,
                })
                .collect()
        }
        BoolExpr::And { .. } => {
            let mut row: Vec<(ColumnRef, ScalarValue)> = Vec::new();
            for conjunct in tree.conjuncts(id) {
                let (column, value) = equality(tree.node(conjunct))?;
                if row.iter().any(|(c, _)| *c == column) {
                    return None;
                }
                row.push((column, value));
            }
            if row.is_empty() {
                return None;
            }
            Some(vec![row])
        }
        _ => None,
    }
}

/// `column = constant` or `constant = column`.
fn equality(node: &BoolExpr) -> Option<(ColumnRef, ScalarValue)> {
    let BoolExpr::Compare {
        op: RelOp::Eq,
        left,
        right: Some(right),
    } = node
    else {
        return None;
    };
    let (column, value) = match (left, right) {
        (Operand::Column(c), Operand::Literal(v)) | (Operand::Literal(v), Operand::Column(c)) => {
            (c, v)
        }
        _ => return None,
    };
    if value.is_null() {
        return None;
    }
    Some((column.clone(), value.clone()))
}

/// Order `row`'s values by `columns`; `None` unless it names exactly those columns.
fn align(columns: &[ColumnRef], row: Vec<(ColumnRef, ScalarValue)>) -> Option<Vec<ScalarValue>> {
    if row.len() != columns.len() {
        return None;
    }
    columns
        .iter()
        .map(|column| {
            row.iter()
                .find(|(c, _)| c == column)
                .map(|(_, v)| v.clone())
        })
        .collect()
}

/// Build the disjunctive form of the `IN` list at `id` without linking it into the tree: an
/// `Or` chain of equalities (conjunctions of equalities for several columns) ending in
/// `FALSE`, or for `NOT IN` an `And` chain of `<>` disjunctions ending in `TRUE`.
///
/// Returns `None` when `id` is not an `IN` list.
pub fn expand_in_list(tree: &mut PredicateTree, id: NodeId) -> Option<NodeId> {
    let BoolExpr::InList {
        columns,
        values,
        negated,
    } = tree.node(id).clone()
    else {
        return None;
    };

    let op = if negated { RelOp::NotEq } else { RelOp::Eq };
    let mut items = Vec::with_capacity(values.len());
    for row in values {
        let leaves: Vec<NodeId> = columns
            .iter()
            .zip(row)
            .map(|(column, value)| {
                tree.add(BoolExpr::Compare {
                    op,
                    left: Operand::Column(column.clone()),
                    right: Some(Operand::Literal(value)),
                })
            })
            .collect();
        let item = if leaves.len() == 1 {
            leaves[0]
        } else if negated {
            or_chain(tree, leaves)
        } else {
            and_chain(tree, leaves)
        };
        items.push(item);
    }

    Some(if negated {
        and_chain(tree, items)
    } else {
        or_chain(tree, items)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cnf::ConjunctiveNormalForm;
    use optx_core::tree::Expr;

    fn eq(table: &str, name: &str, v: i64) -> Expr {
        Expr::compare(ColumnRef::new(table, name, 0), RelOp::Eq, ScalarValue::Int64(v))
    }

    fn normalized(expr: Expr) -> PredicateTree {
        let mut tree = PredicateTree::from_expr(&expr);
        ConjunctiveNormalForm.apply(&mut tree);
        OrToInList.apply(&mut tree);
        tree
    }

    #[test]
    fn test_single_column_chain() {
        let tree = normalized(Expr::disjunction([
            eq("t", "a", 1),
            eq("t", "a", 2),
            eq("t", "a", 2),
            Expr::InList {
                columns: vec![ColumnRef::new("t", "a", 0)],
                values: vec![vec![ScalarValue::Int64(3)]],
                negated: false,
            },
        ]));
        assert_eq!(tree.to_string(), "(t.a IN (1, 2, 3) AND TRUE)");
    }

    #[test]
    fn test_multi_column_chain_aligns_columns() {
        let tree = normalized(Expr::or(
            Expr::and(eq("t", "a", 1), eq("t", "b", 2)),
            Expr::and(eq("t", "b", 4), eq("t", "a", 3)),
        ));
        assert_eq!(tree.to_string(), "((t.a, t.b) IN ((1, 2), (3, 4)) AND TRUE)");
    }

    #[test]
    fn test_mismatched_shapes_are_left_alone() {
        // Different columns.
        let tree = normalized(Expr::or(eq("t", "a", 1), eq("t", "b", 2)));
        assert!(tree.to_string().contains(" OR "));
        // Different tables.
        let tree = normalized(Expr::or(eq("t", "a", 1), eq("u", "a", 2)));
        assert!(tree.to_string().contains(" OR "));
        // Not an equality.
        let tree = normalized(Expr::or(
            eq("t", "a", 1),
            Expr::compare(ColumnRef::new("t", "a", 0), RelOp::Lt, ScalarValue::Int64(0)),
        ));
        assert!(tree.to_string().contains(" OR "));
    }

    #[test]
    fn test_nested_chain_is_converted() {
        // The outer chain mixes shapes; the inner one, inside a conjunction, converts.
        let tree = normalized(Expr::or(
            eq("t", "c", 9),
            Expr::and(eq("t", "d", 1), Expr::or(eq("t", "a", 1), eq("t", "a", 2))),
        ));
        assert!(tree.to_string().contains("t.a IN (1, 2)"));
    }

    #[test]
    fn test_expand_in_list() {
        let mut tree = PredicateTree::from_expr(&Expr::InList {
            columns: vec![ColumnRef::new("t", "a", 0)],
            values: vec![vec![ScalarValue::Int64(1)], vec![ScalarValue::Int64(2)]],
            negated: true,
        });
        let root = tree.root();
        let expanded = expand_in_list(&mut tree, root).unwrap();
        assert_eq!(
            tree.subtree_expr(expanded).to_string(),
            "(t.a <> 1 AND (t.a <> 2 AND TRUE))"
        );
    }
}
