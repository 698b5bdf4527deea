//! # Conjunctive Normal Form Shaping
//!
//! Brings a NOT-free tree into the chain shape every later stage and the estimator rely on:
//!
//! ```text
//! And(c1, And(c2, And(c3, TRUE)))          top level, right-linked, TRUE-terminated
//! Or(d1, Or(d2, FALSE))                    every disjunction, FALSE-terminated
//! ```
//!
//! Nested `And`s are flattened into their parent chain and nested `Or`s into theirs, so an
//! `And` never has an `And` as its left child and an `Or` never has an `Or` as its left child.
//! Neutral constants (`TRUE` inside a conjunction, `FALSE` inside a disjunction) are dropped
//! while flattening. The root is always an `And`, even for a tree with a single predicate.
//!
//! The stage reshapes chains; it does not distribute `Or` over `And`. That is
//! [`crate::dnf_expansion`]'s job, under a budget.

use optx_core::tree::{BoolExpr, NodeId, PredicateTree};

use crate::RewriteStage;

pub struct ConjunctiveNormalForm;

impl RewriteStage for ConjunctiveNormalForm {
    fn name(&self) -> &str {
        "ConjunctiveNormalForm"
    }

    fn apply(&self, tree: &mut PredicateTree) {
        let root = tree.root();
        let mut conjuncts = Vec::new();
        flatten(tree, root, true, &mut conjuncts);
        let root = if conjuncts.is_empty() {
            let left = tree.add(BoolExpr::Constant(true));
            let right = tree.add(BoolExpr::Constant(true));
            tree.add(BoolExpr::And { left, right })
        } else {
            and_chain(tree, conjuncts)
        };
        tree.set_root(root);
    }
}

/// Right-linked `And` chain over `items`, terminated by `TRUE`. No items gives `TRUE` itself.
pub fn and_chain(tree: &mut PredicateTree, items: Vec<NodeId>) -> NodeId {
    let mut chain = tree.add(BoolExpr::Constant(true));
    for left in items.into_iter().rev() {
        chain = tree.add(BoolExpr::And { left, right: chain });
    }
    chain
}

/// Right-linked `Or` chain over `items`, terminated by `FALSE`. No items gives `FALSE` itself.
pub fn or_chain(tree: &mut PredicateTree, items: Vec<NodeId>) -> NodeId {
    let mut chain = tree.add(BoolExpr::Constant(false));
    for left in items.into_iter().rev() {
        chain = tree.add(BoolExpr::Or { left, right: chain });
    }
    chain
}

/// Collect the operands of the `And` (`conjunctive`) or `Or` group rooted at `id`, each
/// already normalized.
fn flatten(tree: &mut PredicateTree, id: NodeId, conjunctive: bool, out: &mut Vec<NodeId>) {
    match tree.node(id).clone() {
        BoolExpr::And { left, right } if conjunctive => {
            flatten(tree, left, conjunctive, out);
            flatten(tree, right, conjunctive, out);
        }
        BoolExpr::Or { left, right } if !conjunctive => {
            flatten(tree, left, conjunctive, out);
            flatten(tree, right, conjunctive, out);
        }
        BoolExpr::Constant(value) if value == conjunctive => {}
        _ => {
            let normalized = normalize(tree, id);
            out.push(normalized);
        }
    }
}

fn normalize(tree: &mut PredicateTree, id: NodeId) -> NodeId {
    match tree.node(id).clone() {
        BoolExpr::And { .. } => {
            let mut items = Vec::new();
            flatten(tree, id, true, &mut items);
            and_chain(tree, items)
        }
        BoolExpr::Or { .. } => {
            let mut items = Vec::new();
            flatten(tree, id, false, &mut items);
            or_chain(tree, items)
        }
        BoolExpr::Not(operand) => {
            let operand = normalize(tree, operand);
            *tree.node_mut(id) = BoolExpr::Not(operand);
            id
        }
        _ => id,
    }
}

/// Whether the reachable part of `tree` is in chain form: the root is an `And`, no `And` has
/// an `And` as its left child and no `Or` has an `Or` as its left child.
pub fn is_cnf(tree: &PredicateTree) -> bool {
    if !tree.node(tree.root()).is_and() {
        return false;
    }
    let mut stack = vec![tree.root()];
    while let Some(id) = stack.pop() {
        match tree.node(id) {
            BoolExpr::And { left, right } => {
                if tree.node(*left).is_and() {
                    return false;
                }
                stack.push(*left);
                stack.push(*right);
            }
            BoolExpr::Or { left, right } => {
                if tree.node(*left).is_or() {
                    return false;
                }
                stack.push(*left);
                stack.push(*right);
            }
            BoolExpr::Not(operand) => stack.push(*operand),
            _ => {}
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use optx_core::expr::{ColumnRef, RelOp, ScalarValue};
    use optx_core::tree::Expr;

    fn leaf(name: &str, v: i64) -> Expr {
        Expr::compare(ColumnRef::new("t", name, 0), RelOp::Eq, ScalarValue::Int64(v))
    }

    #[test]
    fn test_left_deep_and_is_flattened() {
        let expr = Expr::and(Expr::and(leaf("a", 1), leaf("b", 2)), leaf("c", 3));
        let mut tree = PredicateTree::from_expr(&expr);
        ConjunctiveNormalForm.apply(&mut tree);
        assert!(is_cnf(&tree));
        assert_eq!(tree.conjuncts(tree.root()).len(), 3);
        assert_eq!(
            tree.to_string(),
            "(t.a = 1 AND (t.b = 2 AND (t.c = 3 AND TRUE)))"
        );
    }

    #[test]
    fn test_single_predicate_gets_wrapped() {
        let mut tree = PredicateTree::from_expr(&Expr::or(leaf("a", 1), leaf("a", 2)));
        ConjunctiveNormalForm.apply(&mut tree);
        assert_eq!(
            tree.to_string(),
            "((t.a = 1 OR (t.a = 2 OR FALSE)) AND TRUE)"
        );
    }

    #[test]
    fn test_neutral_constants_are_dropped() {
        let expr = Expr::and(
            Expr::constant(true),
            Expr::or(Expr::constant(false), leaf("a", 1)),
        );
        let mut tree = PredicateTree::from_expr(&expr);
        ConjunctiveNormalForm.apply(&mut tree);
        assert_eq!(tree.to_string(), "((t.a = 1 OR FALSE) AND TRUE)");

        let mut all_true = PredicateTree::from_expr(&Expr::constant(true));
        ConjunctiveNormalForm.apply(&mut all_true);
        assert!(is_cnf(&all_true));
        assert!(all_true.conjuncts(all_true.root()).iter().all(|&c| all_true.node(c).is_constant(true)));
    }

    #[test]
    fn test_is_cnf_rejects_left_nested_and() {
        let expr = Expr::and(Expr::and(leaf("a", 1), leaf("b", 2)), Expr::constant(true));
        let tree = PredicateTree::from_expr(&expr);
        assert!(!is_cnf(&tree));
    }
}
