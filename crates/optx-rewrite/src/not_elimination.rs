//! # NOT Elimination
//!
//! Pushes every `NOT` down to the leaves with De Morgan's laws and removes it there:
//!
//! ```text
//! NOT (a AND b)   ->  NOT a OR NOT b
//! NOT (a OR b)    ->  NOT a AND NOT b
//! NOT (x < 5)     ->  x >= 5
//! NOT (x IN (..)) ->  x NOT IN (..)
//! NOT TRUE        ->  FALSE
//! ```
//!
//! The walk carries a single "negate" flag instead of materializing intermediate `NOT` nodes,
//! and never descends into the operands of a comparison.

use optx_core::tree::{BoolExpr, NodeId, PredicateTree};

use crate::RewriteStage;

pub struct NotElimination;

impl RewriteStage for NotElimination {
    fn name(&self) -> &str {
        "NotElimination"
    }

    fn apply(&self, tree: &mut PredicateTree) {
        let root = tree.root();
        let root = eliminate(tree, root, false);
        tree.set_root(root);
    }
}

fn eliminate(tree: &mut PredicateTree, id: NodeId, negate: bool) -> NodeId {
    let rewritten = match tree.node(id).clone() {
        BoolExpr::Not(operand) => return eliminate(tree, operand, !negate),
        BoolExpr::And { left, right } => {
            let left = eliminate(tree, left, negate);
            let right = eliminate(tree, right, negate);
            if negate {
                BoolExpr::Or { left, right }
            } else {
                BoolExpr::And { left, right }
            }
        }
        BoolExpr::Or { left, right } => {
            let left = eliminate(tree, left, negate);
            let right = eliminate(tree, right, negate);
            if negate {
                BoolExpr::And { left, right }
            } else {
                BoolExpr::Or { left, right }
            }
        }
        BoolExpr::Compare { op, left, right } if negate => BoolExpr::Compare {
            op: op.negate(),
            left,
            right,
        },
        BoolExpr::InList {
            columns,
            values,
            negated,
        } if negate => BoolExpr::InList {
            columns,
            values,
            negated: !negated,
        },
        BoolExpr::Constant(value) => BoolExpr::Constant(value != negate),
        leaf => leaf,
    };
    *tree.node_mut(id) = rewritten;
    id
}
