//! # Predicate Trees
//!
//! Boolean predicate trees are stored in an arena: every node lives in one `Vec` owned by the
//! `PredicateTree` and children are referenced by `NodeId`. A node is owned by exactly one
//! parent, so rewriting in place never has to reason about aliasing. When a rewrite needs a leaf
//! in more than one place (the DNF->CNF cross product does), it asks for an explicit copy with
//! [`PredicateTree::clone_subtree`].
//!
//! Rewrites only ever append nodes. Nodes that become unreachable stay in the arena until
//! [`PredicateTree::compact`] drops them, which also lets a failed rewrite roll back by
//! truncating the arena to a [`PredicateTree::mark`] taken before it started.
//!
//! ## Nested Form
//!
//! `Expr` is the nested, boxed form of the same tree. It is what tests and the HTTP service
//! build and read; `from_expr` and `to_expr` convert between the two.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::RewriteError;
use crate::expr::{ColumnRef, RelOp, ScalarValue};

/// Index of a node in a `PredicateTree`.
pub type NodeId = u32;

const DEFAULT_MAX_NODES: usize = 1 << 20;

/// One side of a comparison leaf.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operand {
    Column(ColumnRef),
    Literal(ScalarValue),
}

impl Operand {
    pub fn as_column(&self) -> Option<&ColumnRef> {
        match self {
            Operand::Column(c) => Some(c),
            Operand::Literal(_) => None,
        }
    }

    pub fn as_literal(&self) -> Option<&ScalarValue> {
        match self {
            Operand::Literal(v) => Some(v),
            Operand::Column(_) => None,
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Column(c) => write!(f, "{}", c),
            Operand::Literal(v) => write!(f, "{}", v),
        }
    }
}

/// A node of the arena.
#[derive(Debug, Clone, PartialEq)]
pub enum BoolExpr {
    And { left: NodeId, right: NodeId },
    Or { left: NodeId, right: NodeId },
    Not(NodeId),
    /// `left OP right`; `right` is `None` for `IS [NOT] NULL`.
    Compare {
        op: RelOp,
        left: Operand,
        right: Option<Operand>,
    },
    /// `(c1, .., cn) [NOT] IN ((v11, .., v1n), ..)`. Every row has one value per column.
    InList {
        columns: Vec<ColumnRef>,
        values: Vec<Vec<ScalarValue>>,
        negated: bool,
    },
    Constant(bool),
}

impl BoolExpr {
    pub fn is_and(&self) -> bool {
        matches!(self, BoolExpr::And { .. })
    }

    pub fn is_or(&self) -> bool {
        matches!(self, BoolExpr::Or { .. })
    }

    pub fn is_constant(&self, value: bool) -> bool {
        matches!(self, BoolExpr::Constant(v) if *v == value)
    }

    fn children(&self) -> Vec<NodeId> {
        match self {
            BoolExpr::And { left, right } | BoolExpr::Or { left, right } => vec![*left, *right],
            BoolExpr::Not(operand) => vec![*operand],
            _ => vec![],
        }
    }
}

/// Nested form of a predicate tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Expr {
    And {
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Or {
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Not {
        operand: Box<Expr>,
    },
    Compare {
        op: RelOp,
        left: Operand,
        #[serde(default)]
        right: Option<Operand>,
    },
    InList {
        columns: Vec<ColumnRef>,
        values: Vec<Vec<ScalarValue>>,
        #[serde(default)]
        negated: bool,
    },
    Constant {
        value: bool,
    },
}

impl Expr {
    pub fn and(left: Expr, right: Expr) -> Self {
        Expr::And {
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn or(left: Expr, right: Expr) -> Self {
        Expr::Or {
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn not(operand: Expr) -> Self {
        Expr::Not {
            operand: Box::new(operand),
        }
    }

    /// `column OP literal`.
    pub fn compare(column: ColumnRef, op: RelOp, value: ScalarValue) -> Self {
        Expr::Compare {
            op,
            left: Operand::Column(column),
            right: Some(Operand::Literal(value)),
        }
    }

    pub fn constant(value: bool) -> Self {
        Expr::Constant { value }
    }

    /// Left-deep conjunction of `exprs`; `TRUE` when empty.
    pub fn conjunction(exprs: impl IntoIterator<Item = Expr>) -> Self {
        exprs
            .into_iter()
            .reduce(Expr::and)
            .unwrap_or(Expr::Constant { value: true })
    }

    /// Left-deep disjunction of `exprs`; `FALSE` when empty.
    pub fn disjunction(exprs: impl IntoIterator<Item = Expr>) -> Self {
        exprs
            .into_iter()
            .reduce(Expr::or)
            .unwrap_or(Expr::Constant { value: false })
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::And { left, right } => write!(f, "({} AND {})", left, right),
            Expr::Or { left, right } => write!(f, "({} OR {})", left, right),
            Expr::Not { operand } => write!(f, "NOT {}", operand),
            Expr::Compare { op, left, right } => match right {
                Some(right) => write!(f, "{} {} {}", left, op, right),
                None => write!(f, "{} {}", left, op),
            },
            Expr::InList {
                columns,
                values,
                negated,
            } => {
                let not = if *negated { " NOT" } else { "" };
                let rows: Vec<String> = values
                    .iter()
                    .map(|row| {
                        let items: Vec<String> = row.iter().map(|v| v.to_string()).collect();
                        if row.len() == 1 {
                            items.join(", ")
                        } else {
                            format!("({})", items.join(", "))
                        }
                    })
                    .collect();
                let cols: Vec<String> = columns.iter().map(|c| c.to_string()).collect();
                if cols.len() == 1 {
                    write!(f, "{}{} IN ({})", cols[0], not, rows.join(", "))
                } else {
                    write!(f, "({}){} IN ({})", cols.join(", "), not, rows.join(", "))
                }
            }
            Expr::Constant { value } => write!(f, "{}", if *value { "TRUE" } else { "FALSE" }),
        }
    }
}

/// Arena-backed boolean predicate tree.
#[derive(Debug, Clone, PartialEq)]
pub struct PredicateTree {
    nodes: Vec<BoolExpr>,
    root: NodeId,
    max_nodes: usize,
}

impl PredicateTree {
    /// A tree holding the single constant `TRUE`.
    pub fn new() -> Self {
        Self {
            nodes: vec![BoolExpr::Constant(true)],
            root: 0,
            max_nodes: DEFAULT_MAX_NODES,
        }
    }

    pub fn from_expr(expr: &Expr) -> Self {
        let mut tree = Self {
            nodes: Vec::new(),
            root: 0,
            max_nodes: DEFAULT_MAX_NODES,
        };
        tree.root = tree.add_expr(expr);
        tree
    }

    /// Limit the number of nodes `clone_subtree` may grow the arena to.
    pub fn with_node_limit(mut self, max_nodes: usize) -> Self {
        self.max_nodes = max_nodes;
        self
    }

    pub fn node_limit(&self) -> usize {
        self.max_nodes
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn set_root(&mut self, root: NodeId) {
        self.root = root;
    }

    pub fn node(&self, id: NodeId) -> &BoolExpr {
        &self.nodes[id as usize]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut BoolExpr {
        &mut self.nodes[id as usize]
    }

    pub fn get(&self, id: NodeId) -> Option<&BoolExpr> {
        self.nodes.get(id as usize)
    }

    /// Number of nodes in the arena, reachable or not.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn add(&mut self, expr: BoolExpr) -> NodeId {
        let id = self.nodes.len() as NodeId;
        self.nodes.push(expr);
        id
    }

    pub fn add_expr(&mut self, expr: &Expr) -> NodeId {
        let node = match expr {
            Expr::And { left, right } => {
                let left = self.add_expr(left);
                let right = self.add_expr(right);
                BoolExpr::And { left, right }
            }
            Expr::Or { left, right } => {
                let left = self.add_expr(left);
                let right = self.add_expr(right);
                BoolExpr::Or { left, right }
            }
            Expr::Not { operand } => BoolExpr::Not(self.add_expr(operand)),
            Expr::Compare { op, left, right } => BoolExpr::Compare {
                op: *op,
                left: left.clone(),
                right: right.clone(),
            },
            Expr::InList {
                columns,
                values,
                negated,
            } => BoolExpr::InList {
                columns: columns.clone(),
                values: values.clone(),
                negated: *negated,
            },
            Expr::Constant { value } => BoolExpr::Constant(*value),
        };
        self.add(node)
    }

    pub fn to_expr(&self) -> Expr {
        self.subtree_expr(self.root)
    }

    pub fn subtree_expr(&self, id: NodeId) -> Expr {
        match self.node(id) {
            BoolExpr::And { left, right } => {
                Expr::and(self.subtree_expr(*left), self.subtree_expr(*right))
            }
            BoolExpr::Or { left, right } => {
                Expr::or(self.subtree_expr(*left), self.subtree_expr(*right))
            }
            BoolExpr::Not(operand) => Expr::not(self.subtree_expr(*operand)),
            BoolExpr::Compare { op, left, right } => Expr::Compare {
                op: *op,
                left: left.clone(),
                right: right.clone(),
            },
            BoolExpr::InList {
                columns,
                values,
                negated,
            } => Expr::InList {
                columns: columns.clone(),
                values: values.clone(),
                negated: *negated,
            },
            BoolExpr::Constant(value) => Expr::Constant { value: *value },
        }
    }

    /// Current arena length, to roll back to with [`PredicateTree::truncate`].
    pub fn mark(&self) -> usize {
        self.nodes.len()
    }

    /// Drop every node appended after `mark`. Nodes older than the mark must not reference
    /// them; rewrites guarantee this by linking new nodes in only after they fully succeed.
    pub fn truncate(&mut self, mark: usize) {
        self.nodes.truncate(mark);
    }

    /// Number of nodes reachable from `id`.
    pub fn subtree_size(&self, id: NodeId) -> Result<usize, RewriteError> {
        let mut size = 0;
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            let node = self.get(next).ok_or(RewriteError::DanglingNode(next))?;
            size += 1;
            stack.extend(node.children());
        }
        Ok(size)
    }

    /// Deep-copy the subtree rooted at `id`, giving every node (and every column reference in
    /// its leaves) a new, independent identity.
    pub fn clone_subtree(&mut self, id: NodeId) -> Result<NodeId, RewriteError> {
        let size = self.subtree_size(id)?;
        if self.nodes.len() + size > self.max_nodes {
            return Err(RewriteError::NodeLimitExceeded(self.max_nodes));
        }
        Ok(self.copy_node(id))
    }

    fn copy_node(&mut self, id: NodeId) -> NodeId {
        let copy = match self.node(id).clone() {
            BoolExpr::And { left, right } => {
                let left = self.copy_node(left);
                let right = self.copy_node(right);
                BoolExpr::And { left, right }
            }
            BoolExpr::Or { left, right } => {
                let left = self.copy_node(left);
                let right = self.copy_node(right);
                BoolExpr::Or { left, right }
            }
            BoolExpr::Not(operand) => BoolExpr::Not(self.copy_node(operand)),
            leaf => leaf,
        };
        self.add(copy)
    }

    /// Rebuild the arena with only the nodes reachable from the root.
    pub fn compact(&mut self) {
        let mut nodes = Vec::with_capacity(self.nodes.len());
        let root = self.compact_into(self.root, &mut nodes);
        self.nodes = nodes;
        self.root = root;
    }

    fn compact_into(&self, id: NodeId, out: &mut Vec<BoolExpr>) -> NodeId {
        let node = match self.node(id) {
            BoolExpr::And { left, right } => BoolExpr::And {
                left: self.compact_into(*left, out),
                right: self.compact_into(*right, out),
            },
            BoolExpr::Or { left, right } => BoolExpr::Or {
                left: self.compact_into(*left, out),
                right: self.compact_into(*right, out),
            },
            BoolExpr::Not(operand) => BoolExpr::Not(self.compact_into(*operand, out)),
            leaf => leaf.clone(),
        };
        out.push(node);
        (out.len() - 1) as NodeId
    }

    /// Left children of the right-linked `And` chain starting at `id`, without the `TRUE`
    /// terminator. A node that is not an `And` is a chain of one.
    pub fn conjuncts(&self, id: NodeId) -> Vec<NodeId> {
        self.chain(id, true)
    }

    /// Left children of the right-linked `Or` chain starting at `id`, without the `FALSE`
    /// terminator.
    pub fn disjuncts(&self, id: NodeId) -> Vec<NodeId> {
        self.chain(id, false)
    }

    fn chain(&self, id: NodeId, conjunctive: bool) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut current = id;
        loop {
            match (self.node(current), conjunctive) {
                (BoolExpr::And { left, right }, true) | (BoolExpr::Or { left, right }, false) => {
                    out.push(*left);
                    current = *right;
                }
                (BoolExpr::Constant(v), _) if *v == conjunctive => break,
                _ => {
                    out.push(current);
                    break;
                }
            }
        }
        out
    }
}

impl Default for PredicateTree {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PredicateTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_expr())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(name: &str) -> ColumnRef {
        ColumnRef::new("t", name, 0)
    }

    fn sample() -> Expr {
        Expr::and(
            Expr::compare(col("a"), RelOp::Eq, ScalarValue::Int64(1)),
            Expr::or(
                Expr::compare(col("b"), RelOp::Lt, ScalarValue::Int64(2)),
                Expr::constant(false),
            ),
        )
    }

    #[test]
    fn test_expr_round_trip() {
        let tree = PredicateTree::from_expr(&sample());
        assert_eq!(tree.to_expr(), sample());
        assert_eq!(tree.to_string(), "(t.a = 1 AND (t.b < 2 OR FALSE))");
    }

    #[test]
    fn test_clone_subtree_is_independent() {
        let mut tree = PredicateTree::from_expr(&sample());
        let root = tree.root();
        let copy = tree.clone_subtree(root).unwrap();
        assert_ne!(copy, root);
        assert_eq!(tree.subtree_expr(copy), sample());
        if let BoolExpr::And { left, .. } = tree.node(copy).clone() {
            *tree.node_mut(left) = BoolExpr::Constant(true);
        }
        assert_eq!(tree.to_expr(), sample());
    }

    #[test]
    fn test_clone_subtree_respects_node_limit() {
        let mut tree = PredicateTree::from_expr(&sample());
        let limit = tree.len() + 2;
        let mut tree = std::mem::take(&mut tree).with_node_limit(limit);
        let root = tree.root();
        assert_eq!(
            tree.clone_subtree(root),
            Err(RewriteError::NodeLimitExceeded(limit))
        );
        assert_eq!(tree.clone_subtree(999), Err(RewriteError::DanglingNode(999)));
    }

    #[test]
    fn test_compact_drops_unreachable_nodes() {
        let mut tree = PredicateTree::from_expr(&sample());
        let before = tree.len();
        let root = tree.root();
        tree.clone_subtree(root).unwrap();
        assert_eq!(tree.len(), before * 2);
        tree.compact();
        assert_eq!(tree.len(), before);
        assert_eq!(tree.to_expr(), sample());
    }

    #[test]
    fn test_chains_skip_terminators() {
        let tree = PredicateTree::from_expr(&sample());
        let conjuncts = tree.conjuncts(tree.root());
        assert_eq!(conjuncts.len(), 2);
        assert_eq!(tree.disjuncts(conjuncts[1]).len(), 1);
    }
}
