//! # Bounded DNF to CNF Expansion
//!
//! A top-level conjunct that is a disjunction of conjunctions gives the estimator nothing it
//! can use: no single operand is restricted. Distributing the `Or` over the `And`s turns it
//! into a conjunction of disjunctions, some of which may restrict a single column:
//!
//! ```text
//! (a1 AND a2) OR (b1 AND b2)
//!   ->  (a1 OR b1) AND (a1 OR b2) AND (a2 OR b1) AND (a2 OR b2)
//! ```
//!
//! The number of derived disjunctions is the product of the conjunct counts, so expansion is
//! only done when that product is above one and at most `max_derived_predicates`. Larger
//! products stay in DNF.
//!
//! Every leaf placed into a derived disjunction is a fresh copy
//! ([`PredicateTree::clone_subtree`]), so no two derived predicates share nodes. If copying
//! fails (the arena hit its node limit) the expansion of that conjunct is abandoned and the
//! arena is truncated back to where it started; the original disjunction stays in place.
//!
//! Only conjuncts directly beneath the root `And` chain are considered. The stage expects
//! [`crate::cnf`] chain shape.

use tracing::debug;

use optx_core::error::RewriteError;
use optx_core::tree::{BoolExpr, NodeId, PredicateTree};

use crate::cnf::{and_chain, or_chain};
use crate::RewriteStage;

pub struct DnfToCnfExpansion {
    /// Most disjunctions a single expansion may derive.
    pub max_derived_predicates: usize,
}

impl DnfToCnfExpansion {
    pub fn new(max_derived_predicates: usize) -> Self {
        Self {
            max_derived_predicates,
        }
    }
}

impl RewriteStage for DnfToCnfExpansion {
    fn name(&self) -> &str {
        "DnfToCnfExpansion"
    }

    fn apply(&self, tree: &mut PredicateTree) {
        let root = tree.root();
        if !tree.node(root).is_and() {
            return;
        }

        let mut conjuncts = Vec::new();
        let mut expanded_any = false;
        for conjunct in tree.conjuncts(root) {
            if !tree.node(conjunct).is_or() {
                conjuncts.push(conjunct);
                continue;
            }

            let factors: Vec<Vec<NodeId>> = tree
                .disjuncts(conjunct)
                .into_iter()
                .map(|disjunct| tree.conjuncts(disjunct))
                .collect();
            let derived = factors
                .iter()
                .fold(1usize, |acc, f| acc.saturating_mul(f.len()));
            if derived <= 1 {
                conjuncts.push(conjunct);
                continue;
            }
            if derived > self.max_derived_predicates {
                debug!(
                    derived,
                    max = self.max_derived_predicates,
                    "DNF expansion skipped, over budget"
                );
                conjuncts.push(conjunct);
                continue;
            }

            let mark = tree.mark();
            match expand(tree, &factors) {
                Ok(disjunctions) => {
                    debug!(derived = disjunctions.len(), "DNF expanded to CNF");
                    conjuncts.extend(disjunctions);
                    expanded_any = true;
                }
                Err(e) => {
                    debug!(error = %e, "DNF expansion abandoned, keeping original");
                    tree.truncate(mark);
                    conjuncts.push(conjunct);
                }
            }
        }

        if expanded_any {
            let root = and_chain(tree, conjuncts);
            tree.set_root(root);
        }
    }
}

/// One disjunction per combination of one conjunct from each factor, in lexicographic
/// order of the factors.
fn expand(tree: &mut PredicateTree, factors: &[Vec<NodeId>]) -> Result<Vec<NodeId>, RewriteError> {
    if factors.iter().any(Vec::is_empty) {
        return Ok(Vec::new());
    }
    let mut disjunctions = Vec::new();
    let mut picks = vec![0usize; factors.len()];
    loop {
        let mut items = Vec::with_capacity(factors.len());
        for (factor, &pick) in factors.iter().zip(&picks) {
            let copy = tree.clone_subtree(factor[pick])?;
            if tree.node(copy).is_or() {
                items.extend(tree.disjuncts(copy));
            } else {
                items.push(copy);
            }
        }
        disjunctions.push(or_chain(tree, items));

        // Advance the rightmost pick that still has room, resetting the ones after it.
        let mut position = factors.len();
        loop {
            if position == 0 {
                return Ok(disjunctions);
            }
            position -= 1;
            picks[position] += 1;
            if picks[position] < factors[position].len() {
                break;
            }
            picks[position] = 0;
        }
    }
}
