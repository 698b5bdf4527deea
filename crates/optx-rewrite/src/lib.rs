//! # Boolean Normal-Form Rewriting
//!
//! This crate normalizes predicate trees into the shape the selectivity estimator can combine:
//! a right-linked conjunction of predicates, each either a single comparison, an IN-list or a
//! right-linked disjunction.
//!
//! ## Stages
//!
//! `BooleanRewriter::normalize` runs these stages in order:
//!
//! - **`NotElimination`**: pushes `NOT` down to the leaves and removes it.
//! - **`ConjunctiveNormalForm`**: flattens `And`/`Or` groups into terminated chains.
//! - **`OrToInList`**: turns disjunctions of equalities on the same column(s) into IN-lists.
//! - **`DnfToCnfExpansion`**: distributes top-level disjunctions of conjunctions, within a
//!   budget on the number of derived predicates.
//!
//! Each stage is total: a rewrite that does not apply (or fails, in the case of expansion)
//! leaves the tree as it found it. The result always satisfies [`cnf::is_cnf`].

pub mod cnf;
pub mod dnf_expansion;
pub mod in_list;
pub mod not_elimination;

use optx_core::config::OptimizerConfig;
use optx_core::tree::PredicateTree;
use tracing::trace;

/// One step of the normalization pipeline.
pub trait RewriteStage: Send + Sync {
    fn name(&self) -> &str;

    fn apply(&self, tree: &mut PredicateTree);
}

/// Normalizes predicate trees. Holds no per-tree state and can be shared between
/// compilations.
pub struct BooleanRewriter {
    stages: Vec<Box<dyn RewriteStage>>,
    max_tree_nodes: usize,
}

impl BooleanRewriter {
    /// A rewriter whose DNF expansion derives at most `max_derived_cnf_predicates`
    /// disjunctions per conjunct.
    pub fn new(max_derived_cnf_predicates: usize) -> Self {
        let defaults = OptimizerConfig::default();
        Self::from_config(&OptimizerConfig {
            max_derived_cnf_predicates,
            ..defaults
        })
    }

    pub fn from_config(config: &OptimizerConfig) -> Self {
        let stages: Vec<Box<dyn RewriteStage>> = vec![
            Box::new(not_elimination::NotElimination),
            Box::new(cnf::ConjunctiveNormalForm),
            Box::new(in_list::OrToInList),
            Box::new(dnf_expansion::DnfToCnfExpansion::new(
                config.max_derived_cnf_predicates,
            )),
        ];
        Self {
            stages,
            max_tree_nodes: config.max_predicate_tree_nodes,
        }
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Rewrite `tree` into conjunctive normal form, converting OR chains to IN-lists and
    /// expanding DNF conjuncts where eligible. Unreachable nodes are dropped from the result.
    ///
    /// The tree's own node limit is kept if it is tighter than the configured one.
    pub fn normalize(&self, tree: PredicateTree) -> PredicateTree {
        let limit = tree.node_limit().min(self.max_tree_nodes);
        let mut tree = tree.with_node_limit(limit);
        for stage in &self.stages {
            stage.apply(&mut tree);
            trace!(stage = stage.name(), nodes = tree.len(), tree = %tree, "rewrite stage applied");
        }
        tree.compact();
        tree
    }
}

impl Default for BooleanRewriter {
    fn default() -> Self {
        Self::from_config(&OptimizerConfig::default())
    }
}
