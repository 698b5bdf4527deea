//! # Optimizer Configuration
//!
//! Every tunable the estimator and the rewriter read is threaded in explicitly through
//! `OptimizerConfig`; nothing is looked up from a global compilation context. The struct
//! deserializes from JSON with every field optional, so a config file only has to name the
//! knobs it changes.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ConfigError;
use crate::stats::{DEFAULT_EQUALITY_SELECTIVITY, DEFAULT_RANGE_SELECTIVITY};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Selectivity of a predicate that cannot be reduced to a range.
    pub default_predicate_factor: f64,
    /// Null fraction assumed for `IS [NOT] NULL` on an operand without statistics.
    pub default_null_fraction: f64,
    /// Equality selectivity assumed for an operand without statistics.
    pub default_equality_selectivity: f64,
    /// Range selectivity assumed for an operand without statistics or a non-numeric range.
    pub default_range_selectivity: f64,
    /// Upper bound on the number of disjunctions a DNF->CNF expansion may derive.
    pub max_derived_cnf_predicates: usize,
    /// Upper bound on the number of nodes a predicate tree may grow to while being rewritten.
    pub max_predicate_tree_nodes: usize,

    /// Rows fetched per remote lookup batch.
    pub index_lookup_batch_row_count: usize,
    /// Lookup batches in flight at once.
    pub index_lookup_concurrent_batches_count: usize,
    pub oltp_index_lookup_cost_per_row: f64,
    pub olap_index_lookup_cost_per_row: f64,
    /// Fixed surcharge for starting a lookup on the OLAP engine.
    pub olap_index_lookup_startup_cost: f64,
    /// Latency of opening a lookup scanner, charged per batch.
    pub index_lookup_open_latency: f64,
    /// Latency of closing a lookup scanner, charged per batch.
    pub index_lookup_close_latency: f64,

    /// Local CPU cost of reading one row during the scan.
    pub scan_cost_per_row: f64,
    /// Cost of shipping one byte from the storage node.
    pub remote_cost_per_byte: f64,
    /// Cost of evaluating projection-phase qualifiers on one row.
    pub projection_cost_per_row: f64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            default_predicate_factor: 0.5,
            default_null_fraction: 0.1,
            default_equality_selectivity: DEFAULT_EQUALITY_SELECTIVITY,
            default_range_selectivity: DEFAULT_RANGE_SELECTIVITY,
            max_derived_cnf_predicates: 100,
            max_predicate_tree_nodes: 1 << 20,
            index_lookup_batch_row_count: 4000,
            index_lookup_concurrent_batches_count: 2,
            oltp_index_lookup_cost_per_row: 125.0,
            olap_index_lookup_cost_per_row: 12.5,
            olap_index_lookup_startup_cost: 30_000.0,
            index_lookup_open_latency: 0.0,
            index_lookup_close_latency: 0.0,
            scan_cost_per_row: 1.0,
            remote_cost_per_byte: 0.02,
            projection_cost_per_row: 0.5,
        }
    }
}

impl OptimizerConfig {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the cost formulas cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.default_predicate_factor) {
            return Err(ConfigError::Invalid(format!(
                "default_predicate_factor must be in [0, 1], got {}",
                self.default_predicate_factor
            )));
        }
        let fractions = [
            ("default_null_fraction", self.default_null_fraction),
            ("default_equality_selectivity", self.default_equality_selectivity),
            ("default_range_selectivity", self.default_range_selectivity),
        ];
        for (name, value) in fractions {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!(
                    "{} must be in [0, 1], got {}",
                    name, value
                )));
            }
        }
        if self.index_lookup_batch_row_count == 0 {
            return Err(ConfigError::Invalid(
                "index_lookup_batch_row_count must be positive".into(),
            ));
        }
        if self.index_lookup_concurrent_batches_count == 0 {
            return Err(ConfigError::Invalid(
                "index_lookup_concurrent_batches_count must be positive".into(),
            ));
        }
        if self.max_predicate_tree_nodes == 0 {
            return Err(ConfigError::Invalid(
                "max_predicate_tree_nodes must be positive".into(),
            ));
        }
        let costs = [
            ("oltp_index_lookup_cost_per_row", self.oltp_index_lookup_cost_per_row),
            ("olap_index_lookup_cost_per_row", self.olap_index_lookup_cost_per_row),
            ("olap_index_lookup_startup_cost", self.olap_index_lookup_startup_cost),
            ("index_lookup_open_latency", self.index_lookup_open_latency),
            ("index_lookup_close_latency", self.index_lookup_close_latency),
            ("scan_cost_per_row", self.scan_cost_per_row),
            ("remote_cost_per_byte", self.remote_cost_per_byte),
            ("projection_cost_per_row", self.projection_cost_per_row),
        ];
        for (name, value) in costs {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "{} must be a non-negative number, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}
