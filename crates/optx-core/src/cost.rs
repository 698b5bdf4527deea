//! # Cost Model
//!
//! Costs are plain additive numbers: the cost of an access path is the sum of scanning the
//! qualifying key range, looking up base rows for a non-covering index and evaluating the
//! projection-phase qualifiers. `Cost` is what callers compare; the components stay visible in
//! [`crate::scan::AccessPathCost`].
//!
//! ## Batched Lookups
//!
//! A non-covering index has to fetch every surviving row from the base table. Rows are sent
//! to the storage nodes in batches of `index_lookup_batch_row_count`, with up to
//! `index_lookup_concurrent_batches_count` batches in flight, so fixed per-call overhead is
//! amortized and batches beyond the concurrency limit serialize:
//!
//! ```text
//! whole_batches  = floor(rows / batch_rows)
//! one_batch_cost = batch_rows * per_row + open + close
//! serial_batches = max(whole_batches / concurrent_batches, 1)
//! ```
//!
//! When `serial_batches` comes out whole, the leftover `rows mod batch_rows` rows form one more
//! batch that is charged on its own. Otherwise the last, partially filled serial group already
//! carries the leftover rows and `serial_batches` is rounded up instead.
//!
//! The OLAP engine (and a single-row lookup) does not batch: it pays per row, plus a fixed
//! startup surcharge on OLAP.

use serde::{Deserialize, Serialize};

use crate::config::OptimizerConfig;

/// Cost is a single comparable value representing the estimated expense of an access path.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Cost {
    /// The total cost. Lower is better. `f64::MAX` represents infinity.
    pub total: f64,
}

impl Cost {
    pub fn zero() -> Self {
        Self { total: 0.0 }
    }

    pub fn new(total: f64) -> Self {
        Self { total }
    }

    pub fn infinite() -> Self {
        Self { total: f64::MAX }
    }

    pub fn is_infinite(&self) -> bool {
        self.total == f64::MAX
    }
}

impl std::ops::Add for Cost {
    type Output = Cost;

    fn add(self, rhs: Cost) -> Cost {
        if self.is_infinite() || rhs.is_infinite() {
            return Cost::infinite();
        }
        Cost::new(self.total + rhs.total)
    }
}

/// Epsilon-based equality to handle floating-point imprecision in cost comparisons.
impl PartialEq for Cost {
    fn eq(&self, other: &Self) -> bool {
        (self.total - other.total).abs() < f64::EPSILON
    }
}

impl PartialOrd for Cost {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        self.total.partial_cmp(&other.total)
    }
}

/// Trait for pluggable lookup cost models.
pub trait LookupCostModel: Send + Sync {
    /// Cost of fetching `rows` base rows through a non-covering index.
    fn lookup_cost(&self, rows: f64, open_latency: f64, close_latency: f64, is_olap: bool) -> Cost;
}

/// The batched remote-lookup model described at the top of this module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchedLookupCost {
    pub batch_row_count: usize,
    pub concurrent_batches_count: usize,
    pub oltp_cost_per_row: f64,
    pub olap_cost_per_row: f64,
    pub olap_startup_cost: f64,
}

impl BatchedLookupCost {
    pub fn from_config(config: &OptimizerConfig) -> Self {
        Self {
            batch_row_count: config.index_lookup_batch_row_count,
            concurrent_batches_count: config.index_lookup_concurrent_batches_count,
            oltp_cost_per_row: config.oltp_index_lookup_cost_per_row,
            olap_cost_per_row: config.olap_index_lookup_cost_per_row,
            olap_startup_cost: config.olap_index_lookup_startup_cost,
        }
    }
}

impl Default for BatchedLookupCost {
    fn default() -> Self {
        Self::from_config(&OptimizerConfig::default())
    }
}

impl LookupCostModel for BatchedLookupCost {
    fn lookup_cost(&self, rows: f64, open_latency: f64, close_latency: f64, is_olap: bool) -> Cost {
        if rows <= 0.0 {
            return Cost::zero();
        }
        let fixed = open_latency + close_latency;

        if is_olap || rows == 1.0 {
            let (per_row, startup) = if is_olap {
                (self.olap_cost_per_row, self.olap_startup_cost)
            } else {
                (self.oltp_cost_per_row, 0.0)
            };
            return Cost::new(rows * per_row + fixed + startup);
        }

        let per_row = self.oltp_cost_per_row;
        let batch_rows = self.batch_row_count.max(1) as f64;
        let concurrency = self.concurrent_batches_count.max(1) as f64;

        let whole_batches = (rows / batch_rows).floor();
        if whole_batches == 0.0 {
            // Fewer rows than one batch: a single partial call.
            return Cost::new(rows * per_row + fixed);
        }

        let one_batch_cost = batch_rows * per_row + fixed;
        let serial_batches = (whole_batches / concurrency).max(1.0);
        if serial_batches.fract() == 0.0 {
            let leftover = rows - whole_batches * batch_rows;
            let leftover_cost = if leftover > 0.0 {
                leftover * per_row + fixed
            } else {
                0.0
            };
            Cost::new(serial_batches * one_batch_cost + leftover_cost)
        } else {
            Cost::new(serial_batches.ceil() * one_batch_cost)
        }
    }
}
