//! # Scan Cost Estimation
//!
//! A [`ScanCostEstimator`] is created fresh for every candidate access path. Predicates are
//! fed in one at a time with the phase they are evaluated in; each becomes a
//! [`SelectivityEstimate`] filed under its operand's slot in one of two lists:
//!
//! - the **scan** list (`Base` and `FilterBase` qualifiers, applied while reading the index),
//! - the **top** list (`FilterProjection` qualifiers, applied after the base-row lookup).
//!
//! ## Classification
//!
//! Comparisons against a constant and `BETWEEN` with constant bounds become ranges, merged
//! with what is already recorded for the same operand and qualifier phase:
//!
//! | Operator   | Effect                                                                 |
//! |------------|------------------------------------------------------------------------|
//! | `=`        | new point range `[v, v]`                                               |
//! | `<>`       | absorbed by an open-ended range whose edge it sits on, else `NotEquals`|
//! | `>`, `>=`  | fills the start of a range without one, else absorbs a `NotEquals`     |
//! | `<`, `<=`  | symmetric on the stop bound                                            |
//! | `BETWEEN`  | new inclusive range                                                    |
//!
//! `IS [NOT] NULL` becomes a null estimate. Everything else (non-constant comparison values,
//! LIKE, predicates with no operand) becomes a default estimate.
//!
//! ## Composition and Cost
//!
//! Selectivities are composed with [`compose_selectivity`], skipping join-only predicates
//! unless the enclosing join is a nested loop. [`ScanCostEstimator::estimate_cost`] turns the
//! per-phase selectivities into row counts and prices scanning, lookup and projection.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use tracing::{debug, trace};

use crate::config::OptimizerConfig;
use crate::cost::{BatchedLookupCost, Cost, LookupCostModel};
use crate::error::EstimationError;
use crate::expr::{
    JoinStrategy, OperandRef, Phase, Predicate, PredicateKind, QualifierPhase, RelOp, ScalarValue,
};
use crate::selectivity::{compose_selectivity, EstimateKind, RangeEstimate, SelectivityEstimate};
use crate::stats::StatisticsProvider;

/// Descriptor of the access path being costed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessPath {
    /// Table or index name, for diagnostics.
    pub name: String,
    /// The index supplies every column the query needs; no base-row lookup.
    #[serde(default = "default_covering")]
    pub covering: bool,
    /// Executed by the OLAP engine rather than the OLTP one.
    #[serde(default)]
    pub is_olap: bool,
    /// Join algorithm when this path is the inner side of a join.
    #[serde(default)]
    pub join_strategy: Option<JoinStrategy>,
    /// Operands whose ranges may be estimated beyond the observed min/max.
    #[serde(default)]
    pub extrapolated: HashSet<OperandRef>,
    /// Average width of a scanned row in bytes.
    #[serde(default = "default_row_width")]
    pub row_width_bytes: f64,
}

fn default_covering() -> bool {
    true
}

fn default_row_width() -> f64 {
    100.0
}

impl AccessPath {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            covering: default_covering(),
            is_olap: false,
            join_strategy: None,
            extrapolated: HashSet::new(),
            row_width_bytes: default_row_width(),
        }
    }

    pub fn non_covering(mut self) -> Self {
        self.covering = false;
        self
    }

    pub fn olap(mut self) -> Self {
        self.is_olap = true;
        self
    }

    pub fn with_join_strategy(mut self, strategy: JoinStrategy) -> Self {
        self.join_strategy = Some(strategy);
        self
    }

    pub fn with_extrapolation(mut self, operand: OperandRef) -> Self {
        self.extrapolated.insert(operand);
        self
    }

    pub fn with_row_width(mut self, bytes: f64) -> Self {
        self.row_width_bytes = bytes;
        self
    }
}

/// Row counts and cost components of one access path.
#[derive(Debug, Clone, Serialize)]
pub struct AccessPathCost {
    /// Rows read from the key range (`Base` qualifiers).
    pub scanned_rows: f64,
    /// Rows left after the scan-phase filter (`Base` and `FilterBase`).
    pub filtered_rows: f64,
    /// Rows left after every qualifier.
    pub output_rows: f64,
    pub scan_cost: f64,
    pub lookup_cost: f64,
    pub projection_cost: f64,
}

impl AccessPathCost {
    pub fn total(&self) -> Cost {
        Cost::new(self.scan_cost) + Cost::new(self.lookup_cost) + Cost::new(self.projection_cost)
    }
}

type ColumnEstimates = BTreeMap<usize, Vec<SelectivityEstimate>>;

/// Accumulates predicate estimates for one access path and prices it.
pub struct ScanCostEstimator {
    access_path: AccessPath,
    stats: Arc<dyn StatisticsProvider>,
    config: OptimizerConfig,
    lookup_model: BatchedLookupCost,
    scan_estimates: ColumnEstimates,
    top_estimates: ColumnEstimates,
    missing_statistics: BTreeSet<OperandRef>,
}

impl ScanCostEstimator {
    pub fn new(
        access_path: AccessPath,
        stats: Arc<dyn StatisticsProvider>,
        config: OptimizerConfig,
    ) -> Self {
        let lookup_model = BatchedLookupCost::from_config(&config);
        Self {
            access_path,
            stats,
            config,
            lookup_model,
            scan_estimates: ColumnEstimates::new(),
            top_estimates: ColumnEstimates::new(),
            missing_statistics: BTreeSet::new(),
        }
    }

    pub fn access_path(&self) -> &AccessPath {
        &self.access_path
    }

    /// Operands that were estimated without real statistics.
    pub fn missing_statistics(&self) -> &BTreeSet<OperandRef> {
        &self.missing_statistics
    }

    /// Estimates recorded for one slot in one phase.
    pub fn column_estimates(&self, phase: Phase, slot: usize) -> &[SelectivityEstimate] {
        self.estimates_for(phase)
            .get(&slot)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Every recorded estimate of one phase, by ascending slot.
    pub fn estimates(&self, phase: Phase) -> impl Iterator<Item = &SelectivityEstimate> {
        self.estimates_for(phase).values().flatten()
    }

    /// Classify `predicate` and record its estimate.
    ///
    /// Fails only on a predicate the classifier cannot make sense of (a non-comparison
    /// operator where a comparison was promised); the access path should then be abandoned.
    pub fn add_predicate(
        &mut self,
        predicate: &Predicate,
        qualifier_phase: QualifierPhase,
    ) -> Result<(), EstimationError> {
        if let Some(operand) = predicate.operand {
            if !self.stats.has_real_statistics(operand) && self.missing_statistics.insert(operand)
            {
                debug!(
                    access_path = %self.access_path.name,
                    %operand,
                    "operand used without statistics"
                );
            }
        }

        let estimate = match (predicate.operand, &predicate.kind) {
            (Some(operand), PredicateKind::Compare { op: RelOp::IsNull, .. }) => {
                Some(self.estimate(Some(operand), qualifier_phase, predicate, EstimateKind::Null))
            }
            (Some(operand), PredicateKind::Compare { op: RelOp::IsNotNull, .. }) => Some(
                self.estimate(Some(operand), qualifier_phase, predicate, EstimateKind::NotNull),
            ),
            (Some(operand), PredicateKind::Compare { op, value: Some(value) })
                if !value.is_null() =>
            {
                self.add_comparison(operand, *op, value, qualifier_phase, predicate)?
            }
            (
                Some(operand),
                PredicateKind::Between {
                    low: Some(low),
                    high: Some(high),
                },
            ) if !low.is_null() && !high.is_null() => {
                let range = RangeEstimate::new(
                    Some(low.clone()),
                    Some(high.clone()),
                    true,
                    true,
                    self.use_extrapolation(operand),
                )?;
                Some(self.estimate(
                    Some(operand),
                    qualifier_phase,
                    predicate,
                    EstimateKind::Range(range),
                ))
            }
            _ => {
                trace!(
                    access_path = %self.access_path.name,
                    slot = predicate.slot(),
                    "predicate is not range-worthy, using default factor"
                );
                Some(self.estimate(
                    predicate.operand,
                    qualifier_phase,
                    predicate,
                    EstimateKind::Default {
                        factor: self.config.default_predicate_factor,
                    },
                ))
            }
        };

        if let Some(estimate) = estimate {
            self.list_mut(qualifier_phase.phase(), estimate.slot)
                .push(estimate);
        }
        Ok(())
    }

    /// Record a constant comparison, merging it into existing estimates where possible.
    /// Returns the estimate to append, or `None` when it was merged in place.
    fn add_comparison(
        &mut self,
        operand: OperandRef,
        op: RelOp,
        value: &ScalarValue,
        qualifier_phase: QualifierPhase,
        predicate: &Predicate,
    ) -> Result<Option<SelectivityEstimate>, EstimationError> {
        let use_extrapolation = self.use_extrapolation(operand);
        let min = self.stats.min_value(operand);
        let max = self.stats.max_value(operand);
        let name = self.access_path.name.clone();
        let slot = operand.slot();
        let list = self.list_mut(qualifier_phase.phase(), slot);

        let kind = match op {
            RelOp::Eq => EstimateKind::Range(RangeEstimate::point(value.clone(), use_extrapolation)),
            RelOp::NotEq => {
                let absorbed = list
                    .iter_mut()
                    .filter(|e| e.operand == Some(operand) && e.qualifier_phase == qualifier_phase)
                    .filter_map(SelectivityEstimate::as_range_mut)
                    .any(|range| range.absorb_not_equals(value, min.as_ref(), max.as_ref()));
                if absorbed {
                    debug!(access_path = %name, slot, %value, "<> merged into range edge");
                    return Ok(None);
                }
                EstimateKind::NotEquals {
                    value: value.clone(),
                }
            }
            RelOp::Gt | RelOp::GtEq | RelOp::Lt | RelOp::LtEq => {
                let inclusive = matches!(op, RelOp::GtEq | RelOp::LtEq);
                let lower = matches!(op, RelOp::Gt | RelOp::GtEq);

                let open_range = list
                    .iter_mut()
                    .filter(|e| e.operand == Some(operand) && e.qualifier_phase == qualifier_phase)
                    .filter_map(SelectivityEstimate::as_range_mut)
                    .find(|r| if lower { r.start().is_none() } else { r.stop().is_none() });
                if let Some(range) = open_range {
                    if lower {
                        range.set_start(value.clone(), inclusive);
                    } else {
                        range.set_stop(value.clone(), inclusive);
                    }
                    trace!(access_path = %name, slot, %op, %value, "bound merged into range");
                    return Ok(None);
                }

                let mut range = if lower {
                    RangeEstimate::new(Some(value.clone()), None, inclusive, false, use_extrapolation)?
                } else {
                    RangeEstimate::new(None, Some(value.clone()), false, inclusive, use_extrapolation)?
                };

                let absorbed = list.iter().position(|e| match &e.kind {
                    EstimateKind::NotEquals { value: excluded }
                        if e.operand == Some(operand) && e.qualifier_phase == qualifier_phase =>
                    {
                        range.clone().absorb_not_equals(excluded, min.as_ref(), max.as_ref())
                    }
                    _ => false,
                });
                if let Some(index) = absorbed {
                    let removed = list.remove(index);
                    if let EstimateKind::NotEquals { value: excluded } = &removed.kind {
                        range.absorb_not_equals(excluded, min.as_ref(), max.as_ref());
                        debug!(access_path = %name, slot, %excluded, "<> merged into range edge");
                    }
                }
                EstimateKind::Range(range)
            }
            RelOp::IsNull | RelOp::IsNotNull => {
                return Err(EstimationError::UnknownOperator(op.to_string()));
            }
        };

        Ok(Some(self.estimate(
            Some(operand),
            qualifier_phase,
            predicate,
            kind,
        )))
    }

    fn estimate(
        &self,
        operand: Option<OperandRef>,
        qualifier_phase: QualifierPhase,
        predicate: &Predicate,
        kind: EstimateKind,
    ) -> SelectivityEstimate {
        SelectivityEstimate::new(operand, qualifier_phase, kind)
            .with_join_predicate(predicate.join_predicate)
            .with_transformed(predicate.transformed)
    }

    fn use_extrapolation(&self, operand: OperandRef) -> bool {
        self.access_path.extrapolated.contains(&operand)
    }

    fn estimates_for(&self, phase: Phase) -> &ColumnEstimates {
        match phase {
            Phase::Scan => &self.scan_estimates,
            Phase::Top => &self.top_estimates,
        }
    }

    fn list_mut(&mut self, phase: Phase, slot: usize) -> &mut Vec<SelectivityEstimate> {
        let estimates = match phase {
            Phase::Scan => &mut self.scan_estimates,
            Phase::Top => &mut self.top_estimates,
        };
        estimates.entry(slot).or_default()
    }

    fn compose<'a>(&self, estimates: impl Iterator<Item = &'a SelectivityEstimate>) -> f64 {
        let strategy = self.access_path.join_strategy;
        let stats = self.stats.as_ref();
        compose_selectivity(
            estimates
                .filter(|e| e.participates_in_join_strategy(strategy))
                .map(|e| e.selectivity(stats, self.config.default_null_fraction)),
        )
    }

    /// Selectivity of every recorded predicate, both phases.
    pub fn total_selectivity(&self) -> f64 {
        self.compose(self.estimates(Phase::Scan).chain(self.estimates(Phase::Top)))
    }

    /// Selectivity of the predicates evaluated in one of `phases`.
    pub fn phase_selectivity(&self, phases: &[QualifierPhase]) -> f64 {
        self.compose(
            self.estimates(Phase::Scan)
                .chain(self.estimates(Phase::Top))
                .filter(|e| phases.contains(&e.qualifier_phase)),
        )
    }

    /// Cost of looking up `lookup_rows` base rows on this access path's engine.
    pub fn estimate_lookup_cost(
        &self,
        lookup_rows: f64,
        open_latency: f64,
        close_latency: f64,
    ) -> f64 {
        self.lookup_model
            .lookup_cost(lookup_rows, open_latency, close_latency, self.access_path.is_olap)
            .total
    }

    /// Price the access path over a table of `base_row_count` rows.
    pub fn estimate_cost(&self, base_row_count: f64) -> AccessPathCost {
        let base_rows = base_row_count.max(0.0);
        let scanned_rows = base_rows * self.phase_selectivity(&[QualifierPhase::Base]);
        let filtered_rows = base_rows
            * self.phase_selectivity(&[QualifierPhase::Base, QualifierPhase::FilterBase]);
        let output_rows = base_rows * self.total_selectivity();

        let scan_cost = scanned_rows * self.config.scan_cost_per_row
            + scanned_rows * self.access_path.row_width_bytes * self.config.remote_cost_per_byte;
        let lookup_cost = if self.access_path.covering {
            0.0
        } else {
            self.estimate_lookup_cost(
                filtered_rows,
                self.config.index_lookup_open_latency,
                self.config.index_lookup_close_latency,
            )
        };
        let projection_cost = filtered_rows * self.config.projection_cost_per_row;

        debug!(
            access_path = %self.access_path.name,
            scanned_rows,
            filtered_rows,
            output_rows,
            scan_cost,
            lookup_cost,
            projection_cost,
            "access path costed"
        );

        AccessPathCost {
            scanned_rows,
            filtered_rows,
            output_rows,
            scan_cost,
            lookup_cost,
            projection_cost,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::{ColumnStatistics, TableStatistics};

    const A: OperandRef = OperandRef::Column(1);

    fn estimator() -> ScanCostEstimator {
        let stats = TableStatistics::new(1000.0).with_column(
            A,
            ColumnStatistics::new(100.0, 0.0)
                .with_bounds(ScalarValue::Int64(0), ScalarValue::Int64(100)),
        );
        ScanCostEstimator::new(
            AccessPath::new("t_a_idx"),
            Arc::new(stats),
            OptimizerConfig::default(),
        )
    }

    #[test]
    fn test_between_is_one_inclusive_range() {
        let mut est = estimator();
        est.add_predicate(
            &Predicate::between(A, ScalarValue::Int64(10), ScalarValue::Int64(20)),
            QualifierPhase::Base,
        )
        .unwrap();
        let estimates = est.column_estimates(Phase::Scan, 1);
        assert_eq!(estimates.len(), 1);
        match &estimates[0].kind {
            EstimateKind::Range(range) => {
                assert!(range.include_start() && range.include_stop());
            }
            other => panic!("expected range, got {:?}", other),
        }
    }

    #[test]
    fn test_non_constant_comparison_falls_back_to_default() {
        let mut est = estimator();
        let predicate = Predicate {
            operand: Some(A),
            kind: PredicateKind::Compare {
                op: RelOp::Lt,
                value: None,
            },
            join_predicate: false,
            transformed: false,
        };
        est.add_predicate(&predicate, QualifierPhase::FilterBase).unwrap();
        assert!(matches!(
            est.column_estimates(Phase::Scan, 1)[0].kind,
            EstimateKind::Default { factor } if factor == 0.5
        ));
        assert_eq!(est.total_selectivity(), 0.5);
    }

    #[test]
    fn test_phases_are_kept_apart() {
        let mut est = estimator();
        est.add_predicate(&Predicate::other(None), QualifierPhase::FilterProjection)
            .unwrap();
        assert!(est.column_estimates(Phase::Scan, 0).is_empty());
        assert_eq!(est.column_estimates(Phase::Top, 0).len(), 1);
        assert_eq!(est.phase_selectivity(&[QualifierPhase::Base]), 1.0);
        assert_eq!(est.phase_selectivity(&[QualifierPhase::FilterProjection]), 0.5);
    }

    #[test]
    fn test_missing_statistics_are_recorded_once() {
        let mut est = estimator();
        let b = OperandRef::IndexExpr(0);
        est.add_predicate(&Predicate::compare(b, RelOp::Eq, ScalarValue::Int64(1)), QualifierPhase::Base)
            .unwrap();
        est.add_predicate(&Predicate::compare(b, RelOp::Gt, ScalarValue::Int64(0)), QualifierPhase::Base)
            .unwrap();
        assert_eq!(est.missing_statistics().iter().collect::<Vec<_>>(), vec![&b]);
        // Index expression 0 lives in slot 1, next to base column 1.
        assert_eq!(est.column_estimates(Phase::Scan, 1).len(), 2);
    }

    #[test]
    fn test_covering_path_has_no_lookup_cost() {
        let mut est = estimator();
        est.add_predicate(&Predicate::compare(A, RelOp::LtEq, ScalarValue::Int64(50)), QualifierPhase::Base)
            .unwrap();
        let cost = est.estimate_cost(1000.0);
        assert!((cost.scanned_rows - 500.0).abs() < 1e-9);
        assert_eq!(cost.lookup_cost, 0.0);
        assert!((cost.scan_cost - (500.0 + 500.0 * 100.0 * 0.02)).abs() < 1e-6);
    }
}
