//! # Selectivity Estimates
//!
//! Every predicate bound to an access path contributes one [`SelectivityEstimate`]: a closed
//! set of shapes (a range on one operand, a `<>` value, `IS NULL`, `IS NOT NULL`, or a fixed
//! default factor) that the scan estimator merges and then composes into a single number.
//!
//! ## Composition
//!
//! Predicates on a table are rarely independent, so multiplying their selectivities straight
//! through badly underestimates result sizes. [`compose_selectivity`] sorts the estimates from
//! most to least selective and dampens each later one by taking its square root once per
//! level:
//!
//! ```text
//! total = s_0 * s_1^(1/2) * s_2^(1/4) * ... * s_k^(1/2^k)
//! ```
//!
//! The result is never below the naive product and never above the most selective estimate.

use serde::Serialize;

use crate::error::EstimationError;
use crate::expr::{JoinStrategy, OperandRef, QualifierPhase, ScalarValue};
use crate::stats::StatisticsProvider;

/// `start ⋈ operand ⋈ stop`, with `None` meaning unbounded on that side.
///
/// At least one bound is always present. An inclusivity flag is meaningless while its bound
/// is absent and is reset whenever the bound is set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RangeEstimate {
    start: Option<ScalarValue>,
    stop: Option<ScalarValue>,
    include_start: bool,
    include_stop: bool,
    use_extrapolation: bool,
}

impl RangeEstimate {
    pub fn new(
        start: Option<ScalarValue>,
        stop: Option<ScalarValue>,
        include_start: bool,
        include_stop: bool,
        use_extrapolation: bool,
    ) -> Result<Self, EstimationError> {
        if start.is_none() && stop.is_none() {
            return Err(EstimationError::UnboundedRange);
        }
        Ok(Self {
            include_start: include_start && start.is_some(),
            include_stop: include_stop && stop.is_some(),
            start,
            stop,
            use_extrapolation,
        })
    }

    /// `[value, value]`.
    pub fn point(value: ScalarValue, use_extrapolation: bool) -> Self {
        Self {
            start: Some(value.clone()),
            stop: Some(value),
            include_start: true,
            include_stop: true,
            use_extrapolation,
        }
    }

    pub fn start(&self) -> Option<&ScalarValue> {
        self.start.as_ref()
    }

    pub fn stop(&self) -> Option<&ScalarValue> {
        self.stop.as_ref()
    }

    pub fn include_start(&self) -> bool {
        self.include_start
    }

    pub fn include_stop(&self) -> bool {
        self.include_stop
    }

    pub fn use_extrapolation(&self) -> bool {
        self.use_extrapolation
    }

    pub fn set_start(&mut self, value: ScalarValue, inclusive: bool) {
        self.start = Some(value);
        self.include_start = inclusive;
    }

    pub fn set_stop(&mut self, value: ScalarValue, inclusive: bool) {
        self.stop = Some(value);
        self.include_stop = inclusive;
    }

    /// Open on at least one side.
    pub fn is_open_ended(&self) -> bool {
        self.start.is_none() || self.stop.is_none()
    }

    /// Fold a `<> value` into this range if `value` sits on one of its edges: the exact
    /// bound, or the observed min (max) when the range has no start (stop). Returns whether
    /// the value was absorbed.
    ///
    /// A heavily repeated boundary value would otherwise be counted twice: once inside the
    /// range and once more by an independent `<>` estimate.
    pub fn absorb_not_equals(
        &mut self,
        value: &ScalarValue,
        min: Option<&ScalarValue>,
        max: Option<&ScalarValue>,
    ) -> bool {
        if !self.is_open_ended() {
            return false;
        }
        if self.start.as_ref().is_some_and(|s| s.sql_eq(value)) {
            self.include_start = false;
            return true;
        }
        if self.stop.as_ref().is_some_and(|s| s.sql_eq(value)) {
            self.include_stop = false;
            return true;
        }
        if self.start.is_none() && min.is_some_and(|m| m.sql_eq(value)) {
            self.set_start(value.clone(), false);
            return true;
        }
        if self.stop.is_none() && max.is_some_and(|m| m.sql_eq(value)) {
            self.set_stop(value.clone(), false);
            return true;
        }
        false
    }
}

/// The shape of one predicate's contribution.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EstimateKind {
    Range(RangeEstimate),
    NotEquals { value: ScalarValue },
    Null,
    NotNull,
    /// A predicate that cannot be reduced to a range.
    Default { factor: f64 },
}

/// One predicate's contribution, tagged with where it belongs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectivityEstimate {
    /// `None` only for `Default` estimates of predicates without an identifiable operand.
    pub operand: Option<OperandRef>,
    /// 1-based slot in the estimator's per-column lists; 0 when there is no operand.
    pub slot: usize,
    pub qualifier_phase: QualifierPhase,
    /// The predicate only matters to the join this access path is the inner side of.
    pub join_predicate: bool,
    /// Derived predicates were generated from this one and already carry its selectivity.
    pub transformed: bool,
    pub kind: EstimateKind,
}

impl SelectivityEstimate {
    pub fn new(
        operand: Option<OperandRef>,
        qualifier_phase: QualifierPhase,
        kind: EstimateKind,
    ) -> Self {
        Self {
            operand,
            slot: operand.map(OperandRef::slot).unwrap_or(0),
            qualifier_phase,
            join_predicate: false,
            transformed: false,
            kind,
        }
    }

    pub fn with_join_predicate(mut self, join_predicate: bool) -> Self {
        self.join_predicate = join_predicate;
        self
    }

    pub fn with_transformed(mut self, transformed: bool) -> Self {
        self.transformed = transformed;
        self
    }

    pub fn is_range(&self) -> bool {
        matches!(self.kind, EstimateKind::Range(_))
    }

    pub fn as_range_mut(&mut self) -> Option<&mut RangeEstimate> {
        match &mut self.kind {
            EstimateKind::Range(range) => Some(range),
            _ => None,
        }
    }

    /// Whether the estimate counts toward composition under the given join algorithm.
    ///
    /// Join-only predicates restrict the inner side only when it is probed once per outer
    /// row, i.e. under a nested-loop join. Any other join evaluates them after the scan.
    pub fn participates_in_join_strategy(&self, strategy: Option<JoinStrategy>) -> bool {
        !self.join_predicate || strategy == Some(JoinStrategy::NestedLoop)
    }

    /// Fraction of rows surviving this predicate, in `[0, 1]`.
    ///
    /// `default_null_fraction` stands in for the null fraction of operands the provider has
    /// no statistics for.
    pub fn selectivity(&self, stats: &dyn StatisticsProvider, default_null_fraction: f64) -> f64 {
        let null_fraction = |operand: OperandRef| {
            if stats.has_real_statistics(operand) {
                stats.null_fraction(operand)
            } else {
                default_null_fraction
            }
        };
        let selectivity = match (&self.kind, self.operand) {
            (EstimateKind::Default { factor }, _) => {
                if self.transformed {
                    1.0
                } else {
                    *factor
                }
            }
            (EstimateKind::Range(range), Some(operand)) => stats.range_selectivity(
                operand,
                range.start(),
                range.stop(),
                range.include_start(),
                range.include_stop(),
                range.use_extrapolation(),
            ),
            (EstimateKind::NotEquals { value }, Some(operand)) => {
                1.0 - stats.point_selectivity(operand, value)
            }
            (EstimateKind::Null, Some(operand)) => null_fraction(operand),
            (EstimateKind::NotNull, Some(operand)) => 1.0 - null_fraction(operand),
            // Operand-bound shapes are only ever built with an operand.
            (_, None) => 1.0,
        };
        selectivity.clamp(0.0, 1.0)
    }
}

/// Combine selectivities with sqrt-leveling.
///
/// Sorted ascending, the `k`-th value is square-rooted `k` times before being multiplied in.
/// An empty input selects everything.
pub fn compose_selectivity(selectivities: impl IntoIterator<Item = f64>) -> f64 {
    let mut values: Vec<f64> = selectivities
        .into_iter()
        .map(|s| s.clamp(0.0, 1.0))
        .collect();
    values.sort_by(|a, b| a.total_cmp(b));

    let mut total = 1.0;
    for (level, value) in values.into_iter().enumerate() {
        let mut dampened = value;
        for _ in 0..level {
            dampened = dampened.sqrt();
        }
        total *= dampened;
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::{ColumnStatistics, TableStatistics};

    const A: OperandRef = OperandRef::Column(1);

    #[test]
    fn test_range_requires_a_bound() {
        assert_eq!(
            RangeEstimate::new(None, None, true, true, false),
            Err(EstimationError::UnboundedRange)
        );
        let range = RangeEstimate::new(None, Some(ScalarValue::Int64(3)), true, true, false)
            .unwrap();
        assert!(!range.include_start());
        assert!(range.include_stop());
    }

    #[test]
    fn test_absorb_not_equals_at_observed_min() {
        let mut range =
            RangeEstimate::new(None, Some(ScalarValue::Int64(3)), false, false, false).unwrap();
        let min = ScalarValue::Int64(0);
        assert!(range.absorb_not_equals(&ScalarValue::Int64(0), Some(&min), None));
        assert_eq!(range.start(), Some(&ScalarValue::Int64(0)));
        assert!(!range.include_start());

        // Now closed on both sides: nothing more to absorb.
        assert!(!range.absorb_not_equals(&ScalarValue::Int64(3), Some(&min), None));
    }

    #[test]
    fn test_default_estimate_and_transformed() {
        let stats = TableStatistics::new(100.0);
        let estimate = SelectivityEstimate::new(
            None,
            QualifierPhase::FilterBase,
            EstimateKind::Default { factor: 0.5 },
        );
        assert_eq!(estimate.selectivity(&stats, 0.0), 0.5);
        assert_eq!(estimate.with_transformed(true).selectivity(&stats, 0.0), 1.0);
    }

    #[test]
    fn test_null_estimates_fall_back_without_statistics() {
        let stats = TableStatistics::new(100.0)
            .with_column(A, ColumnStatistics::new(10.0, 0.2));
        let null = SelectivityEstimate::new(Some(A), QualifierPhase::Base, EstimateKind::Null);
        assert!((null.selectivity(&stats, 0.05) - 0.2).abs() < 1e-12);

        let unknown = SelectivityEstimate::new(
            Some(OperandRef::Column(2)),
            QualifierPhase::Base,
            EstimateKind::NotNull,
        );
        assert!((unknown.selectivity(&stats, 0.05) - 0.95).abs() < 1e-12);
    }

    #[test]
    fn test_join_predicates_only_count_for_nested_loop() {
        let estimate = SelectivityEstimate::new(
            Some(A),
            QualifierPhase::Base,
            EstimateKind::Default { factor: 0.5 },
        )
        .with_join_predicate(true);
        assert!(estimate.participates_in_join_strategy(Some(JoinStrategy::NestedLoop)));
        assert!(!estimate.participates_in_join_strategy(Some(JoinStrategy::Hash)));
        assert!(!estimate.participates_in_join_strategy(None));
    }

    #[test]
    fn test_compose_levels() {
        assert_eq!(compose_selectivity(Vec::new()), 1.0);
        assert_eq!(compose_selectivity([0.3]), 0.3);
        let composed = compose_selectivity([0.25, 0.0625]);
        assert!((composed - 0.0625 * 0.5).abs() < 1e-12);
        let composed = compose_selectivity([0.5, 0.1, 0.0001]);
        let expected = 0.0001 * 0.1f64.sqrt() * 0.5f64.sqrt().sqrt();
        assert!((composed - expected).abs() < 1e-12);
    }
}
