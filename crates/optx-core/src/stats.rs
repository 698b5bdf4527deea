//! # Statistics for Selectivity Estimation
//!
//! The estimator never looks at raw statistics itself. Everything it needs is asked of a
//! [`StatisticsProvider`]: the selectivity of a range or of a single value on one operand, the
//! operand's null fraction, its observed min/max, and whether any real statistics back those
//! answers at all. Providers are shared between concurrent compilations, so a call must be a
//! side-effect-free read.
//!
//! ## In-Memory Provider
//!
//! [`TableStatistics`] answers from per-operand [`ColumnStatistics`] gathered by ANALYZE:
//!
//! - **Equality**: `(1 - null_fraction) / NDV` (uniform distribution assumption), or the share
//!   of the histogram bucket holding the value; zero outside the observed `[min, max]`.
//! - **Range**: linear interpolation over `[min, max]`, or over histogram buckets when present.
//!   An excluded bound that lies inside the domain removes one value's worth of rows.
//!   Non-numeric ranges get the range fallback (1/3 unless configured otherwise).
//! - **Extrapolation**: when allowed, the domain is widened to cover the requested bounds
//!   instead of clamping to what was observed, and a range entirely past the observed values
//!   still gets one value's worth of rows. This is what keeps ever-growing columns (timestamps,
//!   sequences) from being estimated at zero between two ANALYZE runs.
//! - **No statistics**: the configured fallbacks (`OptimizerConfig::default_equality_selectivity`
//!   and `default_range_selectivity`), which default to the constants below.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

use crate::config::OptimizerConfig;
use crate::expr::{OperandRef, ScalarValue};

/// Default equality selectivity when the operand has no statistics.
pub const DEFAULT_EQUALITY_SELECTIVITY: f64 = 0.1;

/// Default range selectivity when the operand has no statistics or is not numeric.
pub const DEFAULT_RANGE_SELECTIVITY: f64 = 1.0 / 3.0;

/// Source of per-operand statistics.
pub trait StatisticsProvider: Send + Sync {
    /// Fraction of rows with `start ⋈ operand ⋈ stop`. `None` bounds are unbounded.
    fn range_selectivity(
        &self,
        operand: OperandRef,
        start: Option<&ScalarValue>,
        stop: Option<&ScalarValue>,
        include_start: bool,
        include_stop: bool,
        use_extrapolation: bool,
    ) -> f64;

    /// Fraction of rows with `operand = value`.
    fn point_selectivity(&self, operand: OperandRef, value: &ScalarValue) -> f64;

    fn null_fraction(&self, operand: OperandRef) -> f64;

    fn min_value(&self, operand: OperandRef) -> Option<ScalarValue>;

    fn max_value(&self, operand: OperandRef) -> Option<ScalarValue>;

    /// Whether the answers for `operand` come from collected statistics rather than defaults.
    fn has_real_statistics(&self, operand: OperandRef) -> bool;
}

/// Per-column statistics used for selectivity estimation and cost modeling.
///
/// These statistics are typically gathered by ANALYZE TABLE and stored in the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnStatistics {
    /// Number of distinct values (NDV). Used for equality selectivity: sel = 1/NDV.
    pub distinct_count: f64,
    /// Fraction of rows that are NULL [0.0, 1.0].
    pub null_fraction: f64,
    /// Minimum value in the column (if known). Used for range selectivity.
    #[serde(default)]
    pub min_value: Option<ScalarValue>,
    /// Maximum value in the column (if known). Used for range selectivity.
    #[serde(default)]
    pub max_value: Option<ScalarValue>,
    /// Optional equi-depth histogram for more accurate range selectivity estimation.
    #[serde(default)]
    pub histogram: Option<Histogram>,
}

impl ColumnStatistics {
    pub fn new(distinct_count: f64, null_fraction: f64) -> Self {
        Self {
            distinct_count,
            null_fraction,
            min_value: None,
            max_value: None,
            histogram: None,
        }
    }

    pub fn with_bounds(mut self, min: ScalarValue, max: ScalarValue) -> Self {
        self.min_value = Some(min);
        self.max_value = Some(max);
        self
    }

    pub fn with_histogram(mut self, histogram: Histogram) -> Self {
        self.histogram = Some(histogram);
        self
    }

    fn non_null_fraction(&self) -> f64 {
        (1.0 - self.null_fraction).clamp(0.0, 1.0)
    }

    /// Share of non-null rows holding one particular value.
    fn value_fraction(&self, value: Option<f64>) -> f64 {
        if let (Some(histogram), Some(v)) = (&self.histogram, value) {
            if let Some(fraction) = histogram.value_fraction(v) {
                return fraction;
            }
        }
        1.0 / self.distinct_count.max(1.0)
    }

    fn outside_bounds(&self, value: &ScalarValue) -> bool {
        let below = self
            .min_value
            .as_ref()
            .and_then(|min| value.compare(min))
            .map_or(false, |o| o == Ordering::Less);
        let above = self
            .max_value
            .as_ref()
            .and_then(|max| value.compare(max))
            .map_or(false, |o| o == Ordering::Greater);
        below || above
    }
}

/// Equi-depth histogram for range selectivity estimation.
///
/// Each bucket contains approximately the same number of rows. This allows
/// more accurate selectivity estimation for range predicates (e.g., `WHERE x > 100`)
/// compared to the uniform distribution assumption.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Histogram {
    pub buckets: Vec<HistogramBucket>,
}

/// A single bucket in an equi-depth histogram.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistogramBucket {
    /// Lower bound of the bucket range (inclusive).
    pub lower: f64,
    /// Upper bound of the bucket range (inclusive).
    pub upper: f64,
    /// Estimated number of rows in this bucket.
    pub count: f64,
    /// Estimated number of distinct values in this bucket.
    pub distinct: f64,
}

impl Histogram {
    fn total(&self) -> f64 {
        self.buckets.iter().map(|b| b.count).sum()
    }

    /// Share of rows falling in `[lo, hi]`, interpolating linearly inside partially covered
    /// buckets. `None` for an empty histogram.
    pub fn range_fraction(&self, lo: f64, hi: f64) -> Option<f64> {
        let total = self.total();
        if total <= 0.0 {
            return None;
        }
        let mut covered = 0.0;
        for bucket in &self.buckets {
            let overlap_lo = lo.max(bucket.lower);
            let overlap_hi = hi.min(bucket.upper);
            if overlap_hi < overlap_lo {
                continue;
            }
            let width = bucket.upper - bucket.lower;
            if width <= 0.0 {
                covered += bucket.count;
            } else {
                covered += bucket.count * (overlap_hi - overlap_lo) / width;
            }
        }
        Some((covered / total).clamp(0.0, 1.0))
    }

    /// Share of rows equal to `value`, assuming values are spread evenly over the distinct
    /// values of the bucket that holds it.
    pub fn value_fraction(&self, value: f64) -> Option<f64> {
        let total = self.total();
        if total <= 0.0 {
            return None;
        }
        self.buckets
            .iter()
            .find(|b| b.lower <= value && value <= b.upper)
            .map(|b| b.count / total / b.distinct.max(1.0))
    }
}

/// Statistics of one table (or index), keyed by operand.
#[derive(Debug, Clone)]
pub struct TableStatistics {
    pub row_count: f64,
    pub columns: HashMap<OperandRef, ColumnStatistics>,
    /// Equality selectivity for operands without statistics.
    pub equality_fallback: f64,
    /// Range selectivity for operands without statistics, and for non-numeric ranges.
    pub range_fallback: f64,
}

impl TableStatistics {
    pub fn new(row_count: f64) -> Self {
        Self {
            row_count,
            columns: HashMap::new(),
            equality_fallback: DEFAULT_EQUALITY_SELECTIVITY,
            range_fallback: DEFAULT_RANGE_SELECTIVITY,
        }
    }

    /// Take the no-statistics fallbacks from `config`.
    pub fn with_fallbacks(mut self, config: &OptimizerConfig) -> Self {
        self.equality_fallback = config.default_equality_selectivity;
        self.range_fallback = config.default_range_selectivity;
        self
    }

    pub fn with_column(mut self, operand: OperandRef, stats: ColumnStatistics) -> Self {
        self.columns.insert(operand, stats);
        self
    }

    pub fn column(&self, operand: OperandRef) -> Option<&ColumnStatistics> {
        self.columns.get(&operand)
    }
}

impl Default for TableStatistics {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl StatisticsProvider for TableStatistics {
    fn range_selectivity(
        &self,
        operand: OperandRef,
        start: Option<&ScalarValue>,
        stop: Option<&ScalarValue>,
        include_start: bool,
        include_stop: bool,
        use_extrapolation: bool,
    ) -> f64 {
        // A degenerate interval is an equality (or nothing at all).
        if let (Some(s), Some(e)) = (start, stop) {
            match s.compare(e) {
                Some(Ordering::Equal) if include_start && include_stop => {
                    return self.point_selectivity(operand, s);
                }
                Some(Ordering::Equal) | Some(Ordering::Greater) => return 0.0,
                _ => {}
            }
        }

        let Some(stats) = self.column(operand) else {
            return self.range_fallback;
        };

        let (Some(min), Some(max)) = (&stats.min_value, &stats.max_value) else {
            return self.range_fallback * stats.non_null_fraction();
        };
        let one_value = stats.value_fraction(None) * stats.non_null_fraction();

        // Outer `None` means the bound exists but is not numeric.
        let bound = |v: Option<&ScalarValue>| match v {
            None => Some(None),
            Some(v) => v.as_f64().map(Some),
        };
        let numeric = (min.as_f64(), max.as_f64(), bound(start), bound(stop));
        let (Some(lo), Some(hi), Some(s), Some(e)) = numeric else {
            // Non-numeric: only decide whether the range misses the observed values entirely.
            let misses = start
                .and_then(|s| s.compare(max))
                .map_or(false, |o| o == Ordering::Greater)
                || stop
                    .and_then(|e| e.compare(min))
                    .map_or(false, |o| o == Ordering::Less);
            return match (misses, use_extrapolation) {
                (false, _) => self.range_fallback * stats.non_null_fraction(),
                (true, true) => one_value,
                (true, false) => 0.0,
            };
        };

        let (domain_lo, domain_hi) = if use_extrapolation {
            (
                s.map_or(lo, |s| lo.min(s)),
                e.map_or(hi, |e| hi.max(e)),
            )
        } else {
            (lo, hi)
        };
        let a = s.map_or(domain_lo, |s| s.max(domain_lo));
        let b = e.map_or(domain_hi, |e| e.min(domain_hi));
        if b < a {
            return if use_extrapolation { one_value } else { 0.0 };
        }

        let width = domain_hi - domain_lo;
        let mut fraction = if width <= 0.0 {
            1.0
        } else {
            let within_observed = a >= lo && b <= hi;
            match (&stats.histogram, within_observed) {
                (Some(histogram), true) => histogram
                    .range_fraction(a, b)
                    .unwrap_or((b - a) / width),
                _ => (b - a) / width,
            }
        };

        if let Some(s) = s {
            if !include_start && s >= lo && s <= hi {
                fraction -= stats.value_fraction(Some(s));
            }
        }
        if let Some(e) = e {
            if !include_stop && e >= lo && e <= hi {
                fraction -= stats.value_fraction(Some(e));
            }
        }

        let selectivity = fraction.clamp(0.0, 1.0) * stats.non_null_fraction();
        if selectivity <= 0.0 && use_extrapolation {
            one_value
        } else {
            selectivity
        }
    }

    fn point_selectivity(&self, operand: OperandRef, value: &ScalarValue) -> f64 {
        let Some(stats) = self.column(operand) else {
            return self.equality_fallback;
        };
        if value.is_null() || stats.outside_bounds(value) {
            return 0.0;
        }
        (stats.value_fraction(value.as_f64()) * stats.non_null_fraction()).clamp(0.0, 1.0)
    }

    fn null_fraction(&self, operand: OperandRef) -> f64 {
        self.column(operand).map(|s| s.null_fraction).unwrap_or(0.0)
    }

    fn min_value(&self, operand: OperandRef) -> Option<ScalarValue> {
        self.column(operand).and_then(|s| s.min_value.clone())
    }

    fn max_value(&self, operand: OperandRef) -> Option<ScalarValue> {
        self.column(operand).and_then(|s| s.max_value.clone())
    }

    fn has_real_statistics(&self, operand: OperandRef) -> bool {
        self.columns.contains_key(&operand)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: OperandRef = OperandRef::Column(1);

    fn table() -> TableStatistics {
        TableStatistics::new(1000.0).with_column(
            A,
            ColumnStatistics::new(100.0, 0.0)
                .with_bounds(ScalarValue::Int64(0), ScalarValue::Int64(100)),
        )
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_point_selectivity() {
        let t = table();
        assert!(close(t.point_selectivity(A, &ScalarValue::Int64(5)), 0.01));
        assert_eq!(t.point_selectivity(A, &ScalarValue::Int64(500)), 0.0);
        assert_eq!(
            t.point_selectivity(OperandRef::Column(9), &ScalarValue::Int64(5)),
            DEFAULT_EQUALITY_SELECTIVITY
        );
    }

    #[test]
    fn test_range_interpolation() {
        let t = table();
        let sel = t.range_selectivity(
            A,
            Some(&ScalarValue::Int64(25)),
            Some(&ScalarValue::Int64(75)),
            true,
            true,
            false,
        );
        assert!(close(sel, 0.5));

        // Excluding both bounds removes one value's worth of rows at each end.
        let sel = t.range_selectivity(
            A,
            Some(&ScalarValue::Int64(25)),
            Some(&ScalarValue::Int64(75)),
            false,
            false,
            false,
        );
        assert!(close(sel, 0.48));
    }

    #[test]
    fn test_extrapolation_beyond_max() {
        let t = table();
        let clamped = t.range_selectivity(
            A,
            Some(&ScalarValue::Int64(150)),
            Some(&ScalarValue::Int64(200)),
            true,
            true,
            false,
        );
        assert_eq!(clamped, 0.0);
        let extrapolated = t.range_selectivity(
            A,
            Some(&ScalarValue::Int64(150)),
            Some(&ScalarValue::Int64(200)),
            true,
            true,
            true,
        );
        assert!(close(extrapolated, 0.25));
        let open = t.range_selectivity(A, Some(&ScalarValue::Int64(150)), None, false, false, true);
        assert!(close(open, 0.01));
    }

    #[test]
    fn test_histogram_range() {
        let histogram = Histogram {
            buckets: vec![
                HistogramBucket { lower: 0.0, upper: 10.0, count: 900.0, distinct: 10.0 },
                HistogramBucket { lower: 10.0, upper: 100.0, count: 100.0, distinct: 90.0 },
            ],
        };
        let t = TableStatistics::new(1000.0).with_column(
            A,
            ColumnStatistics::new(100.0, 0.0)
                .with_bounds(ScalarValue::Int64(0), ScalarValue::Int64(100))
                .with_histogram(histogram),
        );
        let sel = t.range_selectivity(A, None, Some(&ScalarValue::Int64(10)), true, true, false);
        assert!(sel > 0.89 && sel <= 1.0);
        assert!(close(t.point_selectivity(A, &ScalarValue::Int64(3)), 0.09));
    }

    #[test]
    fn test_null_fraction_scales_ranges() {
        let t = TableStatistics::new(1000.0).with_column(
            A,
            ColumnStatistics::new(100.0, 0.5)
                .with_bounds(ScalarValue::Int64(0), ScalarValue::Int64(100)),
        );
        let sel = t.range_selectivity(A, Some(&ScalarValue::Int64(0)), None, true, false, false);
        assert!(close(sel, 0.5));
        assert_eq!(t.null_fraction(A), 0.5);
        assert!(t.has_real_statistics(A));
        assert!(!t.has_real_statistics(OperandRef::IndexExpr(0)));
    }

    #[test]
    fn test_configured_fallbacks_apply_without_statistics() {
        let config = OptimizerConfig {
            default_equality_selectivity: 0.05,
            default_range_selectivity: 0.25,
            ..OptimizerConfig::default()
        };
        let t = table().with_fallbacks(&config);
        let missing = OperandRef::Column(9);
        assert_eq!(t.point_selectivity(missing, &ScalarValue::Int64(5)), 0.05);
        let one = ScalarValue::Int64(1);
        assert_eq!(t.range_selectivity(missing, Some(&one), None, true, false, false), 0.25);
        // A degenerate range is an equality.
        assert_eq!(t.range_selectivity(missing, Some(&one), Some(&one), true, true, false), 0.05);
        // Columns with statistics are unaffected.
        assert!(close(t.point_selectivity(A, &ScalarValue::Int64(5)), 0.01));
    }
}
