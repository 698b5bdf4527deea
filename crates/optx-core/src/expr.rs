//! # Values, Operands and Predicates
//!
//! This module defines the vocabulary shared by the estimator and the rewriter:
//!
//! ## Scalar Values
//! `ScalarValue` is the constant side of a comparison (e.g. the `42` in `x > 42`). Values of
//! different types are compared through [`ScalarValue::compare`], which orders numeric types
//! against each other and refuses to order anything else across types. Range merging and the
//! min/max checks of the skew merge both go through it.
//!
//! ## Operand References
//! A predicate is attached to a column of the access path either as a base-column position
//! (1-based) or as an index-expression position (0-based). `OperandRef::slot` maps both onto a
//! single 1-based slot; slot 0 is kept for predicates that reference no identifiable column.
//!
//! ## Predicates and Phases
//! `Predicate` is the already-bound form of a single qualifier, the only shape the estimator
//! needs to understand. Each predicate is added for a `QualifierPhase`, which tells whether it is
//! evaluated while scanning keys, after the scan but before the row lookup, or after the lookup.

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::error::EstimationError;

/// Reference to a column of a table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnRef {
    pub table: Option<String>,
    pub name: String,
    pub index: u32,
}

impl ColumnRef {
    pub fn new(table: impl Into<String>, name: impl Into<String>, index: u32) -> Self {
        Self {
            table: Some(table.into()),
            name: name.into(),
            index,
        }
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref t) = self.table {
            write!(f, "{}.{}", t, self.name)
        } else {
            write!(f, "{}", self.name)
        }
    }
}

/// Scalar value for expressions.
///
/// Uses `OrderedFloat` for `f64` so that floating-point values can be used as
/// hash map keys and in Eq/Hash comparisons.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ScalarValue {
    /// SQL NULL value.
    Null,
    /// Boolean true/false.
    Bool(bool),
    /// 64-bit signed integer.
    Int64(i64),
    /// 64-bit floating point, wrapped in OrderedFloat for Eq/Hash support.
    Float64(OrderedFloat<f64>),
    /// UTF-8 string.
    Utf8(String),
    /// Date as days since Unix epoch (1970-01-01).
    Date(i32),
}

impl ScalarValue {
    pub fn float(v: f64) -> Self {
        Self::Float64(OrderedFloat(v))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Order two values.
    ///
    /// `Int64` and `Float64` are compared numerically; every other pair must have the same
    /// type. NULL is never comparable, not even with itself. Returns `None` for incomparable
    /// pairs.
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Null, _) | (_, Self::Null) => None,
            (Self::Bool(a), Self::Bool(b)) => Some(a.cmp(b)),
            (Self::Int64(a), Self::Int64(b)) => Some(a.cmp(b)),
            (Self::Float64(a), Self::Float64(b)) => Some(a.cmp(b)),
            (Self::Int64(a), Self::Float64(b)) => Some(OrderedFloat(*a as f64).cmp(b)),
            (Self::Float64(a), Self::Int64(b)) => Some(a.cmp(&OrderedFloat(*b as f64))),
            (Self::Utf8(a), Self::Utf8(b)) => Some(a.cmp(b)),
            (Self::Date(a), Self::Date(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Comparison-based equality: `Int64(3)` equals `Float64(3.0)`, NULL equals nothing.
    pub fn sql_eq(&self, other: &Self) -> bool {
        self.compare(other) == Some(Ordering::Equal)
    }

    /// Position of this value on a numeric axis, used to interpolate inside `[min, max]`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int64(v) => Some(*v as f64),
            Self::Float64(v) => Some(v.0),
            Self::Date(v) => Some(*v as f64),
            Self::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
            Self::Null | Self::Utf8(_) => None,
        }
    }
}

impl PartialEq for ScalarValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int64(a), Self::Int64(b)) => a == b,
            (Self::Float64(a), Self::Float64(b)) => a == b,
            (Self::Utf8(a), Self::Utf8(b)) => a == b,
            (Self::Date(a), Self::Date(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for ScalarValue {}

impl Hash for ScalarValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::Null => {}
            Self::Bool(v) => v.hash(state),
            Self::Int64(v) => v.hash(state),
            Self::Float64(v) => v.hash(state),
            Self::Utf8(v) => v.hash(state),
            Self::Date(v) => v.hash(state),
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Bool(v) => write!(f, "{}", v),
            Self::Int64(v) => write!(f, "{}", v),
            Self::Float64(v) => write!(f, "{}", v.0),
            Self::Utf8(v) => write!(f, "'{}'", v),
            Self::Date(v) => write!(f, "DATE {}", v),
        }
    }
}

/// Relational operators carried by a qualifier.
///
/// The numeric codes are the ones used by the binder when predicates arrive from outside the
/// process; [`RelOp::from_code`] rejects anything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelOp {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "<>")]
    NotEq,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    GtEq,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    LtEq,
    #[serde(rename = "IS NULL")]
    IsNull,
    #[serde(rename = "IS NOT NULL")]
    IsNotNull,
}

impl RelOp {
    pub fn from_code(code: u8) -> Result<Self, EstimationError> {
        match code {
            1 => Ok(RelOp::Eq),
            2 => Ok(RelOp::NotEq),
            3 => Ok(RelOp::Gt),
            4 => Ok(RelOp::GtEq),
            5 => Ok(RelOp::Lt),
            6 => Ok(RelOp::LtEq),
            7 => Ok(RelOp::IsNull),
            8 => Ok(RelOp::IsNotNull),
            other => Err(EstimationError::UnknownOperator(other.to_string())),
        }
    }

    pub fn code(self) -> u8 {
        match self {
            RelOp::Eq => 1,
            RelOp::NotEq => 2,
            RelOp::Gt => 3,
            RelOp::GtEq => 4,
            RelOp::Lt => 5,
            RelOp::LtEq => 6,
            RelOp::IsNull => 7,
            RelOp::IsNotNull => 8,
        }
    }

    /// True for the six binary comparisons that can be turned into a range or not-equals
    /// estimate.
    pub fn is_comparison(self) -> bool {
        !matches!(self, RelOp::IsNull | RelOp::IsNotNull)
    }

    /// Operator with the opposite truth value (`NOT (a < b)` is `a >= b`).
    pub fn negate(self) -> Self {
        match self {
            RelOp::Eq => RelOp::NotEq,
            RelOp::NotEq => RelOp::Eq,
            RelOp::Gt => RelOp::LtEq,
            RelOp::GtEq => RelOp::Lt,
            RelOp::Lt => RelOp::GtEq,
            RelOp::LtEq => RelOp::Gt,
            RelOp::IsNull => RelOp::IsNotNull,
            RelOp::IsNotNull => RelOp::IsNull,
        }
    }

    /// Operator to use when the operands are swapped (`5 < a` is `a > 5`).
    pub fn flip(self) -> Self {
        match self {
            RelOp::Gt => RelOp::Lt,
            RelOp::GtEq => RelOp::LtEq,
            RelOp::Lt => RelOp::Gt,
            RelOp::LtEq => RelOp::GtEq,
            other => other,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            RelOp::Eq => "=",
            RelOp::NotEq => "<>",
            RelOp::Gt => ">",
            RelOp::GtEq => ">=",
            RelOp::Lt => "<",
            RelOp::LtEq => "<=",
            RelOp::IsNull => "IS NULL",
            RelOp::IsNotNull => "IS NOT NULL",
        }
    }
}

impl fmt::Display for RelOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl std::str::FromStr for RelOp {
    type Err = EstimationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "=" => Ok(RelOp::Eq),
            "<>" | "!=" => Ok(RelOp::NotEq),
            ">" => Ok(RelOp::Gt),
            ">=" => Ok(RelOp::GtEq),
            "<" => Ok(RelOp::Lt),
            "<=" => Ok(RelOp::LtEq),
            "IS NULL" => Ok(RelOp::IsNull),
            "IS NOT NULL" => Ok(RelOp::IsNotNull),
            _ => Err(EstimationError::UnknownOperator(s.to_string())),
        }
    }
}

/// The column or index expression a predicate compares against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum OperandRef {
    /// Base-table column position, 1-based.
    Column(u32),
    /// Index expression position, 0-based.
    IndexExpr(u32),
}

impl OperandRef {
    /// 1-based slot in the per-column selectivity lists.
    pub fn slot(self) -> usize {
        match self {
            OperandRef::Column(position) => position as usize,
            OperandRef::IndexExpr(position) => position as usize + 1,
        }
    }
}

impl fmt::Display for OperandRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperandRef::Column(p) => write!(f, "column#{}", p),
            OperandRef::IndexExpr(p) => write!(f, "indexexpr#{}", p),
        }
    }
}

/// Stage at which a qualifier is evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum QualifierPhase {
    /// Applied as a key-range restriction while scanning.
    Base,
    /// Applied to scanned rows before the base-row lookup.
    FilterBase,
    /// Applied after the lookup, on the projected row.
    FilterProjection,
}

impl QualifierPhase {
    pub fn phase(self) -> Phase {
        match self {
            QualifierPhase::Base | QualifierPhase::FilterBase => Phase::Scan,
            QualifierPhase::FilterProjection => Phase::Top,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    Scan,
    Top,
}

/// Join algorithm of the join the access path is the inner side of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JoinStrategy {
    NestedLoop,
    Hash,
    Merge,
    Broadcast,
}

/// What a predicate does, as far as selectivity estimation is concerned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PredicateKind {
    /// `operand OP value`. `value` is `None` when the comparison side could not be reduced to a
    /// constant at compile time (a parameter, a correlated column, a function call ...).
    /// Unary operators (`IS NULL`, `IS NOT NULL`) carry no value.
    Compare {
        op: RelOp,
        value: Option<ScalarValue>,
    },
    /// `operand BETWEEN low AND high`.
    Between {
        low: Option<ScalarValue>,
        high: Option<ScalarValue>,
    },
    /// Anything else: LIKE, IN-lists, expressions over several columns.
    Other,
}

/// A qualifier bound to the access path being costed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Predicate {
    pub operand: Option<OperandRef>,
    pub kind: PredicateKind,
    /// Only meaningful to the join (references the outer table).
    #[serde(default)]
    pub join_predicate: bool,
    /// Derived predicates were generated from this one elsewhere; they carry its selectivity.
    #[serde(default)]
    pub transformed: bool,
}

impl Predicate {
    pub fn compare(operand: OperandRef, op: RelOp, value: ScalarValue) -> Self {
        Self {
            operand: Some(operand),
            kind: PredicateKind::Compare {
                op,
                value: Some(value),
            },
            join_predicate: false,
            transformed: false,
        }
    }

    pub fn between(operand: OperandRef, low: ScalarValue, high: ScalarValue) -> Self {
        Self {
            operand: Some(operand),
            kind: PredicateKind::Between {
                low: Some(low),
                high: Some(high),
            },
            join_predicate: false,
            transformed: false,
        }
    }

    pub fn is_null(operand: OperandRef) -> Self {
        Self {
            operand: Some(operand),
            kind: PredicateKind::Compare {
                op: RelOp::IsNull,
                value: None,
            },
            join_predicate: false,
            transformed: false,
        }
    }

    pub fn is_not_null(operand: OperandRef) -> Self {
        Self {
            operand: Some(operand),
            kind: PredicateKind::Compare {
                op: RelOp::IsNotNull,
                value: None,
            },
            join_predicate: false,
            transformed: false,
        }
    }

    pub fn other(operand: Option<OperandRef>) -> Self {
        Self {
            operand,
            kind: PredicateKind::Other,
            join_predicate: false,
            transformed: false,
        }
    }

    pub fn with_join_predicate(mut self) -> Self {
        self.join_predicate = true;
        self
    }

    pub fn with_transformed(mut self) -> Self {
        self.transformed = true;
        self
    }

    /// Slot the predicate's estimate is recorded under.
    pub fn slot(&self) -> usize {
        self.operand.map(OperandRef::slot).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_compare_across_types() {
        assert_eq!(
            ScalarValue::Int64(3).compare(&ScalarValue::float(3.5)),
            Some(Ordering::Less)
        );
        assert!(ScalarValue::Int64(3).sql_eq(&ScalarValue::float(3.0)));
        assert_ne!(ScalarValue::Int64(3), ScalarValue::float(3.0));
        assert_eq!(ScalarValue::Int64(1).compare(&ScalarValue::Utf8("1".into())), None);
        assert_eq!(ScalarValue::Null.compare(&ScalarValue::Null), None);
    }

    #[test]
    fn test_operand_slots() {
        assert_eq!(OperandRef::Column(1).slot(), 1);
        assert_eq!(OperandRef::IndexExpr(0).slot(), 1);
        assert_eq!(Predicate::other(None).slot(), 0);
    }

    #[test]
    fn test_relop_codes() {
        for code in 1..=8 {
            assert_eq!(RelOp::from_code(code).unwrap().code(), code);
        }
        assert!(matches!(
            RelOp::from_code(42),
            Err(EstimationError::UnknownOperator(_))
        ));
        assert_eq!("!=".parse::<RelOp>().unwrap(), RelOp::NotEq);
        assert_eq!(RelOp::Lt.negate(), RelOp::GtEq);
        assert_eq!(RelOp::Lt.flip(), RelOp::Gt);
    }

    #[test]
    fn test_qualifier_phase_mapping() {
        assert_eq!(QualifierPhase::Base.phase(), Phase::Scan);
        assert_eq!(QualifierPhase::FilterBase.phase(), Phase::Scan);
        assert_eq!(QualifierPhase::FilterProjection.phase(), Phase::Top);
    }
}
