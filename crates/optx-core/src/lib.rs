//! # optx-core: Selectivity and Access-Path Cost Estimation
//!
//! This crate holds everything the optimizer needs to put numbers on a candidate access path:
//! how many rows survive its predicates in each phase, and what scanning, looking up and
//! projecting those rows costs. It also owns the arena representation of boolean predicate
//! trees that `optx-rewrite` normalizes.
//!
//! ## Module Overview
//!
//! - **`expr`**: Scalar values and their comparator, operand references, relational operators,
//!   and the predicate shape the estimator consumes.
//! - **`stats`**: The `StatisticsProvider` contract and an in-memory implementation.
//! - **`catalog`**: Catalog trait handing out shared statistics per table.
//! - **`selectivity`**: The closed family of selectivity estimates and sqrt-leveling composition.
//! - **`scan`**: The per-access-path `ScanCostEstimator`.
//! - **`cost`**: `Cost` and the batched index-lookup cost model.
//! - **`tree`**: Arena-backed predicate trees and their serde form.
//! - **`config`**: `OptimizerConfig`, the explicit source of every tunable.
//! - **`error`**: Error types.

pub mod catalog;
pub mod config;
pub mod cost;
pub mod error;
pub mod expr;
pub mod scan;
pub mod selectivity;
pub mod stats;
pub mod tree;
