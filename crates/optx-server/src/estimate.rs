//! # Access-Path Estimation Endpoint
//!
//! Runs one `ScanCostEstimator` over the predicates of a single access path and reports the
//! per-phase selectivities, the cost breakdown and the operands that had no statistics.
//!
//! ## Wire Protocol
//!
//! - Request: `POST /estimate` with JSON body (`EstimateRequest`)
//! - Response: JSON body (`EstimateResponse`)
//!
//! Statistics come from the catalog when `table` names a published table, and from the
//! inline `columns` otherwise. Predicates use the core serde form, e.g.
//!
//! ```text
//! { "operand": { "Column": 1 },
//!   "kind": { "Compare": { "op": "<", "value": { "Int64": 10 } } },
//!   "phase": "Base" }
//! ```
//!
//! An operator outside the known set is rejected while decoding the body.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use optx_core::catalog::{Catalog, TableRef};
use optx_core::config::OptimizerConfig;
use optx_core::expr::{OperandRef, Phase, Predicate, QualifierPhase};
use optx_core::scan::{AccessPath, AccessPathCost, ScanCostEstimator};
use optx_core::selectivity::SelectivityEstimate;
use optx_core::stats::{ColumnStatistics, StatisticsProvider, TableStatistics};

use crate::state::AppState;

/// Row count assumed when neither the request nor the catalog knows the table size.
const DEFAULT_ROW_COUNT: f64 = 1000.0;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EstimateRequest {
    pub access_path: AccessPath,
    /// Published table whose statistics to use. Takes precedence over `columns`.
    #[serde(default)]
    pub table: Option<TableRef>,
    /// Inline per-operand statistics.
    #[serde(default)]
    pub columns: Vec<ColumnStatsEntry>,
    /// Rows in the table; falls back to the catalog, then to a fixed default.
    #[serde(default)]
    pub row_count: Option<f64>,
    pub predicates: Vec<PhasedPredicate>,
}

/// Statistics of one operand.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnStatsEntry {
    pub operand: OperandRef,
    #[serde(flatten)]
    pub stats: ColumnStatistics,
}

/// A predicate and the phase it is evaluated in.
#[derive(Debug, Deserialize)]
pub struct PhasedPredicate {
    #[serde(flatten)]
    pub predicate: Predicate,
    #[serde(default = "default_phase")]
    pub phase: QualifierPhase,
}

fn default_phase() -> QualifierPhase {
    QualifierPhase::FilterBase
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EstimateResponse {
    pub access_path: String,
    pub row_count: f64,
    pub total_selectivity: f64,
    /// Key-range (`Base`) qualifiers only.
    pub base_selectivity: f64,
    /// `Base` and `FilterBase` qualifiers.
    pub scan_selectivity: f64,
    /// `FilterProjection` qualifiers only.
    pub projection_selectivity: f64,
    pub cost: AccessPathCost,
    pub total_cost: f64,
    pub estimates: Vec<SelectivityEstimate>,
    pub missing_statistics: Vec<OperandRef>,
}

// ---------------------------------------------------------------------------
// Handler
// ---------------------------------------------------------------------------

/// POST /estimate: estimate selectivity and cost of one access path.
pub async fn estimate(
    State(state): State<Arc<AppState>>,
    Json(req): Json<EstimateRequest>,
) -> Result<Json<EstimateResponse>, (StatusCode, String)> {
    let (stats, catalog_rows) = resolve_statistics(&state, &req)?;
    let row_count = req
        .row_count
        .or(catalog_rows)
        .unwrap_or(DEFAULT_ROW_COUNT);

    let mut estimator = ScanCostEstimator::new(req.access_path, stats, state.config.clone());
    for phased in &req.predicates {
        estimator
            .add_predicate(&phased.predicate, phased.phase)
            .map_err(|e| (StatusCode::BAD_REQUEST, format!("Estimation failed: {}", e)))?;
    }

    let cost = estimator.estimate_cost(row_count);
    let estimates = estimator
        .estimates(Phase::Scan)
        .chain(estimator.estimates(Phase::Top))
        .cloned()
        .collect();

    Ok(Json(EstimateResponse {
        access_path: estimator.access_path().name.clone(),
        row_count,
        total_selectivity: estimator.total_selectivity(),
        base_selectivity: estimator.phase_selectivity(&[QualifierPhase::Base]),
        scan_selectivity: estimator
            .phase_selectivity(&[QualifierPhase::Base, QualifierPhase::FilterBase]),
        projection_selectivity: estimator.phase_selectivity(&[QualifierPhase::FilterProjection]),
        total_cost: cost.total().total,
        cost,
        estimates,
        missing_statistics: estimator.missing_statistics().iter().copied().collect(),
    }))
}

/// Statistics for the request, plus the table's row count when the catalog knows it.
fn resolve_statistics(
    state: &AppState,
    req: &EstimateRequest,
) -> Result<(Arc<dyn StatisticsProvider>, Option<f64>), (StatusCode, String)> {
    match &req.table {
        Some(table) => {
            let stats = state.catalog.get_statistics(table).ok_or_else(|| {
                (
                    StatusCode::NOT_FOUND,
                    format!("No statistics published for table {}", table),
                )
            })?;
            Ok((stats, state.catalog.row_count(table)))
        }
        None => {
            let row_count = req.row_count.unwrap_or(DEFAULT_ROW_COUNT);
            let stats = build_statistics(row_count, &req.columns, &state.config);
            Ok((Arc::new(stats), None))
        }
    }
}

/// In-memory statistics from inline column entries, with the configured no-statistics
/// fallbacks.
pub fn build_statistics(
    row_count: f64,
    columns: &[ColumnStatsEntry],
    config: &OptimizerConfig,
) -> TableStatistics {
    let stats = TableStatistics::new(row_count).with_fallbacks(config);
    columns.iter().fold(stats, |stats, entry| {
        stats.with_column(entry.operand, entry.stats.clone())
    })
}
