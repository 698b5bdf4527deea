//! # HTTP Route Handlers
//!
//! Axum handlers for everything except `/estimate`, which lives in [`crate::estimate`].
//!
//! ## Error Handling
//!
//! Errors are returned as HTTP status codes with descriptive messages:
//! - 400 Bad Request: input the estimator or cost model cannot work with
//! - 404 Not Found: an estimation names a table nobody published statistics for
//!
//! Bodies that do not decode (including unknown relational operators) are rejected by axum's
//! `Json` extractor before a handler runs.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use optx_core::catalog::TableRef;
use optx_core::config::OptimizerConfig;
use optx_core::cost::{BatchedLookupCost, LookupCostModel};
use optx_core::tree::{Expr, PredicateTree};
use optx_rewrite::cnf::is_cnf;
use optx_rewrite::BooleanRewriter;

use crate::estimate::{build_statistics, ColumnStatsEntry};
use crate::state::AppState;

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
}

/// GET /config: the configuration every request is served with.
pub async fn get_config(State(state): State<Arc<AppState>>) -> Json<OptimizerConfig> {
    Json(state.config.clone())
}

/// GET /stages: rewrite stages in the order `/normalize` runs them.
pub async fn list_stages(State(state): State<Arc<AppState>>) -> Json<StagesResponse> {
    let stages = state
        .rewriter
        .stage_names()
        .into_iter()
        .map(str::to_string)
        .collect();
    Json(StagesResponse { stages })
}

#[derive(Serialize)]
pub struct StagesResponse {
    pub stages: Vec<String>,
}

// ---- Lookup cost ----

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupCostRequest {
    pub rows: f64,
    /// Defaults to the configured open latency.
    #[serde(default)]
    pub open_latency: Option<f64>,
    /// Defaults to the configured close latency.
    #[serde(default)]
    pub close_latency: Option<f64>,
    #[serde(default)]
    pub is_olap: bool,
}

#[derive(Debug, Serialize)]
pub struct LookupCostResponse {
    pub cost: f64,
}

/// POST /lookup-cost: batched remote-lookup cost of fetching `rows` base rows.
pub async fn lookup_cost(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LookupCostRequest>,
) -> Result<Json<LookupCostResponse>, (StatusCode, String)> {
    let open = req.open_latency.unwrap_or(state.config.index_lookup_open_latency);
    let close = req.close_latency.unwrap_or(state.config.index_lookup_close_latency);
    if !req.rows.is_finite() || !open.is_finite() || !close.is_finite() {
        return Err((
            StatusCode::BAD_REQUEST,
            "rows and latencies must be finite".to_string(),
        ));
    }

    let model = BatchedLookupCost::from_config(&state.config);
    let cost = model.lookup_cost(req.rows, open, close, req.is_olap);
    debug!(rows = req.rows, is_olap = req.is_olap, cost = cost.total, "lookup cost");
    Ok(Json(LookupCostResponse { cost: cost.total }))
}

// ---- Normalization ----

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizeRequest {
    pub expr: Expr,
    /// Overrides the configured DNF expansion budget for this request.
    #[serde(default)]
    pub max_derived_cnf_predicates: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizeResponse {
    pub expr: Expr,
    pub rendered: String,
    pub is_cnf: bool,
    /// Arena size of the normalized tree.
    pub nodes: usize,
}

/// POST /normalize: rewrite a predicate tree into conjunctive normal form.
pub async fn normalize(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NormalizeRequest>,
) -> Json<NormalizeResponse> {
    let tree = PredicateTree::from_expr(&req.expr);
    let normalized = match req.max_derived_cnf_predicates {
        Some(max_derived_cnf_predicates) => {
            let config = OptimizerConfig {
                max_derived_cnf_predicates,
                ..state.config.clone()
            };
            BooleanRewriter::from_config(&config).normalize(tree)
        }
        None => state.rewriter.normalize(tree),
    };

    Json(NormalizeResponse {
        expr: normalized.to_expr(),
        rendered: normalized.to_string(),
        is_cnf: is_cnf(&normalized),
        nodes: normalized.len(),
    })
}

// ---- Catalog ----

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterTableRequest {
    pub table: TableRef,
    pub row_count: f64,
    #[serde(default)]
    pub columns: Vec<ColumnStatsEntry>,
}

#[derive(Debug, Serialize)]
pub struct RegisterTableResponse {
    pub table: String,
    pub columns: usize,
}

/// POST /tables: publish (or replace) a table's statistics.
pub async fn register_table(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterTableRequest>,
) -> Result<(StatusCode, Json<RegisterTableResponse>), (StatusCode, String)> {
    if !req.row_count.is_finite() || req.row_count < 0.0 {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("rowCount must be a non-negative number, got {}", req.row_count),
        ));
    }

    let stats = build_statistics(req.row_count, &req.columns, &state.config);
    state.catalog.add_table(&req.table, stats);
    debug!(table = %req.table, columns = req.columns.len(), "table statistics published");

    Ok((
        StatusCode::CREATED,
        Json(RegisterTableResponse {
            table: req.table.to_string(),
            columns: req.columns.len(),
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimate::{estimate, EstimateRequest};
    use optx_core::expr::{ColumnRef, RelOp, ScalarValue};

    fn state() -> Arc<AppState> {
        Arc::new(AppState::default())
    }

    fn eq(name: &str, v: i64) -> Expr {
        Expr::compare(ColumnRef::new("t", name, 0), RelOp::Eq, ScalarValue::Int64(v))
    }

    #[tokio::test]
    async fn test_single_row_lookup_is_one_row_of_cost() {
        let req = LookupCostRequest {
            rows: 1.0,
            open_latency: None,
            close_latency: None,
            is_olap: false,
        };
        let Json(resp) = lookup_cost(State(state()), Json(req)).await.unwrap();
        assert_eq!(resp.cost, 125.0);
    }

    #[tokio::test]
    async fn test_non_finite_rows_are_rejected() {
        let req = LookupCostRequest {
            rows: f64::NAN,
            open_latency: None,
            close_latency: None,
            is_olap: false,
        };
        let err = lookup_cost(State(state()), Json(req)).await.unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_normalize_reports_cnf() {
        let req = NormalizeRequest {
            expr: Expr::disjunction([eq("a", 1), eq("a", 2)]),
            max_derived_cnf_predicates: None,
        };
        let Json(resp) = normalize(State(state()), Json(req)).await;
        assert!(resp.is_cnf);
        assert_eq!(resp.rendered, "(t.a IN (1, 2) AND TRUE)");
        assert_eq!(resp.nodes, 3);
    }

    #[tokio::test]
    async fn test_normalize_budget_override() {
        let dnf = Expr::or(
            Expr::and(eq("a", 1), eq("b", 2)),
            Expr::and(eq("c", 3), eq("d", 4)),
        );
        let kept = NormalizeRequest {
            expr: dnf.clone(),
            max_derived_cnf_predicates: Some(1),
        };
        let Json(resp) = normalize(State(state()), Json(kept)).await;
        assert!(resp.is_cnf);
        assert!(resp.rendered.starts_with("(((t.a = 1 AND"));

        let expanded = NormalizeRequest {
            expr: dnf,
            max_derived_cnf_predicates: None,
        };
        let Json(resp) = normalize(State(state()), Json(expanded)).await;
        assert!(resp.rendered.starts_with("((t.a = 1 OR (t.c = 3 OR FALSE)) AND"));
    }

    #[tokio::test]
    async fn test_registered_table_is_used_by_estimate() {
        let state = state();
        let register: RegisterTableRequest = serde_json::from_str(
            r#"{
                "table": { "schema": "sales", "name": "orders" },
                "rowCount": 10000.0,
                "columns": [
                    { "operand": { "Column": 1 }, "distinct_count": 100.0, "null_fraction": 0.0,
                      "min_value": { "Int64": 0 }, "max_value": { "Int64": 100 } }
                ]
            }"#,
        )
        .unwrap();
        let (status, _) = register_table(State(state.clone()), Json(register))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::CREATED);

        let req: EstimateRequest = serde_json::from_str(
            r#"{
                "accessPath": { "name": "orders_pk" },
                "table": { "schema": "sales", "name": "orders" },
                "predicates": [
                    { "operand": { "Column": 1 },
                      "kind": { "Compare": { "op": "=", "value": { "Int64": 7 } } },
                      "phase": "Base" },
                    { "operand": { "Column": 2 },
                      "kind": { "Compare": { "op": "=", "value": { "Int64": 7 } } } }
                ]
            }"#,
        )
        .unwrap();
        let Json(resp) = estimate(State(state), Json(req)).await.unwrap();
        assert_eq!(resp.row_count, 10000.0);
        assert_eq!(resp.estimates.len(), 2);
        assert!((resp.base_selectivity - 0.01).abs() < 1e-9);
        assert_eq!(resp.missing_statistics.len(), 1);
        assert!(resp.total_selectivity < resp.base_selectivity);
    }

    #[tokio::test]
    async fn test_estimate_for_unknown_table_is_not_found() {
        let req: EstimateRequest = serde_json::from_str(
            r#"{
                "accessPath": { "name": "t" },
                "table": { "schema": "s", "name": "missing" },
                "predicates": []
            }"#,
        )
        .unwrap();
        let err = estimate(State(state()), Json(req)).await.unwrap_err();
        assert_eq!(err.0, StatusCode::NOT_FOUND);
    }
}
