//! # Application State
//!
//! Shared state available to all HTTP request handlers, created once at startup and shared
//! via `Arc` across concurrent requests.
//!
//! ## Components
//!
//! - **Config**: The `OptimizerConfig` every estimator and the rewriter are built from.
//! - **Rewriter**: Stateless, so one instance serves every `/normalize` request.
//! - **Catalog**: Table statistics published through `POST /tables`. Each estimation takes a
//!   snapshot (`Arc`) of the table's statistics, so publishing new ones never blocks or
//!   disturbs an estimation in flight.

use optx_core::catalog::InMemoryCatalog;
use optx_core::config::OptimizerConfig;
use optx_rewrite::BooleanRewriter;
use std::sync::Arc;

pub struct AppState {
    pub config: OptimizerConfig,
    pub rewriter: BooleanRewriter,
    pub catalog: Arc<InMemoryCatalog>,
}

impl AppState {
    pub fn new(config: OptimizerConfig) -> Self {
        Self {
            rewriter: BooleanRewriter::from_config(&config),
            catalog: Arc::new(InMemoryCatalog::new()),
            config,
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(OptimizerConfig::default())
    }
}
