//! # optx-server: HTTP Service for Selectivity and Cost Estimation
//!
//! Exposes the access-path estimator and the boolean rewriter of the optx crates as a network
//! service, so a planner written in another language can cost candidate access paths and
//! normalize filter predicates without linking against Rust.
//!
//! ## Endpoints
//!
//! - `GET  /health`       - Health check
//! - `GET  /config`       - Active optimizer configuration
//! - `GET  /stages`       - Rewrite stages in pipeline order
//! - `POST /estimate`     - Selectivity and cost of one access path
//! - `POST /lookup-cost`  - Batched index-lookup cost for a row count
//! - `POST /normalize`    - Normalize a predicate tree into CNF
//! - `POST /tables`       - Publish table statistics for later estimations
//!
//! ## Configuration
//!
//! - `OPTX_CONFIG`: path to a JSON `OptimizerConfig`; unset means defaults.
//! - `OPTX_LISTEN_ADDR`: listen address, `0.0.0.0:3000` by default.
//! - `RUST_LOG`: log filter; debug output of the optx crates is always enabled.

mod estimate;
mod routes;
mod state;

use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use optx_core::config::OptimizerConfig;

const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:3000";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut filter = EnvFilter::from_default_env();
    for directive in ["optx_core=debug", "optx_rewrite=debug", "optx_server=debug"] {
        filter = filter.add_directive(directive.parse()?);
    }
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = match std::env::var("OPTX_CONFIG") {
        Ok(path) => {
            let config = OptimizerConfig::load_from_file(&path)?;
            tracing::info!(path = %path, "loaded optimizer configuration");
            config
        }
        Err(_) => OptimizerConfig::default(),
    };
    let state = Arc::new(state::AppState::new(config));

    let app = Router::new()
        .route("/health", get(routes::health))
        .route("/config", get(routes::get_config))
        .route("/stages", get(routes::list_stages))
        .route("/estimate", post(estimate::estimate))
        .route("/lookup-cost", post(routes::lookup_cost))
        .route("/normalize", post(routes::normalize))
        .route("/tables", post(routes::register_table))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = std::env::var("OPTX_LISTEN_ADDR").unwrap_or_else(|_| DEFAULT_LISTEN_ADDR.to_string());
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("optx-server listening on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}
