//! Error types.
//!
//! Most problems met while estimating degrade to a conservative default and never show up
//! here. What remains are internal contract violations (`EstimationError`), arena failures the
//! rewriter recovers from (`RewriteError`), and configuration problems (`ConfigError`).

use thiserror::Error;

use crate::tree::NodeId;

/// Fatal for the access path being costed.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EstimationError {
    #[error("Unknown relational operator: {0}")]
    UnknownOperator(String),
    #[error("Range estimate has neither a start nor a stop bound")]
    UnboundedRange,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RewriteError {
    #[error("Node {0} does not exist in the predicate tree")]
    DanglingNode(NodeId),
    #[error("Predicate tree exceeded its limit of {0} nodes")]
    NodeLimitExceeded(usize),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Config parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
