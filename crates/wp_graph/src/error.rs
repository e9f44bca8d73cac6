//! Error types for graph construction.

use thiserror::Error;

use crate::id::LogicalId;

/// Result type alias for graph operations.
pub type GraphResult<T> = Result<T, GraphError>;

/// Errors raised while declaring or rendering a resource graph.
#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Invalid logical id '{0}': must be 1-255 alphanumeric characters")]
    InvalidId(String),

    #[error("Logical id already declared: {0}")]
    DuplicateId(LogicalId),

    #[error("{node} references {missing}, which has not been declared")]
    UnresolvedReference { node: String, missing: LogicalId },

    #[error("Output already declared: {0}")]
    DuplicateOutput(String),

    #[error("Invalid CIDR {cidr}: {message}")]
    InvalidCidr { cidr: String, message: String },

    #[error("JSON rendering failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML rendering failed: {0}")]
    Yaml(#[from] serde_yaml::Error),
}
