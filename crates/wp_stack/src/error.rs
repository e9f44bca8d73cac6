//! Error types for stack synthesis.

use thiserror::Error;

/// Result type alias for stack operations.
pub type StackResult<T> = Result<T, StackError>;

/// Errors that can occur while building or writing the infrastructure graph.
#[derive(Error, Debug)]
pub enum StackError {
    #[error("Invalid configuration `{field}`: {message}")]
    InvalidConfig { field: String, message: String },

    #[error("Missing dependency: {0}")]
    MissingDependency(String),

    #[error("Configuration error: {0}")]
    Config(#[from] wp_config::ConfigError),

    #[error("Graph error: {0}")]
    Graph(#[from] wp_graph::GraphError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StackError {
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Whether the error comes from configuration rather than construction.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::InvalidConfig { .. } | Self::Config(_))
    }
}
