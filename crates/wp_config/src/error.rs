//! Error types for profile resolution.

use thiserror::Error;

/// Result type alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors that can occur while loading or validating a profile.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid profile field `{field}`: {message}")]
    Invalid { field: String, message: String },

    #[error("Duplicate profile name: {0}")]
    DuplicateProfile(String),

    #[error("Default profile missing from catalog: {0}")]
    MissingDefault(String),

    #[error("Capacity value {0} is not one of 1, 2, 4, 8, 16, 32, 64")]
    UnsupportedCapacity(u32),

    #[error("Profile document {name} is malformed: {source}")]
    Malformed {
        name: String,
        #[source]
        source: serde_yaml::Error,
    },
}

impl ConfigError {
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Name of the offending field, when the error is tied to one.
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::Invalid { field, .. } => Some(field),
            _ => None,
        }
    }
}
