//! # wp_config
//!
//! Environment profiles for the WordPress infrastructure graph.
//!
//! A profile is a static, validated record selecting every
//! environment-specific parameter: network ranges, database shape,
//! container sizing and the delivery mode. Exactly one profile is active
//! per synthesis.
//!
//! ## Example
//!
//! ```rust,no_run
//! use wp_config::ProfileCatalog;
//!
//! let catalog = ProfileCatalog::builtin().unwrap();
//! // Absent or unknown selectors resolve to "dev".
//! let profile = catalog.resolve(std::env::var("ENVIRONMENT_NAME").ok().as_deref());
//! println!("{}", profile.prefix());
//! ```

pub mod error;
pub mod profile;
pub mod resolver;

pub use error::{ConfigError, ConfigResult};
pub use profile::{
    CapacityUnit, DatabaseConfig, EcsConfig, NetworkConfig, Profile, ProfileReport,
    ProvisionedConfig, RepositoryConfig, ServerlessConfig, AUTO_PAUSE_MINUTES, AZ_COUNT,
    RESERVED_SUBNET_BLOCKS,
};
pub use resolver::{resolve, ProfileCatalog, DEFAULT_PROFILE};
