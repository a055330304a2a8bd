//! Canonical types and configuration for the kvitto reconciliation engine.
//!
//! Everything downstream of a provider adapter works exclusively with the
//! normalized types defined here — no provider-specific shapes escape the
//! adapter boundary.

mod amount;
mod app_config;
mod config;
mod providers;
mod types;

pub use amount::{from_minor_units, to_minor_units, AmountError};
pub use app_config::{AppConfig, Environment};
pub use config::{load_app_config, load_app_config_from_env};
pub use providers::{load_providers, ProviderAppConfig, ProviderRegistry};
pub use types::{
    Address, CacheEntry, DeviceStatus, LocationMapping, LocationStatus, MatchResult, MatchType,
    NormalizedDevice, NormalizedLocation, NormalizedTransaction, ProviderId, TransactionStatus,
};

use thiserror::Error;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("failed to read provider registry {path}: {source}")]
    RegistryIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse provider registry: {0}")]
    RegistryParse(#[from] serde_yaml::Error),

    #[error("provider registry validation failed: {0}")]
    Validation(String),
}
