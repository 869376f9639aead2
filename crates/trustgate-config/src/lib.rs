//! Deployment configuration for the trustgate security token service.
//!
//! The configuration is a plain serde value. It is read once at startup from a
//! TOML file plus `TRUSTGATE__*` environment overrides, validated, and then
//! handed to the engine builder. Nothing in the engine reads configuration at
//! request time.
//!
//! ```toml
//! [sts]
//! issuer = "https://sts.example.com"
//! encrypt_issued_token = false
//!
//! [lifetime]
//! default = "5m"
//! max = "12h"
//!
//! [[services]]
//! endpoints = ["https://app.example.com/service.*"]
//! token_type = "saml2.0"
//! ```

pub mod keys;
pub mod loader;
pub mod settings;

pub use keys::{decode_secret, SecretEncoding};
pub use loader::{load_config, load_config_from_str, ENV_PREFIX};
pub use settings::*;

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration source could not be read or deserialized.
    #[error("Failed to load configuration: {0}")]
    Load(String),

    /// A value is present but not acceptable.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// A required value is absent.
    #[error("Missing configuration value: {0}")]
    Missing(String),
}

impl ConfigError {
    /// Creates a new `InvalidValue` error.
    #[must_use]
    pub fn invalid_value(message: impl Into<String>) -> Self {
        Self::InvalidValue(message.into())
    }

    /// Creates a new `Missing` error.
    #[must_use]
    pub fn missing(message: impl Into<String>) -> Self {
        Self::Missing(message.into())
    }
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        Self::Load(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;
