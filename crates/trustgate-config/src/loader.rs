//! Layered configuration loading: TOML file, then environment overrides.

use std::path::{Path, PathBuf};

use config::{Config, Environment, File, FileFormat};

use crate::{ConfigError, StsConfig};

/// Prefix for environment overrides, e.g. `TRUSTGATE__STS__ISSUER=https://sts`.
pub const ENV_PREFIX: &str = "TRUSTGATE";

const DEFAULT_CONFIG_FILE: &str = "trustgate.toml";

/// Loads and validates configuration.
///
/// With no explicit path the loader looks for `trustgate.toml` in the working
/// directory and silently continues without it. An explicit path that does not
/// exist is an error.
pub fn load_config(path: Option<&Path>) -> Result<StsConfig, ConfigError> {
    let mut builder = Config::builder();
    match path {
        Some(p) => {
            if !p.exists() {
                return Err(ConfigError::Load(format!(
                    "config file {} not found",
                    p.display()
                )));
            }
            builder = builder.add_source(File::from(p.to_path_buf()));
        }
        None => {
            let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
            if default_path.exists() {
                builder = builder.add_source(File::from(default_path));
            }
        }
    }
    builder = builder.add_source(environment());

    let config: StsConfig = builder.build()?.try_deserialize()?;
    config.validate()?;

    tracing::debug!(
        issuer = %config.sts.issuer,
        services = config.services.len(),
        realms = config.realms.len(),
        "Configuration loaded"
    );
    Ok(config)
}

/// Loads configuration from an in-memory TOML document plus environment
/// overrides.
pub fn load_config_from_str(toml: &str) -> Result<StsConfig, ConfigError> {
    let config: StsConfig = Config::builder()
        .add_source(File::from_str(toml, FileFormat::Toml))
        .add_source(environment())
        .build()?
        .try_deserialize()?;
    config.validate()?;
    Ok(config)
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("__")
        .try_parsing(true)
        .separator("__")
}
