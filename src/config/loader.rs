//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::GateConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Environment variable overriding `telegram.token`.
pub const ENV_TELEGRAM_TOKEN: &str = "GATE_TELEGRAM_TOKEN";
/// Environment variable overriding `payments.token`.
pub const ENV_PAYMENTS_TOKEN: &str = "GATE_PAYMENTS_TOKEN";
/// Environment variable overriding `admin.api_key`.
pub const ENV_ADMIN_API_KEY: &str = "GATE_ADMIN_API_KEY";
/// Environment variable overriding `store.database_url`.
pub const ENV_DATABASE_URL: &str = "GATE_DATABASE_URL";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load, apply environment overrides and validate configuration.
///
/// Without a path the built-in defaults are used as the base.
pub fn load_config(path: Option<&Path>) -> Result<GateConfig, ConfigError> {
    let mut config = match path {
        Some(path) => {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content)?
        }
        None => GateConfig::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Overlay secrets from the environment so they stay out of config files.
pub fn apply_env_overrides<F>(config: &mut GateConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(token) = lookup(ENV_TELEGRAM_TOKEN) {
        config.telegram.token = token;
    }
    if let Some(token) = lookup(ENV_PAYMENTS_TOKEN) {
        config.payments.token = Some(token);
    }
    if let Some(key) = lookup(ENV_ADMIN_API_KEY) {
        config.admin.api_key = key;
    }
    if let Some(url) = lookup(ENV_DATABASE_URL) {
        config.store.database_url = url;
    }
}
