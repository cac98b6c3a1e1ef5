//! Configuration loading from disk and the environment.

use std::env;
use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::ProxyConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for {var}: '{value}'")]
    Env { var: &'static str, value: String },

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration.
///
/// With no path, defaults are used. Environment overrides are applied on top
/// of the file before validation.
pub fn load_config(path: Option<&Path>) -> Result<ProxyConfig, ConfigError> {
    let mut config = match path {
        Some(path) => {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content)?
        }
        None => ProxyConfig::default(),
    };

    apply_env_overrides(&mut config, |var| env::var(var).ok())?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Apply the supported environment variables, read through `lookup`.
pub fn apply_env_overrides<F>(config: &mut ProxyConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let host = lookup("MCP_HOST");
    let port = lookup("MCP_PORT");
    if host.is_some() || port.is_some() {
        let current = config.listener.bind_address.clone();
        let (current_host, current_port) = current.rsplit_once(':').unwrap_or((current.as_str(), "8080"));
        let host = host.as_deref().unwrap_or(current_host);
        let port = match port {
            Some(value) => parse_port("MCP_PORT", value)?.to_string(),
            None => current_port.to_string(),
        };
        config.listener.bind_address = format!("{}:{}", host, port);
    }

    if let Some(value) = lookup("MCP_TARGET_HOST") {
        config.backend.host = value;
    }
    if let Some(value) = lookup("MCP_TARGET_PORT") {
        config.backend.port = parse_port("MCP_TARGET_PORT", value)?;
    }
    if let Some(value) = lookup("MCP_TARGET_SCHEME") {
        config.backend.scheme = value;
    }
    if let Some(value) = lookup("AUTH_MODE") {
        config.auth.mode = value.parse().map_err(|_| ConfigError::Env {
            var: "AUTH_MODE",
            value,
        })?;
    }
    if let Some(value) = lookup("LOG_LEVEL") {
        config.observability.log_level = value;
    }

    Ok(())
}

fn parse_port(var: &'static str, value: String) -> Result<u16, ConfigError> {
    value.parse().map_err(|_| ConfigError::Env { var, value })
}
