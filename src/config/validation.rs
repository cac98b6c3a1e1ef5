//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, ports valid)
//! - Reject header names the HTTP stack would refuse at request time
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use axum::http::HeaderName;
use thiserror::Error;

use crate::config::schema::{DynamicHeader, ProxyConfig};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid address for {field}: '{value}'")]
    InvalidAddress { field: &'static str, value: String },

    #[error("backend host must not be empty")]
    EmptyBackendHost,

    #[error("backend port must be non-zero")]
    InvalidBackendPort,

    #[error("unsupported backend scheme '{0}' (only http is supported)")]
    UnsupportedScheme(String),

    #[error("{0} must be greater than zero")]
    ZeroValue(&'static str),

    #[error("invalid header name for {field}: '{value}'")]
    InvalidHeaderName { field: String, value: String },

    #[error("timestamp header format must not be empty")]
    EmptyTimestampFormat,
}

/// Check a parsed configuration, collecting every error found.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_address(&mut errors, "listener.bind_address", &config.listener.bind_address);
    if config.observability.metrics_enabled {
        check_address(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }

    if config.backend.host.trim().is_empty() {
        errors.push(ValidationError::EmptyBackendHost);
    }
    if config.backend.port == 0 {
        errors.push(ValidationError::InvalidBackendPort);
    }
    if !config.backend.scheme.eq_ignore_ascii_case("http") {
        errors.push(ValidationError::UnsupportedScheme(config.backend.scheme.clone()));
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::ZeroValue("timeouts.request_secs"));
    }
    if config.session.cleanup_interval_secs == 0 {
        errors.push(ValidationError::ZeroValue("session.cleanup_interval_secs"));
    }

    let headers = &config.headers;
    for (field, name) in [
        ("headers.user_id", &headers.user_id),
        ("headers.user_email", &headers.user_email),
        ("headers.user_name", &headers.user_name),
        ("headers.user_groups", &headers.user_groups),
    ] {
        if !name.is_empty() {
            check_header_name(&mut errors, field.to_string(), name);
        }
    }
    for name in headers.custom.keys() {
        check_header_name(&mut errors, format!("headers.custom.{}", name), name);
    }

    let dynamic = &headers.dynamic;
    let generated: [(&str, &DynamicHeader); 5] = [
        ("request_id", &dynamic.request_id),
        ("client_ip", &dynamic.client_ip),
        ("user_agent", &dynamic.user_agent),
        ("session_id", &dynamic.session_id),
        ("correlation_id", &dynamic.correlation_id),
    ];
    for (field, header) in generated {
        if let Some(name) = header.active_name() {
            check_header_name(&mut errors, format!("headers.dynamic.{}", field), name);
        }
    }
    if dynamic.timestamp.enabled {
        check_header_name(
            &mut errors,
            "headers.dynamic.timestamp".to_string(),
            &dynamic.timestamp.header_name,
        );
        if dynamic.timestamp.format.trim().is_empty() {
            errors.push(ValidationError::EmptyTimestampFormat);
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        });
    }
}

fn check_header_name(errors: &mut Vec<ValidationError>, field: String, value: &str) {
    if HeaderName::from_bytes(value.as_bytes()).is_err() {
        errors.push(ValidationError::InvalidHeaderName {
            field,
            value: value.to_string(),
        });
    }
}
