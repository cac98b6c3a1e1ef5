//! Identity and request-context header injection.
//!
//! # Responsibilities
//! - Static headers from configuration
//! - Dynamic headers: timestamp, request id, client IP, user agent,
//!   session id, correlation id
//! - User headers from the authenticated session
//!
//! # Design Decisions
//! - Runs on the outbound header map before the rewrite, so the client IP is
//!   read before the proxy appends its own hop to `X-Forwarded-For`
//! - Values that are not valid header values are skipped, never forwarded

use std::fmt::Write;
use std::net::SocketAddr;

use axum::http::header::USER_AGENT;
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use chrono::{DateTime, SecondsFormat, Utc};
use rand::Rng;

use crate::config::HeadersConfig;

use super::gate::CurrentUser;

/// Mutates outbound headers according to the `[headers]` configuration.
#[derive(Debug, Clone)]
pub struct HeaderInjector {
    config: HeadersConfig,
    custom: Vec<(HeaderName, HeaderValue)>,
}

impl HeaderInjector {
    pub fn new(config: &HeadersConfig) -> Self {
        let custom = config
            .custom
            .iter()
            .filter(|(name, value)| !name.is_empty() && !value.is_empty())
            .filter_map(|(name, value)| {
                match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
                    (Ok(name), Ok(value)) => Some((name, value)),
                    _ => {
                        tracing::warn!(header = %name, "Skipping invalid custom header");
                        None
                    }
                }
            })
            .collect();

        Self {
            config: config.clone(),
            custom,
        }
    }

    pub fn inject(&self, headers: &mut HeaderMap, user: Option<&CurrentUser>, peer: Option<SocketAddr>) {
        for (name, value) in &self.custom {
            headers.insert(name.clone(), value.clone());
        }
        self.inject_dynamic(headers, user, peer);
        if let Some(user) = user {
            self.inject_user(headers, user);
        }
    }

    fn inject_dynamic(&self, headers: &mut HeaderMap, user: Option<&CurrentUser>, peer: Option<SocketAddr>) {
        let dynamic = &self.config.dynamic;

        if dynamic.timestamp.enabled && !dynamic.timestamp.header_name.is_empty() {
            let timestamp = format_timestamp(Utc::now(), &dynamic.timestamp.format);
            set_header(headers, &dynamic.timestamp.header_name, &timestamp);
        }

        if let Some(name) = dynamic.request_id.active_name() {
            set_header(headers, name, &generate_request_id());
        }

        if let Some(name) = dynamic.client_ip.active_name() {
            let ip = client_ip(headers, peer);
            set_header(headers, name, &ip);
        }

        if let Some(name) = dynamic.user_agent.active_name() {
            let agent = headers
                .get(USER_AGENT)
                .and_then(|v| v.to_str().ok())
                .filter(|v| !v.is_empty())
                .map(str::to_string);
            if let Some(agent) = agent {
                set_header(headers, name, &agent);
            }
        }

        if let (Some(name), Some(user)) = (dynamic.session_id.active_name(), user) {
            let session_id = user.session_id.as_deref().unwrap_or(user.session.id.as_str());
            if !session_id.is_empty() {
                set_header(headers, name, session_id);
            }
        }

        if let Some(name) = dynamic.correlation_id.active_name() {
            let present = headers
                .get(name)
                .map(|v| !v.as_bytes().is_empty())
                .unwrap_or(false);
            if !present {
                set_header(headers, name, &generate_correlation_id());
            }
        }
    }

    fn inject_user(&self, headers: &mut HeaderMap, user: &CurrentUser) {
        let session = &user.session;
        let pairs = [
            (&self.config.user_id, &session.id),
            (&self.config.user_email, &session.email),
            (&self.config.user_name, &session.name),
        ];
        for (name, value) in pairs {
            if !name.is_empty() && !value.is_empty() {
                set_header(headers, name, value);
            }
        }

        if !self.config.user_groups.is_empty() {
            let groups = session.groups();
            if !groups.is_empty() {
                set_header(headers, &self.config.user_groups, &groups.join(","));
            }
        }
    }
}

fn set_header(headers: &mut HeaderMap, name: &str, value: &str) {
    match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
        (Ok(name), Ok(value)) => {
            headers.insert(name, value);
        }
        _ => tracing::debug!(header = %name, "Skipping header with invalid name or value"),
    }
}

/// Render `now` in one of the named formats, else as a strftime pattern.
pub fn format_timestamp(now: DateTime<Utc>, format: &str) -> String {
    match format {
        "unix" => now.timestamp().to_string(),
        "unix_nano" => now.timestamp_nanos_opt().unwrap_or_default().to_string(),
        "rfc3339" | "iso8601" | "" => now.to_rfc3339_opts(SecondsFormat::Secs, true),
        "rfc3339_nano" => now.to_rfc3339_opts(SecondsFormat::Nanos, true),
        pattern => {
            let mut out = String::new();
            // An invalid pattern surfaces as a fmt error rather than a panic.
            if write!(out, "{}", now.format(pattern)).is_err() {
                return now.to_rfc3339_opts(SecondsFormat::Secs, true);
            }
            out
        }
    }
}

fn random_hex<const N: usize>() -> String {
    let mut bytes = [0u8; N];
    rand::thread_rng().fill(&mut bytes[..]);
    bytes.iter().fold(String::with_capacity(N * 2), |mut out, b| {
        let _ = write!(out, "{:02x}", b);
        out
    })
}

/// `req_` followed by 32 hex characters.
pub fn generate_request_id() -> String {
    format!("req_{}", random_hex::<16>())
}

/// `corr_` followed by 24 hex characters.
pub fn generate_correlation_id() -> String {
    format!("corr_{}", random_hex::<12>())
}

/// Best guess at the originating client address.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    if let Some(first) = header("x-forwarded-for").and_then(|xff| xff.split(',').next()) {
        let first = first.trim();
        if !first.is_empty() {
            return first.to_string();
        }
    }
    if let Some(ip) = header("x-real-ip").or_else(|| header("cf-connecting-ip")) {
        return ip.to_string();
    }
    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
