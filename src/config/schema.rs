//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the authenticating proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// The single upstream service.
    pub backend: BackendConfig,

    /// Retry configuration for non-streaming requests.
    pub retries: RetryConfig,

    /// Circuit breaker protecting the backend.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Authentication gate settings.
    pub auth: AuthConfig,

    /// Identity and request headers injected before dispatch.
    pub headers: HeadersConfig,

    /// In-memory session store settings.
    pub session: SessionConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Security response headers.
    pub security: SecurityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Deadline for a buffered request, retries and backoff included.
    /// Streaming requests are exempt.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

impl TimeoutConfig {
    pub fn request(&self) -> Duration {
        Duration::from_secs(self.request_secs)
    }
}

/// Backend target configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BackendConfig {
    /// URL scheme of the backend.
    pub scheme: String,

    /// Backend host name or IP.
    pub host: String,

    /// Backend port.
    pub port: u16,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            scheme: "http".to_string(),
            host: "localhost".to_string(),
            port: 3000,
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts, the first one included.
    pub max_attempts: u32,

    /// Fixed delay between attempts in milliseconds.
    pub backoff_ms: u64,

    /// Request bodies with a declared length up to this size are buffered
    /// so they can be replayed. 0 disables buffering.
    pub replay_buffer_bytes: usize,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_ms: 100,
            replay_buffer_bytes: 1024 * 1024,
        }
    }
}

impl RetryConfig {
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit.
    pub threshold: u32,

    /// Time the circuit stays open before a trial request is let through, in milliseconds.
    pub timeout_ms: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            threshold: 5,
            timeout_ms: 60_000,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// How inbound requests are authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// Resolve the user from a session cookie.
    #[default]
    Session,
    /// Attach a fixed synthetic user to every request.
    Bypass,
}

impl std::str::FromStr for AuthMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "session" | "oidc" => Ok(AuthMode::Session),
            "bypass" => Ok(AuthMode::Bypass),
            other => Err(format!("unknown auth mode '{}'", other)),
        }
    }
}

/// Authentication gate configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    pub mode: AuthMode,

    /// Cookie carrying the session id.
    pub cookie_name: String,

    /// Paths served without authentication.
    pub public_paths: Vec<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            mode: AuthMode::Session,
            cookie_name: "mcp_session".to_string(),
            public_paths: vec!["/health".to_string()],
        }
    }
}

/// Header names used to pass the authenticated identity to the backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HeadersConfig {
    pub user_id: String,
    pub user_email: String,
    pub user_name: String,
    pub user_groups: String,

    /// Static headers set on every outbound request.
    pub custom: BTreeMap<String, String>,

    pub dynamic: DynamicHeadersConfig,
}

impl Default for HeadersConfig {
    fn default() -> Self {
        Self {
            user_id: "X-User-ID".to_string(),
            user_email: "X-User-Email".to_string(),
            user_name: "X-User-Name".to_string(),
            user_groups: "X-User-Groups".to_string(),
            custom: BTreeMap::new(),
            dynamic: DynamicHeadersConfig::default(),
        }
    }
}

/// Per-request generated headers. All disabled unless configured.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct DynamicHeadersConfig {
    pub timestamp: TimestampHeaderConfig,
    pub request_id: DynamicHeader,
    pub client_ip: DynamicHeader,
    pub user_agent: DynamicHeader,
    pub session_id: DynamicHeader,
    pub correlation_id: DynamicHeader,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct DynamicHeader {
    pub enabled: bool,
    pub header_name: String,
}

impl DynamicHeader {
    /// The header name when the header is enabled and named.
    pub fn active_name(&self) -> Option<&str> {
        (self.enabled && !self.header_name.is_empty()).then_some(self.header_name.as_str())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimestampHeaderConfig {
    pub enabled: bool,
    pub header_name: String,
    /// `unix`, `unix_nano`, `rfc3339`, `rfc3339_nano`, `iso8601` or a strftime pattern.
    pub format: String,
}

impl Default for TimestampHeaderConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            header_name: "X-Request-Timestamp".to_string(),
            format: "rfc3339".to_string(),
        }
    }
}

/// Session store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Session lifetime in seconds.
    pub ttl_secs: u64,

    /// Interval between sweeps of expired sessions.
    pub cleanup_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 24 * 60 * 60,
            cleanup_interval_secs: 300,
        }
    }
}

impl SessionConfig {
    /// Lifetime given to newly created sessions.
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs.max(1))
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Json,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Security hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Add security headers to every response.
    pub enable_headers: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            enable_headers: true,
        }
    }
}
