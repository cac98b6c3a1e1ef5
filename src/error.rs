//! Error types shared by the proxy subsystems.

use axum::http::StatusCode;
use thiserror::Error;

/// Failure of a single proxied exchange or of a backend health check.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The configured backend cannot be turned into a request target.
    #[error("invalid backend target: {0}")]
    InvalidTarget(String),

    /// The outbound request could not be assembled.
    #[error("failed to build upstream request: {0}")]
    Request(#[from] axum::http::Error),

    /// Connecting to or talking to the backend failed.
    #[error("upstream request failed: {0}")]
    Upstream(#[from] hyper_util::client::legacy::Error),

    /// The backend response body broke off while it was being read.
    #[error("failed to read upstream body: {0}")]
    UpstreamBody(#[source] axum::Error),

    /// The backend answered with a 5xx.
    #[error("server error: {}", .0.as_u16())]
    ServerError(StatusCode),

    /// The inbound deadline expired while waiting on the backend.
    #[error("upstream request timed out")]
    Timeout,

    /// The inbound request body could not be read.
    #[error("failed to read request body: {0}")]
    RequestBody(#[source] axum::Error),

    /// A retry needed the request body again but it was already consumed.
    #[error("failed to reset request body: body is not replayable")]
    BodyReplay,

    /// Switching protocols with the client or the backend failed.
    #[error("connection upgrade failed: {0}")]
    Upgrade(#[from] hyper::Error),

    /// The health endpoint answered with an error status.
    #[error("health check returned status {}", .0.as_u16())]
    Unhealthy(StatusCode),
}

impl ProxyError {
    /// Whether this failure is evidence of backend ill health.
    ///
    /// Client-side body problems are terminal for the request but must not
    /// feed the circuit breaker.
    pub fn is_backend_failure(&self) -> bool {
        !matches!(self, ProxyError::RequestBody(_) | ProxyError::BodyReplay)
    }
}
