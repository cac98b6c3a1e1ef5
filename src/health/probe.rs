//! Backend health probing.
//!
//! # Responsibilities
//! - Issue one bounded `GET {target}/health`
//! - Report transport failures and error statuses to the caller

use std::time::Duration;

use axum::body::Body;
use axum::http::header::USER_AGENT;
use axum::http::{Request, Uri};
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use tokio::time;

use crate::error::ProxyError;
use crate::http::target::BackendTarget;

pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);
pub const HEALTH_PATH: &str = "/health";

/// Out-of-band readiness probe. Never consulted by the circuit breaker.
#[derive(Clone)]
pub struct HealthProber {
    client: Client<HttpConnector, Body>,
    uri: Uri,
    timeout: Duration,
}

impl HealthProber {
    pub fn new(client: Client<HttpConnector, Body>, target: &BackendTarget) -> Result<Self, ProxyError> {
        Ok(Self {
            client,
            uri: target.uri_for(HEALTH_PATH)?,
            timeout: PROBE_TIMEOUT,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn probe(&self) -> Result<(), ProxyError> {
        let request = Request::get(self.uri.clone())
            .header(USER_AGENT, "mcp-auth-proxy-health-check")
            .body(Body::empty())?;

        match time::timeout(self.timeout, self.client.request(request)).await {
            Ok(Ok(response)) => {
                let status = response.status();
                if status.as_u16() >= 400 {
                    tracing::warn!(uri = %self.uri, status = %status, "Health check failed: error status");
                    return Err(ProxyError::Unhealthy(status));
                }
                Ok(())
            }
            Ok(Err(e)) => {
                tracing::warn!(uri = %self.uri, error = %e, "Health check failed: connection error");
                Err(e.into())
            }
            Err(_) => {
                tracing::warn!(uri = %self.uri, "Health check failed: timeout");
                Err(ProxyError::Timeout)
            }
        }
    }
}
