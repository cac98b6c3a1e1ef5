//! Retry logic.
//!
//! # Responsibilities
//! - Decide how many attempts a request may use
//! - Run attempts into private snapshots, with a fixed backoff in between
//! - Commit exactly one snapshot (or a proxy-generated error) to the client
//!
//! # Design Decisions
//! - Never retry a body-carrying request whose body cannot be replayed
//! - 5xx and transport errors are retried; 4xx is final and healthy
//! - Backoff waits are bounded by the inbound deadline
//! - The outcome carries the error that feeds the circuit breaker

use std::future::Future;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Response, StatusCode};

use crate::config::RetryConfig;
use crate::error::ProxyError;
use crate::http::request::{carries_body, ReplayableBody};
use crate::http::response::{error_response, ResponseSnapshot};
use crate::resilience::timeouts::Deadline;

/// Attempt budget and spacing of the buffered path.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(config.max_attempts, config.backoff())
    }

    /// Attempts allowed for this request.
    ///
    /// A zero budget sends nothing; `execute` then answers with its 502
    /// fallback. A one-shot body always gets exactly one attempt.
    pub fn attempts_for(&self, method: &Method, body: &ReplayableBody) -> u32 {
        if carries_body(method) && !body.is_replayable() {
            if self.max_attempts > 1 {
                tracing::warn!(
                    method = %method,
                    "Request body cannot be replayed, retries disabled"
                );
            }
            return 1;
        }
        self.max_attempts
    }

    /// Run up to `attempts_for` attempts and commit the final one.
    ///
    /// `attempt` receives a fresh body for every call and returns the fully
    /// buffered backend response. Nothing reaches the client until this
    /// returns.
    pub async fn execute<F, Fut>(
        &self,
        method: &Method,
        body: &mut ReplayableBody,
        deadline: &Deadline,
        mut attempt: F,
    ) -> RetryOutcome
    where
        F: FnMut(Body) -> Fut,
        Fut: Future<Output = Result<ResponseSnapshot, ProxyError>>,
    {
        let max_attempts = self.attempts_for(method, body);
        let mut last_snapshot: Option<ResponseSnapshot> = None;
        let mut last_error: Option<ProxyError> = None;
        let mut attempts = 0;

        while attempts < max_attempts {
            attempts += 1;

            if attempts > 1 {
                tracing::debug!(attempt = attempts, delay = ?self.backoff, "Backing off before retry");
                if !deadline.sleep(self.backoff).await {
                    tracing::warn!(attempt = attempts, "Deadline reached during backoff");
                    break;
                }
            }

            let request_body = match body.next_body() {
                Ok(b) => b,
                Err(e) => {
                    tracing::warn!(attempt = attempts, error = %e, "Cannot replay request body");
                    return RetryOutcome::failed(
                        StatusCode::BAD_REQUEST,
                        "Bad Request",
                        e,
                        attempts,
                    );
                }
            };

            match deadline.run(attempt(request_body)).await {
                Err(timeout) => {
                    tracing::warn!(attempt = attempts, "Upstream attempt timed out");
                    return RetryOutcome::failed(
                        StatusCode::GATEWAY_TIMEOUT,
                        "Gateway Timeout",
                        timeout,
                        attempts,
                    );
                }
                Ok(Ok(snapshot)) if snapshot.is_server_error() => {
                    let status = snapshot.status();
                    tracing::warn!(
                        attempt = attempts,
                        max_attempts,
                        status = %status,
                        "Upstream returned server error"
                    );
                    last_error = Some(ProxyError::ServerError(status));
                    last_snapshot = Some(snapshot);
                }
                Ok(Ok(snapshot)) => {
                    return RetryOutcome {
                        status: snapshot.status(),
                        response: snapshot.into_response(),
                        error: None,
                        attempts,
                    };
                }
                Ok(Err(e)) if !e.is_backend_failure() => {
                    tracing::warn!(attempt = attempts, error = %e, "Request body failed");
                    return RetryOutcome::failed(StatusCode::BAD_REQUEST, "Bad Request", e, attempts);
                }
                Ok(Err(e)) => {
                    tracing::warn!(
                        attempt = attempts,
                        max_attempts,
                        error = %e,
                        "Upstream attempt failed"
                    );
                    last_error = Some(e);
                    last_snapshot = None;
                }
            }
        }

        match (last_snapshot, last_error) {
            (Some(snapshot), error) => RetryOutcome {
                status: snapshot.status(),
                response: snapshot.into_response(),
                error: Some(error.unwrap_or(ProxyError::ServerError(StatusCode::BAD_GATEWAY))),
                attempts,
            },
            (None, Some(error)) => {
                RetryOutcome::failed(StatusCode::BAD_GATEWAY, "Bad Gateway", error, attempts)
            }
            (None, None) => RetryOutcome::failed(
                StatusCode::BAD_GATEWAY,
                "Bad Gateway",
                ProxyError::ServerError(StatusCode::BAD_GATEWAY),
                attempts,
            ),
        }
    }
}

/// Committed result of the buffered path.
#[derive(Debug)]
pub struct RetryOutcome {
    pub response: Response<Body>,
    pub status: StatusCode,
    /// Set when the request did not succeed; breaker bookkeeping reads it.
    pub error: Option<ProxyError>,
    pub attempts: u32,
}

impl RetryOutcome {
    fn failed(status: StatusCode, message: &'static str, error: ProxyError, attempts: u32) -> Self {
        Self {
            response: error_response(status, message),
            status,
            error: Some(error),
            attempts,
        }
    }
}
