//! Proxy core: one inbound request in, one committed response out.
//!
//! # Data Flow
//! ```text
//! Inbound request
//!     → circuit breaker admission (503 when open)
//!     → streaming::classify (decided once)
//!     → identity headers, outbound rewrite
//!     → Buffered: retries.rs over private snapshots, under the inbound deadline
//!     → Stream:   streaming.rs (SSE) | websocket.rs (takeover)
//!     → outcome recorded on the breaker
//! ```
//!
//! # Design Decisions
//! - Rejected admissions are not failures, or an open breaker would keep
//!   itself open
//! - Streams only report their connect step to the breaker
//! - Client body problems answer 400 and leave the breaker alone

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::{HeaderMap, Request, Response, StatusCode};
use hyper::upgrade::OnUpgrade;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use url::Url;

use crate::auth::{CurrentUser, HeaderInjector};
use crate::config::ProxyConfig;
use crate::error::ProxyError;
use crate::health::HealthProber;
use crate::http::request::{body_framing, OutboundRequest, ReplayableBody};
use crate::http::response::{error_response, ResponseSnapshot};
use crate::http::streaming::{self, classify, Dispatch, StreamKind};
use crate::http::target::BackendTarget;
use crate::http::websocket;
use crate::observability::metrics;
use crate::resilience::circuit_breaker::CircuitBreaker;
use crate::resilience::retries::RetryPolicy;
use crate::resilience::timeouts::Deadline;
use crate::security::headers::strip_hop_by_hop;

/// Reverse proxy to the single configured backend.
pub struct ReverseProxy {
    target: BackendTarget,
    label: String,
    client: Client<HttpConnector, Body>,
    breaker: CircuitBreaker,
    retry: RetryPolicy,
    injector: HeaderInjector,
    prober: HealthProber,
    request_timeout: Duration,
    replay_limit: usize,
}

impl ReverseProxy {
    pub fn new(config: &ProxyConfig) -> Result<Self, ProxyError> {
        let target = BackendTarget::from_config(&config.backend)?;
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        let prober = HealthProber::new(client.clone(), &target)?;
        let label = target.label();

        let breaker = CircuitBreaker::from_config(&config.circuit_breaker);
        metrics::record_breaker_state(&label, breaker.state());

        tracing::info!(
            backend = %label,
            max_attempts = config.retries.max_attempts,
            breaker_threshold = config.circuit_breaker.threshold,
            "Reverse proxy configured"
        );

        Ok(Self {
            target,
            label,
            client,
            breaker,
            retry: RetryPolicy::from_config(&config.retries),
            injector: HeaderInjector::new(&config.headers),
            prober,
            request_timeout: config.timeouts.request(),
            replay_limit: config.retries.replay_buffer_bytes,
        })
    }

    /// Backend base URL, for diagnostics.
    pub fn target(&self) -> &Url {
        self.target.url()
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Check `{target}/health`. Independent of the breaker.
    pub async fn probe_health(&self) -> Result<(), ProxyError> {
        self.prober.probe().await
    }

    /// Forward one request and return the response to commit.
    pub async fn handle(&self, mut request: Request<Body>, client_addr: Option<SocketAddr>) -> Response<Body> {
        let start = Instant::now();
        let method = request.method().to_string();
        let request_id = request
            .headers()
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown")
            .to_string();
        let path = request.uri().path().to_string();

        if !self.breaker.allow() {
            tracing::warn!(
                request_id = %request_id,
                path = %path,
                backend = %self.label,
                "Circuit breaker open, rejecting request"
            );
            metrics::record_request(&method, StatusCode::SERVICE_UNAVAILABLE.as_u16(), &self.label, start);
            return error_response(StatusCode::SERVICE_UNAVAILABLE, "Service Unavailable");
        }
        metrics::record_breaker_state(&self.label, self.breaker.state());

        let dispatch = classify(request.headers());
        tracing::debug!(
            request_id = %request_id,
            method = %method,
            path = %path,
            dispatch = ?dispatch,
            "Proxying request"
        );

        let client_upgrade = match dispatch {
            Dispatch::Stream(StreamKind::WebSocket) => Some(hyper::upgrade::on(&mut request)),
            _ => None,
        };

        let user = request.extensions().get::<CurrentUser>().cloned();
        let (mut parts, body) = request.into_parts();
        let framing = body_framing(&parts.headers);
        // Hop-by-hop removal precedes injection so `Connection` tokens cannot
        // name identity headers away.
        strip_hop_by_hop(&mut parts.headers);
        self.injector.inject(&mut parts.headers, user.as_ref(), client_addr);

        let outbound = match OutboundRequest::from_parts(&parts, &self.target, client_addr) {
            Ok(outbound) => outbound,
            Err(e) => {
                tracing::error!(request_id = %request_id, error = %e, "Failed to build outbound request");
                metrics::record_request(&method, StatusCode::BAD_GATEWAY.as_u16(), &self.label, start);
                return error_response(StatusCode::BAD_GATEWAY, "Bad Gateway");
            }
        };

        let response = match dispatch {
            Dispatch::Buffered => self.forward_buffered(outbound, &framing, body).await,
            Dispatch::Stream(kind) => self.forward_stream(kind, outbound, body, client_upgrade).await,
        };

        metrics::record_request(&method, response.status().as_u16(), &self.label, start);
        response
    }

    async fn forward_buffered(
        &self,
        outbound: OutboundRequest,
        inbound_headers: &HeaderMap,
        body: Body,
    ) -> Response<Body> {
        let mut body = match ReplayableBody::capture(inbound_headers, body, self.replay_limit).await {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read request body");
                return error_response(StatusCode::BAD_REQUEST, "Bad Request");
            }
        };

        let deadline = Deadline::after(self.request_timeout);
        let outcome = self
            .retry
            .execute(&outbound.method, &mut body, &deadline, |attempt_body| {
                let request = outbound.to_request(attempt_body);
                let client = self.client.clone();
                async move {
                    let response = client.request(request?).await?;
                    ResponseSnapshot::capture(response).await
                }
            })
            .await;

        metrics::record_retries(
            outbound.method.as_str(),
            &self.label,
            outcome.attempts.saturating_sub(1),
        );

        match &outcome.error {
            None => self.record_success(),
            Some(e) if e.is_backend_failure() => {
                tracing::warn!(
                    status = %outcome.status,
                    attempts = outcome.attempts,
                    error = %e,
                    "Upstream request failed"
                );
                self.record_failure();
            }
            Some(e) => {
                tracing::debug!(error = %e, "Client-side failure, breaker untouched");
            }
        }

        outcome.response
    }

    async fn forward_stream(
        &self,
        kind: StreamKind,
        outbound: OutboundRequest,
        body: Body,
        client_upgrade: Option<OnUpgrade>,
    ) -> Response<Body> {
        metrics::record_streaming_request(kind.as_str(), &self.label);

        match self.open_stream(kind, outbound, body, client_upgrade).await {
            Ok(response) if response.status().is_server_error() => {
                tracing::warn!(stream_type = kind.as_str(), status = %response.status(), "Backend refused stream");
                self.record_failure();
                response
            }
            Ok(response) => {
                self.record_success();
                response
            }
            Err(e) => {
                tracing::error!(stream_type = kind.as_str(), error = %e, "Failed to open stream to backend");
                metrics::record_streaming_error("connect", &self.label);
                if e.is_backend_failure() {
                    self.record_failure();
                }
                error_response(StatusCode::BAD_GATEWAY, "Bad Gateway")
            }
        }
    }

    async fn open_stream(
        &self,
        kind: StreamKind,
        outbound: OutboundRequest,
        body: Body,
        client_upgrade: Option<OnUpgrade>,
    ) -> Result<Response<Body>, ProxyError> {
        match (kind, client_upgrade) {
            (StreamKind::WebSocket, Some(upgrade)) => {
                let request = outbound.with_websocket_upgrade().to_request(Body::empty())?;
                websocket::forward_websocket(&self.client, upgrade, request, self.label.clone()).await
            }
            _ => {
                let request = outbound.to_request(body)?;
                streaming::forward_sse(&self.client, request, self.label.clone()).await
            }
        }
    }

    fn record_success(&self) {
        self.breaker.record_success();
        metrics::record_breaker_state(&self.label, self.breaker.state());
    }

    fn record_failure(&self) {
        self.breaker.record_failure();
        metrics::record_breaker_failure(&self.label);
        metrics::record_breaker_state(&self.label, self.breaker.state());
    }
}
