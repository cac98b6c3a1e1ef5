//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (request ID, tracing, security headers, auth gate)
//! - Serve the health and session endpoints
//! - Hand everything else to the proxy core
//! - Run until the shutdown signal, with background session cleanup

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{ConnectInfo, Extension, State},
    http::{Request, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::auth::session::{run_cleanup, SessionStats};
use crate::auth::{require_auth, AuthGate, CurrentUser, MemoryStore, SessionStore};
use crate::config::ProxyConfig;
use crate::error::ProxyError;
use crate::http::proxy::ReverseProxy;
use crate::security::headers::security_header_layers;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub proxy: Arc<ReverseProxy>,
    pub sessions: Arc<dyn SessionStore>,
}

/// HTTP server for the reverse proxy.
pub struct HttpServer {
    router: Router,
    config: ProxyConfig,
    state: AppState,
}

impl HttpServer {
    /// Create a new HTTP server backed by an in-memory session store.
    pub fn new(config: ProxyConfig) -> Result<Self, ProxyError> {
        Self::with_session_store(config, Arc::new(MemoryStore::new()))
    }

    pub fn with_session_store(
        config: ProxyConfig,
        sessions: Arc<dyn SessionStore>,
    ) -> Result<Self, ProxyError> {
        let proxy = Arc::new(ReverseProxy::new(&config)?);
        let state = AppState { proxy, sessions };
        let router = Self::build_router(&config, state.clone());
        Ok(Self {
            router,
            config,
            state,
        })
    }

    /// Build the Axum router with all middleware layers.
    ///
    /// No global timeout layer: streams must be able to outlive any deadline.
    fn build_router(config: &ProxyConfig, state: AppState) -> Router {
        let gate = AuthGate::new(&config.auth, state.sessions.clone());

        let mut router = Router::new()
            .route("/health", get(health_handler))
            .route("/session", get(session_handler))
            .fallback(proxy_handler)
            .with_state(state)
            .layer(middleware::from_fn_with_state(gate, require_auth));

        if config.security.enable_headers {
            for layer in security_header_layers() {
                router = router.layer(layer);
            }
        }

        router.layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            backend = %self.state.proxy.target(),
            "HTTP server starting"
        );

        let cleanup = tokio::spawn(run_cleanup(
            self.state.sessions.clone(),
            self.config.session.cleanup_interval(),
            shutdown.resubscribe(),
        ));

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received, draining connections");
            })
            .await?;

        cleanup.abort();
        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    pub fn proxy(&self) -> &Arc<ReverseProxy> {
        &self.state.proxy
    }
}

/// Catch-all handler forwarding to the backend.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let client_addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    state.proxy.handle(request, client_addr).await
}

#[derive(Debug, Serialize)]
struct HealthReport {
    status: &'static str,
    timestamp: String,
    version: &'static str,
    checks: HealthChecks,
}

#[derive(Debug, Serialize)]
struct HealthChecks {
    proxy_target: TargetCheck,
    session_store: SessionCheck,
    circuit_breaker: BreakerCheck,
}

#[derive(Debug, Serialize)]
struct TargetCheck {
    status: &'static str,
    target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct SessionCheck {
    status: &'static str,
    #[serde(flatten)]
    stats: SessionStats,
}

#[derive(Debug, Serialize)]
struct BreakerCheck {
    state: String,
    failures: u32,
}

/// Readiness report; 503 when the backend health check fails.
async fn health_handler(State(state): State<AppState>) -> Response {
    let check = state.proxy.probe_health().await;
    let healthy = check.is_ok();
    let breaker = state.proxy.breaker();

    let report = HealthReport {
        status: if healthy { "healthy" } else { "degraded" },
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        version: env!("CARGO_PKG_VERSION"),
        checks: HealthChecks {
            proxy_target: TargetCheck {
                status: if healthy { "healthy" } else { "unhealthy" },
                target: state.proxy.target().as_str().trim_end_matches('/').to_string(),
                error: check.err().map(|e| e.to_string()),
            },
            session_store: SessionCheck {
                status: "healthy",
                stats: state.sessions.stats(),
            },
            circuit_breaker: BreakerCheck {
                state: breaker.state().to_string(),
                failures: breaker.failures(),
            },
        },
    };

    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report)).into_response()
}

#[derive(Debug, Serialize)]
struct SessionInfo {
    user_id: String,
    user_email: String,
    user_name: String,
    authenticated: bool,
}

/// Identity of the current caller.
async fn session_handler(user: Option<Extension<CurrentUser>>) -> Json<SessionInfo> {
    match user {
        Some(Extension(user)) => Json(SessionInfo {
            authenticated: !user.session.id.is_empty(),
            user_id: user.session.id,
            user_email: user.session.email,
            user_name: user.session.name,
        }),
        None => Json(SessionInfo {
            user_id: String::new(),
            user_email: String::new(),
            user_name: String::new(),
            authenticated: false,
        }),
    }
}
