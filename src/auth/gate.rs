//! Authentication gate in front of the proxy.
//!
//! Public paths pass untouched. Everything else needs a user: a fixed one in
//! bypass mode, or one resolved from the session cookie.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::header::COOKIE;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::config::{AuthConfig, AuthMode};

use super::session::{SessionError, SessionStore, UserSession};

/// User attached to request extensions by the gate.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub session: UserSession,
    /// Key of the backing session, absent in bypass mode.
    pub session_id: Option<String>,
}

#[derive(Clone)]
pub struct AuthGate {
    mode: AuthMode,
    cookie_name: String,
    public_paths: Arc<Vec<String>>,
    store: Arc<dyn SessionStore>,
}

impl AuthGate {
    pub fn new(config: &AuthConfig, store: Arc<dyn SessionStore>) -> Self {
        Self {
            mode: config.mode,
            cookie_name: config.cookie_name.clone(),
            public_paths: Arc::new(config.public_paths.clone()),
            store,
        }
    }

    pub fn is_public(&self, path: &str) -> bool {
        self.public_paths.iter().any(|p| p == path)
    }

    /// Resolve the user for a request, or the rejection message.
    pub fn authenticate(&self, headers: &HeaderMap) -> Result<CurrentUser, &'static str> {
        match self.mode {
            AuthMode::Bypass => Ok(CurrentUser {
                session: UserSession::bypass(),
                session_id: None,
            }),
            AuthMode::Session => {
                let session_id = cookie_value(headers, &self.cookie_name)
                    .ok_or("Authentication required")?;
                match self.store.get(&session_id) {
                    Ok(session) => Ok(CurrentUser {
                        session,
                        session_id: Some(session_id),
                    }),
                    Err(SessionError::Expired) => Err("Session expired"),
                    Err(_) => Err("Invalid or expired session"),
                }
            }
        }
    }
}

/// Middleware enforcing the gate on every non-public path.
pub async fn require_auth(
    State(gate): State<AuthGate>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    if gate.is_public(request.uri().path()) {
        return next.run(request).await;
    }

    match gate.authenticate(request.headers()) {
        Ok(user) => {
            tracing::debug!(user_id = %user.session.id, "User authenticated");
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Err(reason) => {
            tracing::debug!(path = %request.uri().path(), reason, "Rejecting unauthenticated request");
            (StatusCode::UNAUTHORIZED, Json(json!({ "error": reason }))).into_response()
        }
    }
}

fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
