//! Authenticated sessions and their storage.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::time;

/// Identity attached to a request once the gate has let it through.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserSession {
    pub id: String,
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub claims: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl UserSession {
    pub fn new(
        id: impl Into<String>,
        email: impl Into<String>,
        name: impl Into<String>,
        ttl: Duration,
    ) -> Self {
        let created_at = Utc::now();
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| created_at.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            id: id.into(),
            email: email.into(),
            name: name.into(),
            claims: Map::new(),
            created_at,
            expires_at,
        }
    }

    /// Fixed user attached in bypass mode.
    pub fn bypass() -> Self {
        Self::new(
            "bypass-user",
            "bypass@example.com",
            "Bypass User",
            Duration::from_secs(365 * 24 * 60 * 60),
        )
    }

    pub fn with_claim(mut self, key: impl Into<String>, value: Value) -> Self {
        self.claims.insert(key.into(), value);
        self
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    /// Group names from the `groups` claim, a string or an array of strings.
    pub fn groups(&self) -> Vec<String> {
        match self.claims.get("groups") {
            Some(Value::String(group)) => vec![group.clone()],
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("session not found")]
    NotFound,

    #[error("session expired")]
    Expired,

    #[error("session already exists")]
    AlreadyExists,
}

/// Counters reported on the health endpoint.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SessionStats {
    pub active_sessions: u64,
    pub total_created: u64,
    pub total_deleted: u64,
    pub store: &'static str,
}

/// Storage backend for sessions.
pub trait SessionStore: Send + Sync {
    fn create(&self, key: &str, session: UserSession) -> Result<(), SessionError>;

    /// Fetch a live session. Expired entries are removed on access.
    fn get(&self, key: &str) -> Result<UserSession, SessionError>;

    fn delete(&self, key: &str) -> Result<(), SessionError>;

    /// Drop every expired session, returning how many were removed.
    fn cleanup(&self) -> usize;

    fn stats(&self) -> SessionStats;
}

/// In-process session store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    sessions: DashMap<String, UserSession>,
    total_created: AtomicU64,
    total_deleted: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemoryStore {
    fn create(&self, key: &str, session: UserSession) -> Result<(), SessionError> {
        match self.sessions.entry(key.to_string()) {
            Entry::Occupied(_) => Err(SessionError::AlreadyExists),
            Entry::Vacant(slot) => {
                slot.insert(session);
                self.total_created.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(key, "Session created");
                Ok(())
            }
        }
    }

    fn get(&self, key: &str) -> Result<UserSession, SessionError> {
        let session = self
            .sessions
            .get(key)
            .map(|entry| entry.value().clone())
            .ok_or(SessionError::NotFound)?;

        if session.is_expired() {
            if self.sessions.remove_if(key, |_, s| s.is_expired()).is_some() {
                self.total_deleted.fetch_add(1, Ordering::Relaxed);
            }
            return Err(SessionError::Expired);
        }
        Ok(session)
    }

    fn delete(&self, key: &str) -> Result<(), SessionError> {
        self.sessions
            .remove(key)
            .map(|_| {
                self.total_deleted.fetch_add(1, Ordering::Relaxed);
            })
            .ok_or(SessionError::NotFound)
    }

    fn cleanup(&self) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, session| !session.is_expired());
        let removed = before.saturating_sub(self.sessions.len());
        if removed > 0 {
            self.total_deleted.fetch_add(removed as u64, Ordering::Relaxed);
            tracing::debug!(count = removed, "Cleaned up expired sessions");
        }
        removed
    }

    fn stats(&self) -> SessionStats {
        SessionStats {
            active_sessions: self.sessions.len() as u64,
            total_created: self.total_created.load(Ordering::Relaxed),
            total_deleted: self.total_deleted.load(Ordering::Relaxed),
            store: "memory",
        }
    }
}

/// Periodically purge expired sessions until shutdown.
pub async fn run_cleanup(
    store: Arc<dyn SessionStore>,
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = time::interval(interval);
    // The first tick fires immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                store.cleanup();
            }
            _ = shutdown.recv() => {
                tracing::info!("Session cleanup received shutdown signal, exiting loop");
                break;
            }
        }
    }
}
