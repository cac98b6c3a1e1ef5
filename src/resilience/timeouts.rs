//! Timeout enforcement.
//!
//! # Responsibilities
//! - Bound a buffered request (every attempt plus backoff) by the inbound deadline
//! - Make backoff waits return as soon as the deadline passes
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - Timeout errors are distinct from other errors
//! - Streaming requests never get a Deadline

use std::future::Future;
use std::time::Duration;

use tokio::time::{self, Instant};

use crate::error::ProxyError;

/// Absolute deadline of one inbound request.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    pub fn after(budget: Duration) -> Self {
        Self {
            at: Instant::now() + budget,
        }
    }

    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.at
    }

    /// Run `fut` to completion unless the deadline passes first.
    pub async fn run<F, T>(&self, fut: F) -> Result<T, ProxyError>
    where
        F: Future<Output = T>,
    {
        time::timeout_at(self.at, fut)
            .await
            .map_err(|_| ProxyError::Timeout)
    }

    /// Sleep for `delay`, cut short by the deadline.
    ///
    /// Returns false when the deadline interrupted the wait.
    pub async fn sleep(&self, delay: Duration) -> bool {
        tokio::select! {
            _ = time::sleep(delay) => true,
            _ = time::sleep_until(self.at) => false,
        }
    }
}
