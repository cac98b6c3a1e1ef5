//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Request to backend:
//!     → circuit_breaker.rs (admission; outcome recorded afterwards)
//!     → retries.rs (buffered attempts with fixed backoff)
//!     → timeouts.rs (inbound deadline over attempts and backoff)
//! ```
//!
//! # Design Decisions
//! - One breaker per backend, shared by every request
//! - Retries only when the request body can be sent again
//! - Streaming requests skip retries and timeouts entirely

pub mod circuit_breaker;
pub mod retries;
pub mod timeouts;
