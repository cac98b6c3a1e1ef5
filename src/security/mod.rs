//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Outbound request:
//!     → headers.rs (strip hop-by-hop, add X-Forwarded-*)
//!     → Forward to backend
//!
//! Every response:
//!     → headers.rs (security response headers, if enabled)
//! ```
//!
//! # Design Decisions
//! - Header hygiene lives in one place for the buffered and streaming paths
//! - Security headers are a tower layer, not per-handler code

pub mod headers;
