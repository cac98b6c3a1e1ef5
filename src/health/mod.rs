//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! GET /health
//!     → probe.rs (one bounded call to the backend's /health)
//!     → JSON report with proxy target, session store and breaker state
//! ```
//!
//! # Design Decisions
//! - Checks are on demand; there is no background poller for one backend
//! - Check results never feed the circuit breaker

pub mod probe;

pub use probe::HealthProber;
