//! Authentication subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound request
//!     → gate.rs (public path? bypass user? session cookie?)
//!     → CurrentUser in request extensions
//!     → headers.rs (identity headers on the outbound request)
//! ```
//!
//! # Design Decisions
//! - The login flow itself lives outside the proxy; it only reads sessions
//! - Session storage is a trait so other stores can be plugged in

pub mod gate;
pub mod headers;
pub mod session;

pub use gate::{require_auth, AuthGate, CurrentUser};
pub use headers::HeaderInjector;
pub use session::{MemoryStore, SessionStore, UserSession};
