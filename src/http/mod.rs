//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, auth gate, health and session endpoints)
//!     → proxy.rs (breaker admission, dispatch, outcome bookkeeping)
//!     → request.rs (outbound rewrite, replayable body)
//!     → target.rs (backend base URL)
//!     → Buffered: response.rs (private snapshot per attempt)
//!     → Stream:   streaming.rs (SSE) | websocket.rs (upgrade takeover)
//!     → Send to client
//! ```

pub mod proxy;
pub mod request;
pub mod response;
pub mod server;
pub mod streaming;
pub mod target;
pub mod websocket;

pub use proxy::ReverseProxy;
pub use server::{AppState, HttpServer};
pub use target::BackendTarget;
