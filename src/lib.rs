//! Authenticating reverse proxy for a single MCP backend.

pub mod auth;
pub mod config;
pub mod error;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod security;

pub use config::schema::ProxyConfig;
pub use error::ProxyError;
pub use http::{HttpServer, ReverseProxy};
pub use lifecycle::Shutdown;
