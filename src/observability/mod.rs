//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Proxy core, retries, breaker, streams
//!     → logging.rs (tracing subscriber: JSON or pretty, EnvFilter)
//!     → metrics.rs (labelled counters, gauges, latency histogram)
//!
//! Consumers:
//!     → stdout for log shipping
//!     → Prometheus scrape on observability.metrics_address
//! ```
//!
//! # Design Decisions
//! - Every metric carries the backend label
//! - The request id set at the edge shows up in every span
//! - Recording without an installed exporter is free

pub mod logging;
pub mod metrics;
