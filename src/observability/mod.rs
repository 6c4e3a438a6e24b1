//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → tracing events (structured fields: connection_id, port, base_dns)
//!     → metrics.rs (counters, gauges)
//!
//! Consumers:
//!     → logging.rs subscriber installed by the host (stdout, pretty or JSON)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;
