//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters)
//!
//! Consumers:
//!     → stdout (fmt layer)
//!     → GET /metrics on the HTTP backend (Prometheus scrape)
//! ```

pub mod logging;
pub mod metrics;
