//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! chain clients, pipeline, gateway, HTTP:
//!     → logging.rs (structured log events, settlement id on every line)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout (JSON or pretty)
//!     → Prometheus scrape endpoint
//! ```

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, try_init_logging};
pub use metrics::init_metrics;
