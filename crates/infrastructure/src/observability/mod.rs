//! Observability module
//!
//! - Metrics collection through the `metrics` facade
//! - Structured, event-keyed logging helpers

pub mod metrics_collector;
pub mod structured_logger;

// Re-export main types for convenience
pub use metrics_collector::MetricsCollector;
pub use structured_logger::{mask_url, StructuredLogger};
