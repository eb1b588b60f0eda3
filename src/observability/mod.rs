// observability/mod.rs - Tracing and Metrics

//! Structured logging and protocol metrics.
//!
//! Metrics go through the `metrics` facade and cost nothing until a recorder
//! is installed; with the `prometheus` feature, [`init_metrics`] installs one
//! and serves it over HTTP.
//!
//! # Example
//!
//! ```ignore
//! use contract_net::observability::{init_tracing, init_metrics, MetricsConfig, TracingConfig};
//!
//! init_tracing(TracingConfig::default());
//! let handle = init_metrics(MetricsConfig::default()).unwrap();
//! ```

mod metrics;
mod tracing_setup;

#[cfg(feature = "prometheus")]
pub use metrics::{init_metrics, MetricsHandle};
pub use metrics::{
    record_award, record_bid, record_cfp_announced, record_completion, record_declined,
    record_expired, record_proposal, record_schema_violation, record_task_executed, MetricsConfig,
    NegotiationMetrics, SchemaMetrics, WorkerMetrics,
};

pub use tracing_setup::{init_tracing, try_init_tracing, TracingConfig, TracingFormat};
