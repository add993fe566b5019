//! Observability infrastructure - tracing and Prometheus metrics

mod config;
mod metrics;
mod tracing_setup;

pub use config::{MetricsConfig, ObservabilityConfig, TracingConfig};
pub use metrics::{
    create_metrics_router, init_metrics, record_chain_outcome, record_enrichment,
    record_handoff_resolution, record_http_request, record_key_backoff, record_provider_attempt,
    PrometheusMetrics,
};
pub use tracing_setup::{init_tracing, shutdown_tracing};
