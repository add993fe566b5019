//! Prometheus metrics for collection, enrichment and the key pool

use std::sync::Arc;
use std::time::Duration;

use axum::{extract::State, response::IntoResponse, routing::get, Router};
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::Lazy;
use regex::Regex;

use super::config::MetricsConfig;

static UUID_SEGMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}")
        .expect("uuid pattern is valid")
});

static NUMERIC_SEGMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/\d+(/|$)").expect("numeric segment pattern is valid"));

/// Handle for rendering the `/metrics` endpoint
#[derive(Clone)]
pub struct PrometheusMetrics {
    handle: Arc<PrometheusHandle>,
}

impl PrometheusMetrics {
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

/// Installs the global Prometheus recorder
pub fn init_metrics(config: &MetricsConfig) -> Option<PrometheusMetrics> {
    if !config.enabled {
        tracing::info!("Prometheus metrics disabled");
        return None;
    }

    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            gauge!("answer_collector_info", "version" => env!("CARGO_PKG_VERSION")).set(1.0);
            tracing::info!(path = %config.path, "Prometheus metrics initialized");

            Some(PrometheusMetrics {
                handle: Arc::new(handle),
            })
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to initialize Prometheus metrics");
            None
        }
    }
}

pub fn create_metrics_router(metrics: PrometheusMetrics, path: &str) -> Router {
    Router::new()
        .route(path, get(metrics_handler))
        .with_state(metrics)
}

async fn metrics_handler(State(metrics): State<PrometheusMetrics>) -> impl IntoResponse {
    metrics.render()
}

pub fn record_http_request(method: &str, path: &str, status: u16, duration: Duration) {
    let labels = [
        ("method", method.to_string()),
        ("path", sanitize_path(path)),
        ("status", status.to_string()),
    ];

    counter!("http_requests_total", &labels).increment(1);
    histogram!("http_request_duration_seconds", &labels).record(duration.as_secs_f64());

    if status >= 500 {
        counter!("http_server_errors_total", &labels).increment(1);
    }
}

/// One provider call, labelled by its attempt status
pub fn record_provider_attempt(provider: &str, status: &str, duration: Option<Duration>) {
    let labels = [
        ("provider", provider.to_string()),
        ("status", status.to_string()),
    ];

    counter!("provider_attempts_total", &labels).increment(1);
    if let Some(duration) = duration {
        histogram!("provider_attempt_duration_seconds", &labels).record(duration.as_secs_f64());
    }
}

/// How a (query, collector type) pair ended: completed, handed_off, failed
/// or cancelled
pub fn record_chain_outcome(collector_type: &str, outcome: &str) {
    counter!(
        "collection_outcomes_total",
        "collector_type" => collector_type.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

pub fn record_handoff_resolution(provider: &str, outcome: &str) {
    counter!(
        "handoff_resolutions_total",
        "provider" => provider.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

pub fn record_enrichment(kind: &str, status: &str, provider: Option<&str>) {
    counter!(
        "enrichment_tasks_total",
        "kind" => kind.to_string(),
        "status" => status.to_string(),
        "provider" => provider.unwrap_or("none").to_string()
    )
    .increment(1);
}

pub fn record_key_backoff(operation: &str, provider: &str) {
    counter!(
        "key_pool_backoffs_total",
        "operation" => operation.to_string(),
        "provider" => provider.to_string()
    )
    .increment(1);
}

/// Collapses ids in unmatched paths to keep label cardinality bounded
fn sanitize_path(path: &str) -> String {
    let path = UUID_SEGMENT.replace_all(path, "{id}");
    let path = NUMERIC_SEGMENT.replace_all(&path, "/{id}$1");

    path.chars().take(50).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_path_batch_id() {
        let path = "/v1/collections/batch-550e8400-e29b-41d4-a716-446655440000";
        assert_eq!(sanitize_path(path), "/v1/collections/batch-{id}");
    }

    #[test]
    fn test_sanitize_path_numeric_id() {
        assert_eq!(sanitize_path("/v1/jobs/123/resume"), "/v1/jobs/{id}/resume");
    }

    #[test]
    fn test_sanitize_path_matched_route_untouched() {
        assert_eq!(
            sanitize_path("/v1/collections/{batch_id}"),
            "/v1/collections/{batch_id}"
        );
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        record_provider_attempt("assistant-a", "success", Some(Duration::from_millis(5)));
        record_chain_outcome("chat", "completed");
        record_enrichment("sentiment", "failed", None);
        record_key_backoff("collection", "assistant-a");
    }
}
