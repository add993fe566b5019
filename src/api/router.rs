use axum::{middleware, routing::get, Router};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use super::health;
use super::middleware::{logging_middleware, metrics_middleware};
use super::state::AppState;
use super::v1;
use crate::infrastructure::observability::{create_metrics_router, PrometheusMetrics};

/// Probe-only router without state; `/ready` needs state and is absent
pub fn create_router() -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/live", get(health::live_check))
        .layer(TraceLayer::new_for_http())
}

/// Create the full router with application state. Every response carries
/// an `x-request-id`, generated when the caller sent none.
pub fn create_router_with_state(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::ready_check))
        .route("/live", get(health::live_check))
        .nest("/v1", v1::create_v1_router())
        .with_state(state)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(logging_middleware))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

/// The full router plus the Prometheus scrape endpoint, when metrics are on
pub fn create_app_router(
    state: AppState,
    metrics: Option<PrometheusMetrics>,
    metrics_path: &str,
) -> Router {
    let router = create_router_with_state(state);

    match metrics {
        Some(metrics) => router.merge(create_metrics_router(metrics, metrics_path)),
        None => router,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use tower::ServiceExt;

    use super::*;
    use crate::domain::batch::Batch;
    use crate::domain::collection::BatchId;
    use crate::domain::polling::MockPendingJobRepository;
    use crate::infrastructure::services::MockCollectionServiceTrait;

    fn app(service: MockCollectionServiceTrait) -> Router {
        create_app_router(
            AppState::new(
                Arc::new(service),
                Arc::new(MockPendingJobRepository::new()),
                vec!["assistant-a".to_string()],
            ),
            None,
            "/metrics",
        )
    }

    #[tokio::test]
    async fn test_health_route() {
        let response = create_router()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_post_collection_is_accepted() {
        let mut service = MockCollectionServiceTrait::new();
        service.expect_submit().returning(|spec| {
            Ok(Batch::new(
                BatchId::generate(),
                spec.brand_id,
                spec.customer_id,
                spec.queries.len(),
                &spec.collector_types,
            ))
        });

        let body = serde_json::json!({
            "brand_id": "brand-acme",
            "customer_id": "customer-1",
            "queries": ["best running shoes"],
            "collector_types": ["chat"]
        });
        let response = app(service)
            .oneshot(
                Request::post("/v1/collections")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert!(response.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn test_post_collection_validation_failure() {
        let mut service = MockCollectionServiceTrait::new();
        service.expect_submit().never();

        let body = serde_json::json!({
            "brand_id": "",
            "customer_id": "customer-1",
            "queries": [],
            "collector_types": ["chat"]
        });
        let response = app(service)
            .oneshot(
                Request::post("/v1/collections")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_unknown_route_is_not_found() {
        let response = app(MockCollectionServiceTrait::new())
            .oneshot(Request::get("/v1/models").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
