use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::{routing::get, Router};
use axum_prometheus::PrometheusMetricLayer;
use backend::billing::{BillingConfig, BillingServices, InMemoryBillingStore};
use backend::listings::StaticListings;
use backend::notifications;
use tower::ServiceExt;

#[tokio::test]
async fn metrics_returns_ok() {
    let (layer, handle) = PrometheusMetricLayer::pair();
    let (notifier, _events) = notifications::channel(4);
    let services = BillingServices::new(
        Arc::new(InMemoryBillingStore::new()),
        Arc::new(StaticListings::new()),
        Arc::new(notifier),
        BillingConfig::default(),
    );
    let app = Router::new()
        .route("/metrics", get(move || async move { handle.render() }))
        .merge(backend::app(services))
        .layer(layer);

    let plans = app
        .clone()
        .oneshot(Request::builder().uri("/api/plans").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(plans.status(), StatusCode::OK);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
