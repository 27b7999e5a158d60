use crate::infra::AppState;
use apartment_lottery::workflows::lottery::{lottery_router, LedgerRepository, LotteryService};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;
use axum::Json;
use serde_json::json;
use std::sync::Arc;

pub(crate) fn with_lottery_routes<R>(service: Arc<LotteryService<R>>) -> axum::Router
where
    R: LedgerRepository + 'static,
{
    lottery_router(service)
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use apartment_lottery::config::LotteryConfig;
    use apartment_lottery::workflows::lottery::InMemoryLedgerRepository;
    use axum::body::Body;
    use axum::http::Request;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tower::ServiceExt;

    fn app_state(ready: bool) -> AppState {
        let recorder = PrometheusBuilder::new().build_recorder();
        AppState {
            readiness: Arc::new(AtomicBool::new(ready)),
            metrics: Arc::new(recorder.handle()),
        }
    }

    fn app(state: AppState) -> axum::Router {
        let service = Arc::new(LotteryService::new(
            Arc::new(InMemoryLedgerRepository::new()),
            LotteryConfig::default(),
        ));
        with_lottery_routes(service).layer(Extension(state))
    }

    fn get(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).expect("request")
    }

    #[tokio::test]
    async fn healthcheck_reports_ok() {
        let Json(body) = healthcheck().await;
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn readiness_follows_the_flag() {
        let state = app_state(false);
        let router = app(state.clone());

        let response = router
            .clone()
            .oneshot(get("/ready"))
            .await
            .expect("route executes");
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        state.readiness.store(true, Ordering::Release);
        let response = router.oneshot(get("/ready")).await.expect("route executes");
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn metrics_are_served_as_prometheus_text() {
        let response = app(app_state(true))
            .oneshot(get("/metrics"))
            .await
            .expect("route executes");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/plain; version=0.0.4"
        );
    }

    #[tokio::test]
    async fn lottery_routes_are_mounted() {
        let response = app(app_state(true))
            .oneshot(get(
                "/api/v1/projects/missing/apartments/apt-1/reservations",
            ))
            .await
            .expect("route executes");

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
