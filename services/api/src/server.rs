use crate::cli::ServeArgs;
use crate::infra::AppState;
use crate::routes::with_lottery_routes;
use apartment_lottery::config::AppConfig;
use apartment_lottery::error::AppError;
use apartment_lottery::telemetry;
use apartment_lottery::workflows::lottery::{InMemoryLedgerRepository, LotteryService};
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let repository = Arc::new(InMemoryLedgerRepository::new());
    let lottery_service = Arc::new(LotteryService::new(repository, config.lottery));

    let app = with_lottery_routes(lottery_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        cancel_reserved = config.lottery.cancel_reserved,
        requeue_cancels_reserved = config.lottery.requeue_cancels_reserved,
        "apartment lottery service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
