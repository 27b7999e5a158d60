use apartment_lottery::workflows::lottery::ApplicationType;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) fn parse_ownership(raw: &str) -> Result<ApplicationType, String> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "haso" => Ok(ApplicationType::Haso),
        "hitas" => Ok(ApplicationType::Hitas),
        "puolihitas" | "half-hitas" => Ok(ApplicationType::HalfHitas),
        other => Err(format!(
            "unknown ownership type '{other}' (expected haso, hitas or puolihitas)"
        )),
    }
}
