//! Prometheus metrics

use axum::http::StatusCode;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

static PROMETHEUS_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Install the Prometheus recorder; call once at startup
///
/// Metric families registered here: `bridge_active_sessions` (gauge),
/// `bridge_frames_in_total` / `bridge_frames_out_total` and
/// `bridge_barge_ins_total` (counters, incremented by the media crate).
pub fn init_metrics() -> Option<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder().ok()?;
    let _ = PROMETHEUS_HANDLE.set(handle.clone());
    Some(handle)
}

/// `GET /metrics`
pub async fn metrics_handler() -> Result<String, StatusCode> {
    let handle = PROMETHEUS_HANDLE
        .get()
        .ok_or(StatusCode::SERVICE_UNAVAILABLE)?;
    Ok(handle.render())
}
