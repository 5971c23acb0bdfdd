//! Prometheus recorder and metric names.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

use crate::errors::ServerError;

/// Install the global Prometheus recorder.
///
/// Call once at startup, before anything records. A second install in the
/// same process fails.
pub fn install_recorder() -> Result<PrometheusHandle, ServerError> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| ServerError::Metrics(e.to_string()))?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render the Prometheus text exposition.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

/// WebSocket connections accepted (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket connections closed (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Open WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Registry entries (gauge).
pub const SESSIONS_REGISTERED: &str = "sessions_registered";
/// Events handed to the dispatcher (counter).
pub const EVENTS_PUBLISHED_TOTAL: &str = "events_published_total";
/// Frames queued to a live connection (counter).
pub const EVENTS_DELIVERED_TOTAL: &str = "events_delivered_total";
/// Frames dropped on a full connection buffer (counter).
pub const EVENTS_DROPPED_TOTAL: &str = "events_dropped_total";
/// Registry entries pruned because their connection closed (counter).
pub const REGISTRY_PRUNED_TOTAL: &str = "registry_pruned_total";
/// Seconds from upgrade to close (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
