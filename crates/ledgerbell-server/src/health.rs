//! `/health` endpoint.

use std::time::Instant;

use serde::Serialize;

/// Registered sessions per role.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SessionCounts {
    /// Admin dashboards.
    pub admin: usize,
    /// Regular users.
    pub user: usize,
}

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` when the server is running.
    pub status: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Open WebSocket connections, registered or not.
    pub connections: usize,
    /// Registry entries.
    pub sessions: SessionCounts,
    /// RFC 3339 time the response was built.
    pub timestamp: String,
}

/// Build a health response from live counters.
pub fn health_check(start_time: Instant, connections: usize, sessions: SessionCounts) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        uptime_secs: start_time.elapsed().as_secs(),
        connections,
        sessions,
        timestamp: chrono::Utc::now().to_rfc3339(),
    }
}
