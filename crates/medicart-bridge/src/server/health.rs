//! `/health` endpoint.

use std::time::Instant;

use serde::Serialize;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` when the server is running.
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
    /// Occupied session channels.
    pub active_sessions: usize,
    /// Whether a camera feed is connected.
    pub feed_connected: bool,
}

pub fn health_check(
    start_time: Instant,
    active_sessions: usize,
    feed_connected: bool,
) -> HealthResponse {
    HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: start_time.elapsed().as_secs(),
        active_sessions,
        feed_connected,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn status_is_ok() {
        let resp = health_check(Instant::now(), 0, false);
        assert_eq!(resp.status, "ok");
        assert!(resp.uptime_secs < 2);
    }

    #[test]
    fn uptime_counts_from_start() {
        let start = Instant::now().checked_sub(Duration::from_secs(60)).unwrap();
        let resp = health_check(start, 2, true);
        assert!(resp.uptime_secs >= 59);
        assert_eq!(resp.active_sessions, 2);
        assert!(resp.feed_connected);
    }
}
