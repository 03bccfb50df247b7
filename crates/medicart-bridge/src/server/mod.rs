//! HTTP and WebSocket server for the Medicart bridge.
//!
//! Serves device streams to browsers, the forward session API, camera
//! commands and the camera frame relay.

mod camera;
mod config;
mod device_ws;
mod error;
mod feed_ws;
mod health;
mod sessions;

pub use config::ServerConfig;
pub use device_ws::ALREADY_RUNNING;
pub use error::ApiError;
pub use health::HealthResponse;
pub use sessions::{StartForwardRequest, StartForwardResponse};

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::routing::{get, post};
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::feed::FrameRelay;
use crate::supervisor::Supervisor;

/// Server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Shared state accessible from handlers.
#[derive(Clone)]
pub struct AppState {
    pub supervisor: Supervisor,
    pub relay: FrameRelay,
    pub config: Arc<ServerConfig>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(config: ServerConfig, supervisor: Supervisor) -> Self {
        Self {
            supervisor,
            relay: FrameRelay::new(),
            config: Arc::new(config),
            start_time: Instant::now(),
        }
    }
}

/// Build the router with all routes. CORS is open to any origin.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/ws/device/{kind}", get(device_ws::device_socket))
        .route(
            "/api/sessions",
            get(sessions::list_sessions).delete(sessions::stop_forward),
        )
        .route("/api/sessions/{kind}", post(sessions::start_forward))
        .route("/api/camera/{action}", post(camera::camera_action))
        .route("/ws/feed", get(feed_ws::feed_socket))
        .route("/ws/stream", get(feed_ws::stream_socket))
        .route("/api/feed/start", post(feed_ws::start_feed))
        .route("/api/feed/stop", post(feed_ws::stop_feed))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind the configured address.
pub async fn bind(addr: SocketAddr) -> Result<TcpListener, ServerError> {
    Ok(TcpListener::bind(addr).await?)
}

/// Serve on `listener` until `shutdown` resolves.
pub async fn serve<F>(
    listener: TcpListener,
    state: AppState,
    shutdown: F,
) -> Result<(), ServerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    info!(%addr, "HTTP server listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.supervisor.active_sessions().len(),
        state.relay.has_feed(),
    ))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use medicart_core::DeviceKind;

    use crate::feed::FeedControl;
    use crate::subprocess::DeviceTool;
    use crate::supervisor::ChannelId;

    fn make_state() -> AppState {
        let config = ServerConfig {
            camera_cli: "./no_such_camera_tool".into(),
            ..ServerConfig::default()
        };
        AppState::new(config, Supervisor::new(DeviceTool::new("./no_such_device_tool")))
    }

    async fn send(
        state: &AppState,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(v) => {
                req = req.header("content-type", "application/json");
                Body::from(v.to_string())
            }
            None => Body::empty(),
        };
        let resp = router(state.clone())
            .oneshot(req.body(body).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), 64 * 1024).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let state = make_state();
        let (status, body) = send(&state, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["active_sessions"], 0);
        assert_eq!(body["feed_connected"], false);
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let state = make_state();
        let (status, _) = send(&state, Method::GET, "/nonexistent", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn list_sessions_shows_claimed_channels() {
        let state = make_state();
        let _guard = state
            .supervisor
            .claim(&ChannelId::forward(), DeviceKind::Nibp, None)
            .unwrap();

        let (status, body) = send(&state, Method::GET, "/api/sessions", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["channel"], "forward");
        assert_eq!(body[0]["kind"], "nibp");
    }

    #[tokio::test]
    async fn duplicate_forward_start_conflicts() {
        let state = make_state();
        let _guard = state
            .supervisor
            .claim(&ChannelId::forward(), DeviceKind::Nibp, None)
            .unwrap();

        let (status, body) = send(
            &state,
            Method::POST,
            "/api/sessions/glucose",
            Some(json!({"patient_name": "Ada"})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["error"].as_str().unwrap().contains("already running"));
    }

    #[tokio::test]
    async fn forward_start_requires_patient() {
        let state = make_state();
        let (status, body) = send(
            &state,
            Method::POST,
            "/api/sessions/glucose",
            Some(json!({"clinic_name": "North"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "patient_name is required");
    }

    #[tokio::test]
    async fn forward_start_reports_launch_failure() {
        let state = make_state();
        let (status, body) = send(
            &state,
            Method::POST,
            "/api/sessions/heartrate",
            Some(json!({"patient_name": "Ada"})),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"].as_str().unwrap().contains("Failed to spawn"));
        assert!(!state.supervisor.is_active(&ChannelId::forward()));
    }

    #[tokio::test]
    async fn unknown_device_kind_is_404() {
        let state = make_state();
        let (status, _) = send(
            &state,
            Method::POST,
            "/api/sessions/ecg",
            Some(json!({"patient_name": "Ada"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn stop_forward_without_session_is_404() {
        let state = make_state();
        let (status, _) = send(&state, Method::DELETE, "/api/sessions", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn stop_forward_cancels_session() {
        let state = make_state();
        let guard = state
            .supervisor
            .claim(&ChannelId::forward(), DeviceKind::Glucose, None)
            .unwrap();

        let (status, body) = send(&state, Method::DELETE, "/api/sessions", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "stopping");
        assert!(guard.cancel_token().is_cancelled());
    }

    #[tokio::test]
    async fn camera_unknown_action_is_404() {
        let state = make_state();
        let (status, _) = send(&state, Method::POST, "/api/camera/zoom", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn camera_missing_tool_is_500() {
        let state = make_state();
        let (status, body) = send(&state, Method::POST, "/api/camera/list", None).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn feed_control_without_feed_is_503() {
        let state = make_state();
        let (status, body) = send(&state, Method::POST, "/api/feed/start", None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], "no desktop connected");
    }

    #[tokio::test]
    async fn feed_control_reaches_connected_feed() {
        let state = make_state();
        let mut feed = state.relay.attach_feed();

        let (status, body) = send(&state, Method::POST, "/api/feed/stop", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "stopped");
        assert_eq!(feed.control.recv().await, Some(FeedControl::Stop));
    }

    #[tokio::test]
    async fn stream_requires_clinic_and_patient() {
        let state = make_state();
        let (status, body) = send(&state, Method::GET, "/ws/stream?clinic=North", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "clinic and patient required");
    }

    #[tokio::test]
    async fn cors_allows_any_origin() {
        let state = make_state();
        let req = Request::builder()
            .method(Method::OPTIONS)
            .uri("/api/sessions")
            .header("origin", "http://dashboard.local")
            .header("access-control-request-method", "POST")
            .body(Body::empty())
            .unwrap();
        let resp = router(state).oneshot(req).await.unwrap();
        assert_eq!(
            resp.headers()
                .get("access-control-allow-origin")
                .unwrap(),
            "*"
        );
    }
}
