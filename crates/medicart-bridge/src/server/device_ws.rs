//! `GET /ws/device/{kind}`: stream a device's readings to a browser.

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use medicart_core::DeviceKind;

use super::AppState;
use super::error::ApiError;
use crate::sink::WebSocketSink;
use crate::supervisor::{ChannelId, Supervisor, Termination, spawn_disconnect_detector};

/// Status message sent when the device's channel is busy.
pub const ALREADY_RUNNING: &str = "already running";

pub(super) async fn device_socket(
    ws: WebSocketUpgrade,
    Path(kind): Path<String>,
    State(state): State<AppState>,
) -> Response {
    let kind = match kind.parse::<DeviceKind>() {
        Ok(kind) => kind,
        Err(e) => return ApiError::not_found(e.to_string()).into_response(),
    };
    let supervisor = state.supervisor.clone();
    ws.on_upgrade(move |socket| stream_device(socket, kind, supervisor))
}

/// Run one device session for a connected socket.
///
/// The socket's inbound half is watched for disconnect; a close or read
/// error cancels the session and kills the device tool.
async fn stream_device(socket: WebSocket, kind: DeviceKind, supervisor: Supervisor) {
    let (outbound, inbound) = socket.split();
    let mut sink = WebSocketSink::new(outbound);
    let channel = ChannelId::websocket(kind);
    let connection = CancellationToken::new();

    let guard = match supervisor.claim(&channel, kind, Some(&connection)) {
        Ok(guard) => guard,
        Err(e) => {
            info!(%channel, error = %e, "Rejecting device socket");
            sink.finish_with_status(ALREADY_RUNNING).await;
            return;
        }
    };

    let running = match supervisor.launch(guard) {
        Ok(running) => running,
        Err(e) => {
            warn!(%channel, error = %e, "Device tool failed to launch");
            sink.finish_with_status(format!("Error: {e}")).await;
            return;
        }
    };

    let detector = spawn_disconnect_detector(inbound, connection.clone());
    let report = running.forward(&mut sink).await;

    // Stops the detector if the session ended on its own.
    connection.cancel();
    if let Err(e) = detector.await {
        warn!(error = %e, "Disconnect detector task failed");
    }

    if report.termination != Termination::SinkGone {
        sink.close().await;
    }
    info!(
        %channel,
        session_id = %report.session_id,
        delivered = report.delivered,
        termination = ?report.termination,
        "Device socket closed"
    );
}
