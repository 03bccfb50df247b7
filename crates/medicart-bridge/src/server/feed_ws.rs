//! Camera feed and viewer sockets.
//!
//! `GET /ws/feed` accepts the desktop feed: text frames carry clinic and
//! patient metadata, binary frames carry JPEG images. `GET /ws/stream`
//! accepts a viewer for one clinic/patient pair. `POST /api/feed/{start,stop}`
//! forward control commands to the feed.

use axum::Json;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{FromRequestParts, Query, State};
use axum::http::request::Parts;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{debug, info};

use super::AppState;
use super::error::ApiError;
use crate::feed::{FeedControl, FeedMetadata, FeedRegistration, FrameRelay, StreamKey, UNKNOWN};

pub(super) async fn feed_socket(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let relay = state.relay.clone();
    ws.on_upgrade(move |socket| run_feed(socket, relay))
}

async fn run_feed(socket: WebSocket, relay: FrameRelay) {
    let (mut outbound, mut inbound) = socket.split();
    let FeedRegistration { id, mut control } = relay.attach_feed();
    let mut clinic = UNKNOWN.to_string();
    let mut patient = UNKNOWN.to_string();

    loop {
        tokio::select! {
            command = control.recv() => {
                let Some(command) = command else {
                    info!(id, "Feed superseded by a newer connection");
                    break;
                };
                if outbound.send(Message::Text(command.as_str().into())).await.is_err() {
                    break;
                }
            }
            frame = inbound.next() => match frame {
                Some(Ok(Message::Binary(image))) => {
                    relay.broadcast(&StreamKey::new(&clinic, &patient), &image);
                }
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<FeedMetadata>(text.as_str()) {
                        Ok(meta) => meta.apply(&mut clinic, &mut patient),
                        Err(_) => debug!(id, text = text.as_str(), "Feed text message"),
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(id, error = %e, "Feed read failed");
                    break;
                }
            },
        }
    }

    relay.detach_feed(id);
    let _ = outbound.close().await;
}

#[derive(Debug, Deserialize)]
struct StreamQuery {
    clinic: Option<String>,
    patient: Option<String>,
}

/// Viewer target taken from `?clinic=&patient=`; both are required.
#[derive(Debug)]
pub struct StreamTarget(pub StreamKey);

impl<S: Send + Sync> FromRequestParts<S> for StreamTarget {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(query) = Query::<StreamQuery>::from_request_parts(parts, state)
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?;
        match (query.clinic, query.patient) {
            (Some(clinic), Some(patient)) if !clinic.is_empty() && !patient.is_empty() => {
                Ok(Self(StreamKey::new(&clinic, &patient)))
            }
            _ => Err(ApiError::bad_request("clinic and patient required")),
        }
    }
}

pub(super) async fn stream_socket(
    State(state): State<AppState>,
    StreamTarget(key): StreamTarget,
    ws: WebSocketUpgrade,
) -> Response {
    let relay = state.relay.clone();
    ws.on_upgrade(move |socket| run_viewer(socket, relay, key))
}

async fn run_viewer(socket: WebSocket, relay: FrameRelay, key: StreamKey) {
    let (mut outbound, mut inbound) = socket.split();
    let mut subscription = relay.subscribe(key);

    loop {
        tokio::select! {
            image = subscription.frames.recv() => {
                let Some(image) = image else { break };
                if outbound.send(Message::Binary(image)).await.is_err() {
                    break;
                }
            }
            frame = inbound.next() => match frame {
                Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    relay.unsubscribe(&subscription.key, subscription.id);
    let _ = outbound.close().await;
}

fn control_feed(
    state: &AppState,
    command: FeedControl,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.relay.send_control(command)?;
    let status = match command {
        FeedControl::Start => "started",
        FeedControl::Stop => "stopped",
    };
    Ok(Json(serde_json::json!({ "status": status })))
}

pub(super) async fn start_feed(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    control_feed(&state, FeedControl::Start)
}

pub(super) async fn stop_feed(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    control_feed(&state, FeedControl::Stop)
}
