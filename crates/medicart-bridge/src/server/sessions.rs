//! Forward session API.
//!
//! `POST /api/sessions/{kind}` starts a device session forwarding to the
//! collector over HTTP, `DELETE /api/sessions` stops it and
//! `GET /api/sessions` lists every occupied channel.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use medicart_core::DeviceKind;

use super::AppState;
use super::error::ApiError;
use crate::sink::{ForwardIdentity, HttpForwardSink};
use crate::supervisor::{ActiveSessionInfo, ChannelId};

/// Body of a forward start request. Missing fields fall back to the
/// configured defaults.
#[derive(Debug, Default, Deserialize)]
pub struct StartForwardRequest {
    #[serde(default)]
    pub patient_name: Option<String>,
    #[serde(default)]
    pub clinic_name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StartForwardResponse {
    pub session_id: String,
    pub channel: String,
    pub kind: DeviceKind,
    pub url: String,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub(super) async fn start_forward(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Json(req): Json<StartForwardRequest>,
) -> Result<(StatusCode, Json<StartForwardResponse>), ApiError> {
    let kind: DeviceKind = kind
        .parse()
        .map_err(|e: medicart_core::Error| ApiError::not_found(e.to_string()))?;

    let patient = non_blank(req.patient_name)
        .or_else(|| state.config.patient_name.clone())
        .ok_or_else(|| ApiError::bad_request("patient_name is required"))?;
    let clinic = non_blank(req.clinic_name).or_else(|| state.config.clinic_name.clone());
    let url = non_blank(req.url)
        .or_else(|| state.config.forward_url.clone())
        .ok_or_else(|| ApiError::bad_request("url is required"))?;

    let sink = HttpForwardSink::new(
        url.clone(),
        ForwardIdentity::new(patient, clinic),
        state.config.forward_timeout,
    )
    .map_err(|e| ApiError::internal(format!("Failed to build HTTP client: {e}")))?;

    let channel = ChannelId::forward();
    let guard = state.supervisor.claim(&channel, kind, None)?;
    let running = state.supervisor.launch(guard)?;
    let session_id = running.id().to_string();

    tokio::spawn(async move {
        let report = running.forward(sink).await;
        if report.exit.is_error() {
            warn!(
                session_id = %report.session_id,
                exit = %report.exit,
                "Forward session ended with error"
            );
        }
        info!(
            session_id = %report.session_id,
            delivered = report.delivered,
            failed = report.failed,
            termination = ?report.termination,
            "Forward session finished"
        );
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(StartForwardResponse {
            session_id,
            channel: channel.to_string(),
            kind,
            url,
        }),
    ))
}

pub(super) async fn stop_forward(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if state.supervisor.cancel(&ChannelId::forward()) {
        Ok(Json(serde_json::json!({ "status": "stopping" })))
    } else {
        Err(ApiError::not_found("no forward session running"))
    }
}

pub(super) async fn list_sessions(State(state): State<AppState>) -> Json<Vec<ActiveSessionInfo>> {
    Json(state.supervisor.active_sessions())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_fields_are_missing() {
        assert_eq!(non_blank(Some("  ".into())), None);
        assert_eq!(non_blank(None), None);
        assert_eq!(non_blank(Some(" Ada ".into())).as_deref(), Some("Ada"));
    }
}
