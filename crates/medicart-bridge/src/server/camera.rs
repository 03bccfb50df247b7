//! `POST /api/camera/{action}`: run a camera tool command.

use axum::Json;
use axum::extract::{Path, State};
use serde::Serialize;

use super::AppState;
use super::error::ApiError;
use crate::camera::{CameraAction, run_camera_command};

#[derive(Debug, Serialize)]
pub struct CameraResponse {
    pub action: &'static str,
    pub output: String,
}

pub(super) async fn camera_action(
    State(state): State<AppState>,
    Path(action): Path<String>,
) -> Result<Json<CameraResponse>, ApiError> {
    let action: CameraAction = action.parse()?;
    let output = run_camera_command(&state.config.camera_cli, action).await?;
    Ok(Json(CameraResponse {
        action: action.name(),
        output,
    }))
}
