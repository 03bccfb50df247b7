//! Camera control tool.
//!
//! Each action is a one-shot invocation of the camera tool; its combined
//! output is returned to the caller.

use std::fmt;
use std::process::Stdio;
use std::str::FromStr;

use tokio::process::Command;
use tracing::{info, warn};

use crate::subprocess::resolve_executable;

/// Commands understood by the camera tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraAction {
    List,
    MoveLeft,
    MoveRight,
    MoveUp,
    MoveDown,
}

impl CameraAction {
    pub const ALL: [Self; 5] = [
        Self::List,
        Self::MoveLeft,
        Self::MoveRight,
        Self::MoveUp,
        Self::MoveDown,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Self::List => "list",
            Self::MoveLeft => "move-left",
            Self::MoveRight => "move-right",
            Self::MoveUp => "move-up",
            Self::MoveDown => "move-down",
        }
    }

    /// Command-line flag selecting this action.
    pub const fn flag(self) -> &'static str {
        match self {
            Self::List => "-list",
            Self::MoveLeft => "-move-left",
            Self::MoveRight => "-move-right",
            Self::MoveUp => "-move-up",
            Self::MoveDown => "-move-down",
        }
    }
}

impl fmt::Display for CameraAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CameraAction {
    type Err = CameraError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|action| action.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| CameraError::UnknownAction(s.to_string()))
    }
}

/// Camera tool errors.
#[derive(Debug, thiserror::Error)]
pub enum CameraError {
    #[error("Unknown camera action: {0}")]
    UnknownAction(String),

    #[error("Failed to run camera tool {program}: {reason}")]
    Spawn { program: String, reason: String },

    #[error("Camera tool exited with status {code:?}: {output}")]
    Failed { code: Option<i32>, output: String },

    #[error("Camera reported error: {0}")]
    Reported(String),
}

/// Run the camera tool for `action` and return its trimmed output.
///
/// stdout and stderr are captured together (stdout first). Output that
/// starts with `DATA:ERROR`, in any case, is reported as an error even when
/// the tool exits successfully.
pub async fn run_camera_command(
    program: &str,
    action: CameraAction,
) -> Result<String, CameraError> {
    let path = resolve_executable(program);
    info!(program = %path.display(), %action, "Running camera command");

    let output = Command::new(&path)
        .arg(action.flag())
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| CameraError::Spawn {
            program: path.display().to_string(),
            reason: e.to_string(),
        })?;

    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));
    let combined = combined.trim().to_string();

    if !output.status.success() {
        warn!(%action, code = ?output.status.code(), output = %combined, "Camera command failed");
        return Err(CameraError::Failed {
            code: output.status.code(),
            output: combined,
        });
    }

    if combined.to_ascii_uppercase().starts_with("DATA:ERROR") {
        warn!(%action, output = %combined, "Camera reported error");
        return Err(CameraError::Reported(combined));
    }

    info!(%action, "Camera command completed");
    Ok(combined)
}
