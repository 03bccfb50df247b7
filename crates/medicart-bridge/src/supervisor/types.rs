//! Supervisor types.

use std::fmt;

use serde::Serialize;

use medicart_core::DeviceKind;

use crate::subprocess::{ExitOutcome, LaunchError};

/// Name of an output slot. At most one session runs per channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(String);

impl ChannelId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Channel for a browser WebSocket streaming `kind`.
    pub fn websocket(kind: DeviceKind) -> Self {
        Self(format!("ws:{}", kind.slug()))
    }

    /// Channel for server-managed HTTP forwarding.
    pub fn forward() -> Self {
        Self("forward".to_string())
    }

    /// Channel for the foreground `upload` command.
    pub fn upload() -> Self {
        Self("upload".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Supervisor errors.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("{kind} session already running on channel {channel}")]
    AlreadyRunning { channel: ChannelId, kind: DeviceKind },

    #[error(transparent)]
    Launch(#[from] LaunchError),
}

/// Why a session loop stopped reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// The device tool closed its output.
    EndOfStream,
    /// The sink reported its consumer gone.
    SinkGone,
    /// The session was cancelled.
    Cancelled,
}

/// Summary of a finished session.
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub session_id: String,
    pub channel: ChannelId,
    pub kind: DeviceKind,
    /// Events the sink accepted.
    pub delivered: u64,
    /// Lines that produced no event.
    pub skipped: u64,
    /// Recognized lines that failed to parse.
    pub parse_errors: u64,
    /// Events the sink failed to deliver (non-fatal failures only).
    pub failed: u64,
    pub termination: Termination,
    pub exit: ExitOutcome,
}

/// Snapshot of an occupied channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActiveSessionInfo {
    pub channel: String,
    pub kind: DeviceKind,
    /// `None` while the device tool is still being launched.
    pub session_id: Option<String>,
    pub pid: Option<u32>,
    pub running_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_names() {
        assert_eq!(ChannelId::websocket(DeviceKind::Nibp).as_str(), "ws:nibp");
        assert_eq!(
            ChannelId::websocket(DeviceKind::HeartRate).to_string(),
            "ws:heartrate"
        );
        assert_eq!(ChannelId::forward().as_str(), "forward");
        assert_eq!(ChannelId::upload().as_str(), "upload");
        assert_ne!(ChannelId::forward(), ChannelId::upload());
    }

    #[test]
    fn already_running_message_names_channel() {
        let err = SupervisorError::AlreadyRunning {
            channel: ChannelId::forward(),
            kind: DeviceKind::Glucose,
        };
        assert_eq!(
            err.to_string(),
            "glucose session already running on channel forward"
        );
    }
}
