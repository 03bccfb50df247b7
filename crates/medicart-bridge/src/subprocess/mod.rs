//! Subprocess management for the device tool.

pub mod launcher;
pub mod session;

pub use launcher::{DeviceTool, resolve_executable};
pub use session::{CancelHandle, ExitOutcome, LaunchError, ProcessSession, SessionState};
