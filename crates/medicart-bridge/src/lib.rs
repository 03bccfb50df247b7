//! Medicart Bridge Library
//!
//! Core functionality for the Medicart bridge:
//! - Device tool process sessions with cancellation
//! - Session supervision, one session per channel
//! - Event sinks for WebSocket clients and HTTP collectors
//! - Camera tool commands and the camera frame relay
//! - HTTP/WebSocket server

pub mod camera;
pub mod feed;
pub mod server;
pub mod sink;
pub mod subprocess;
pub mod supervisor;
