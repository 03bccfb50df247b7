//! Medicart Core Library
//!
//! Shared functionality for Medicart components:
//! - Device kinds and the typed `DeviceEvent` model
//! - Line parsers for the device tool's text protocol
//! - Configuration resolution and hierarchy
//! - Common error types

pub mod config;
pub mod device;
pub mod error;
pub mod event;
pub mod parser;
pub mod tracing_init;

pub use config::Config;
pub use device::DeviceKind;
pub use error::{Error, Result};
pub use event::DeviceEvent;
pub use parser::{ParseError, parse_line};
