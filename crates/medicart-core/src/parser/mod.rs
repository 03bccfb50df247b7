//! Line parsers for the device tool's text protocol.
//!
//! Implements tolerant reader pattern: a line that matches no known shape
//! yields `Ok(None)` and is dropped, so firmware log noise never reaches a
//! sink. Integer fields that fail to parse read as 0. The temperature parser
//! is the exception: a malformed float is returned as an error.

mod glucose;
mod heart_rate;
mod nibp;
mod temperature;

use std::collections::HashMap;

use thiserror::Error;

use crate::device::DeviceKind;
use crate::event::DeviceEvent;

pub use glucose::parse_glucose_line;
pub use heart_rate::parse_heart_rate_line;
pub use nibp::parse_nibp_line;
pub use temperature::parse_temperature_line;

/// Result of parsing one line: an event, nothing, or a propagated failure.
pub type ParseResult = Result<Option<DeviceEvent>, ParseError>;

/// A recognized line whose payload could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("invalid float value {value:?}: {reason}")]
    InvalidFloat { value: String, reason: String },
}

/// Parse a single line of device-tool output with the parser for `kind`.
pub fn parse_line(kind: DeviceKind, line: &str) -> ParseResult {
    match kind {
        DeviceKind::HeartRate => Ok(parse_heart_rate_line(line)),
        DeviceKind::Nibp => Ok(parse_nibp_line(line)),
        DeviceKind::Glucose => Ok(parse_glucose_line(line)),
        DeviceKind::Temperature => parse_temperature_line(line),
    }
}

/// Parse an integer field, reading anything malformed as 0.
pub(crate) fn int_or_zero(value: &str) -> i64 {
    value.parse().unwrap_or(0)
}

/// Split `K=V,K=V` into a map. Keys and values are trimmed; parts without
/// `=` are ignored; a repeated key keeps its last value.
pub(crate) fn parse_kv(input: &str) -> HashMap<String, String> {
    input
        .split(',')
        .filter_map(|part| part.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect()
}
