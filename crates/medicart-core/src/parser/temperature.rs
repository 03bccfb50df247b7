//! Thermometer lines: `DATA:TEMP=36.5`.
//!
//! Unlike the integer parsers, a value that is not a float is an error.
//! Non-finite values (`NaN`, `inf`) are rejected too: they have no JSON form.

use super::{ParseError, ParseResult};
use crate::event::DeviceEvent;

pub fn parse_temperature_line(line: &str) -> ParseResult {
    let Some(value) = line.trim().strip_prefix("DATA:TEMP=") else {
        return Ok(None);
    };
    let temperature_celsius = value
        .parse::<f64>()
        .map_err(|e| ParseError::InvalidFloat {
            value: value.to_string(),
            reason: e.to_string(),
        })?;
    if !temperature_celsius.is_finite() {
        return Err(ParseError::InvalidFloat {
            value: value.to_string(),
            reason: "not a finite number".to_string(),
        });
    }
    Ok(Some(DeviceEvent::TemperatureReading {
        temperature_celsius,
    }))
}
