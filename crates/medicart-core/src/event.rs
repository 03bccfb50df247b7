//! Typed device events and their wire JSON form.
//!
//! The wire shapes are a compatibility contract with the browser dashboard
//! and the collector, so serialization is written out by hand rather than
//! derived: several variants share the `"data"` tag.

use serde::ser::{Serialize, SerializeMap, Serializer};

/// A single reading or status report produced by a line parser.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    /// Instantaneous pulse oximeter reading.
    HeartRateReading { pulse_rate: i64, spo2: i64 },
    /// Non-data status line (probe off, measurement end, ...).
    DeviceStatus { message: String },
    /// Intermediate NIBP cuff inflation pressure.
    CuffUpdate { cuff_pressure: i64 },
    /// Final NIBP measurement.
    NibpResult {
        systolic: i64,
        diastolic: i64,
        mean_pressure: i64,
        pulse_rate: i64,
        irregular: bool,
    },
    /// Device-reported NIBP failure code.
    NibpError { code: i64 },
    /// Instantaneous glucose value.
    GlucoseReading { glucose: i64 },
    /// Instantaneous body temperature.
    TemperatureReading { temperature_celsius: f64 },
}

impl DeviceEvent {
    /// The `type` discriminant written on the wire.
    pub const fn wire_type(&self) -> &'static str {
        match self {
            Self::HeartRateReading { .. }
            | Self::GlucoseReading { .. }
            | Self::TemperatureReading { .. } => "data",
            Self::DeviceStatus { .. } => "status",
            Self::CuffUpdate { .. } => "cuff_update",
            Self::NibpResult { .. } => "result",
            Self::NibpError { .. } => "error",
        }
    }

    /// Convenience constructor for status events.
    pub fn status(message: impl Into<String>) -> Self {
        Self::DeviceStatus {
            message: message.into(),
        }
    }

    /// Serialize to a JSON object value.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

impl Serialize for DeviceEvent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("type", self.wire_type())?;
        match self {
            Self::HeartRateReading { pulse_rate, spo2 } => {
                map.serialize_entry("pr", pulse_rate)?;
                map.serialize_entry("spo2", spo2)?;
            }
            Self::DeviceStatus { message } => {
                map.serialize_entry("msg", message)?;
            }
            Self::CuffUpdate { cuff_pressure } => {
                map.serialize_entry("cuff_pressure", cuff_pressure)?;
            }
            Self::NibpResult {
                systolic,
                diastolic,
                mean_pressure,
                pulse_rate,
                irregular,
            } => {
                map.serialize_entry("sys", systolic)?;
                map.serialize_entry("dia", diastolic)?;
                map.serialize_entry("map", mean_pressure)?;
                map.serialize_entry("pr", pulse_rate)?;
                map.serialize_entry("irr", irregular)?;
            }
            Self::NibpError { code } => {
                map.serialize_entry("code", code)?;
            }
            Self::GlucoseReading { glucose } => {
                map.serialize_entry("glu", glucose)?;
            }
            Self::TemperatureReading {
                temperature_celsius,
            } => {
                map.serialize_entry("temp", temperature_celsius)?;
            }
        }
        map.end()
    }
}
