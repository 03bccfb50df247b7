//! Device kinds supported by the device tool.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// The measurement mode the device tool is launched in.
///
/// Selects both the tool's mode flag and the line parser applied to its output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    /// Pulse rate and SpO2 from the pulse oximeter.
    HeartRate,
    /// Non-invasive blood pressure cuff.
    Nibp,
    /// Blood glucose meter.
    Glucose,
    /// Thermometer.
    Temperature,
}

impl DeviceKind {
    /// All device kinds, in menu order.
    pub const ALL: [Self; 4] = [Self::HeartRate, Self::Nibp, Self::Glucose, Self::Temperature];

    /// Command-line flag that puts the device tool into this mode.
    pub const fn mode_flag(self) -> &'static str {
        match self {
            Self::HeartRate => "-heartrate",
            Self::Nibp => "-nibp",
            Self::Glucose => "-glu",
            Self::Temperature => "-temperature",
        }
    }

    /// Short URL-safe name used in routes and on the command line.
    pub const fn slug(self) -> &'static str {
        match self {
            Self::HeartRate => "heartrate",
            Self::Nibp => "nibp",
            Self::Glucose => "glucose",
            Self::Temperature => "temperature",
        }
    }

    /// Human-readable label for log output.
    pub const fn label(self) -> &'static str {
        match self {
            Self::HeartRate => "Heart Rate / SpO2",
            Self::Nibp => "NIBP",
            Self::Glucose => "Glucose",
            Self::Temperature => "Temperature",
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for DeviceKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "heartrate" | "heart_rate" | "heart-rate" | "spo2" => Ok(Self::HeartRate),
            "nibp" | "bp" => Ok(Self::Nibp),
            "glucose" | "glu" => Ok(Self::Glucose),
            "temperature" | "temp" => Ok(Self::Temperature),
            _ => Err(Error::UnknownDeviceKind(s.to_string())),
        }
    }
}
