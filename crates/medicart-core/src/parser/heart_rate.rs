//! Pulse oximeter lines.
//!
//! ```text
//! DATA:PR=75,SPO2=98
//! STATUS:PROBE_OFF
//! ```

use super::{int_or_zero, parse_kv};
use crate::event::DeviceEvent;

pub fn parse_heart_rate_line(line: &str) -> Option<DeviceEvent> {
    let line = line.trim();
    if let Some(pairs) = line.strip_prefix("DATA:") {
        let kv = parse_kv(pairs);
        let field = |key: &str| kv.get(key).map_or(0, |v| int_or_zero(v));
        return Some(DeviceEvent::HeartRateReading {
            pulse_rate: field("PR"),
            spo2: field("SPO2"),
        });
    }
    line.strip_prefix("STATUS:").map(DeviceEvent::status)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_line() {
        assert_eq!(
            parse_heart_rate_line("DATA:PR=80,SPO2=97"),
            Some(DeviceEvent::HeartRateReading {
                pulse_rate: 80,
                spo2: 97
            })
        );
    }

    #[test]
    fn keys_are_order_independent_and_whitespace_tolerant() {
        assert_eq!(
            parse_heart_rate_line("  DATA:SPO2 = 95 , PR= 61\r\n"),
            Some(DeviceEvent::HeartRateReading {
                pulse_rate: 61,
                spo2: 95
            })
        );
    }

    #[test]
    fn non_numeric_values_default_to_zero() {
        assert_eq!(
            parse_heart_rate_line("DATA:PR=--,SPO2=97"),
            Some(DeviceEvent::HeartRateReading {
                pulse_rate: 0,
                spo2: 97
            })
        );
    }

    #[test]
    fn keys_are_case_sensitive() {
        assert_eq!(
            parse_heart_rate_line("DATA:pr=80,spo2=97"),
            Some(DeviceEvent::HeartRateReading {
                pulse_rate: 0,
                spo2: 0
            })
        );
    }

    #[test]
    fn status_line_keeps_remainder_verbatim() {
        assert_eq!(
            parse_heart_rate_line("STATUS:PROBE_OFF"),
            Some(DeviceEvent::status("PROBE_OFF"))
        );
        assert_eq!(
            parse_heart_rate_line("STATUS:Finger out, retry"),
            Some(DeviceEvent::status("Finger out, retry"))
        );
    }

    #[test]
    fn prefix_is_case_sensitive() {
        assert_eq!(parse_heart_rate_line("data:PR=80,SPO2=97"), None);
    }
}
