//! Glucose meter lines: `DATA:GLU=104`.

use super::int_or_zero;
use crate::event::DeviceEvent;

pub fn parse_glucose_line(line: &str) -> Option<DeviceEvent> {
    line.trim()
        .strip_prefix("DATA:GLU=")
        .map(|value| DeviceEvent::GlucoseReading {
            glucose: int_or_zero(value),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glucose_reading() {
        assert_eq!(
            parse_glucose_line("DATA:GLU=104\r\n"),
            Some(DeviceEvent::GlucoseReading { glucose: 104 })
        );
    }

    #[test]
    fn malformed_value_reads_as_zero() {
        assert_eq!(
            parse_glucose_line("DATA:GLU=HI"),
            Some(DeviceEvent::GlucoseReading { glucose: 0 })
        );
    }

    #[test]
    fn status_lines_are_ignored() {
        assert_eq!(parse_glucose_line("STATUS:STRIP_INSERTED"), None);
    }
}
