//! NIBP (blood pressure cuff) lines.
//!
//! The whole line is normalized first: spaces and carriage returns are
//! removed and everything is uppercased. Result pairs come either as
//! `KEY=VALUE` or, from some firmware revisions, as a bare `KEY<digits>`.
//!
//! ```text
//! DATA:CUFF_PRESSURE=142
//! DATA:NIBP_RESULT:SYS=110,DIA=70,MAP=85,PR=72,IRR=False
//! DATA:NIBP_RESULT:SYS110,DIA70,MAP85,PR72
//! STATUS:NIBP_ERROR=3
//! STATUS:NIBP_END
//! ```

use std::collections::HashMap;

use super::int_or_zero;
use crate::event::DeviceEvent;

/// Keys that may appear without `=`. Checked in this order.
const BARE_KEYS: [&str; 4] = ["MAP", "PR", "SYS", "DIA"];

fn normalize(line: &str) -> String {
    line.chars()
        .filter(|c| *c != ' ' && *c != '\r')
        .collect::<String>()
        .to_uppercase()
}

pub fn parse_nibp_line(line: &str) -> Option<DeviceEvent> {
    let normalized = normalize(line);

    if let Some(value) = normalized.strip_prefix("DATA:CUFF_PRESSURE=") {
        return Some(DeviceEvent::CuffUpdate {
            cuff_pressure: int_or_zero(value),
        });
    }
    if let Some(parts) = normalized.strip_prefix("DATA:NIBP_RESULT:") {
        return Some(parse_result(parts));
    }
    if let Some(code) = normalized.strip_prefix("STATUS:NIBP_ERROR=") {
        return Some(DeviceEvent::NibpError {
            code: int_or_zero(code),
        });
    }
    if normalized.starts_with("STATUS:NIBP_END") {
        return Some(DeviceEvent::status("NIBP_END"));
    }
    None
}

fn parse_result(parts: &str) -> DeviceEvent {
    let mut fields: HashMap<&str, &str> = HashMap::new();
    for part in parts.split(',') {
        if let Some((key, value)) = part.split_once('=') {
            fields.insert(key, value);
        } else if let Some((key, value)) = BARE_KEYS
            .iter()
            .find_map(|key| part.strip_prefix(key).map(|v| (*key, v)))
        {
            fields.insert(key, value);
        }
    }

    let field = |key: &str| fields.get(key).map_or(0, |v| int_or_zero(v));
    DeviceEvent::NibpResult {
        systolic: field("SYS"),
        diastolic: field("DIA"),
        mean_pressure: field("MAP"),
        pulse_rate: field("PR"),
        irregular: fields.get("IRR").is_some_and(|v| *v == "TRUE"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(sys: i64, dia: i64, map: i64, pr: i64, irr: bool) -> Option<DeviceEvent> {
        Some(DeviceEvent::NibpResult {
            systolic: sys,
            diastolic: dia,
            mean_pressure: map,
            pulse_rate: pr,
            irregular: irr,
        })
    }

    #[test]
    fn cuff_pressure_update() {
        assert_eq!(
            parse_nibp_line("DATA:CUFF_PRESSURE=142\r"),
            Some(DeviceEvent::CuffUpdate { cuff_pressure: 142 })
        );
    }

    #[test]
    fn result_with_equals_pairs() {
        assert_eq!(
            parse_nibp_line("DATA:NIBP_RESULT:SYS=110,DIA=70,MAP=85,PR=72,IRR=False"),
            result(110, 70, 85, 72, false)
        );
    }

    #[test]
    fn concatenated_pairs_match_equals_pairs() {
        assert_eq!(
            parse_nibp_line("DATA:NIBP_RESULT:SYS110,DIA70,MAP85,PR72"),
            parse_nibp_line("DATA:NIBP_RESULT:SYS=110,DIA=70,MAP=85,PR=72,IRR=False")
        );
    }

    #[test]
    fn mixed_forms_are_merged() {
        assert_eq!(
            parse_nibp_line("DATA:NIBP_RESULT:SYS=121,DIA=79,MAP94,PR66,IRR=TRUE"),
            result(121, 79, 94, 66, true)
        );
    }

    #[test]
    fn whole_line_is_case_and_space_insensitive() {
        assert_eq!(
            parse_nibp_line("data:nibp_result: sys=110, dia=70"),
            parse_nibp_line("DATA:NIBP_RESULT:SYS=110,DIA=70")
        );
        assert_eq!(
            parse_nibp_line("data : nibp_result : sys = 110 , irr = true"),
            result(110, 0, 0, 0, true)
        );
    }

    #[test]
    fn irr_is_true_only_for_literal_true() {
        assert_eq!(
            parse_nibp_line("DATA:NIBP_RESULT:SYS=110,IRR=1"),
            result(110, 0, 0, 0, false)
        );
        assert_eq!(
            parse_nibp_line("DATA:NIBP_RESULT:SYS=110,IRR=True"),
            result(110, 0, 0, 0, true)
        );
        assert_eq!(
            parse_nibp_line("DATA:NIBP_RESULT:SYS=110"),
            result(110, 0, 0, 0, false)
        );
    }

    #[test]
    fn error_code() {
        assert_eq!(
            parse_nibp_line("STATUS:NIBP_ERROR=3"),
            Some(DeviceEvent::NibpError { code: 3 })
        );
        assert_eq!(
            parse_nibp_line("STATUS:NIBP_ERROR=x"),
            Some(DeviceEvent::NibpError { code: 0 })
        );
    }

    #[test]
    fn end_marker_needs_no_equals() {
        assert_eq!(
            parse_nibp_line("STATUS:NIBP_END"),
            Some(DeviceEvent::status("NIBP_END"))
        );
        assert_eq!(
            parse_nibp_line("status:nibp_end ok"),
            Some(DeviceEvent::status("NIBP_END"))
        );
    }

    #[test]
    fn other_status_lines_are_ignored() {
        assert_eq!(parse_nibp_line("STATUS:PROBE_OFF"), None);
    }
}
