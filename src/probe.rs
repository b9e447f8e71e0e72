//! Verification probe parsing and timezone expectation.
//!
//! The probe output is compared semantically, not textually echoed back: the
//! expected abbreviation and offset come from the *local* timezone database,
//! so a host that lies about its exit status still fails verification.

use crate::types::Timezone;
use chrono::{DateTime, Offset, TimeZone, Utc};
use chrono_tz::OffsetName;
use serde::{Deserialize, Serialize};

/// One observation of a host's timezone state: the abbreviation and offset
/// reported by `date`, and the identifier `/etc/localtime` resolves to.
///
/// Used both for what the probe reported and for what the local database
/// says the host *should* report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimezoneReading {
    /// Timezone abbreviation (e.g. `CET`), or the numeric form for zones
    /// without one (e.g. `-05`).
    pub abbreviation: String,
    /// UTC offset in `±HH:MM` form, exactly as `date +%:z` prints it.
    pub offset_text: String,
    /// IANA identifier.
    pub identifier: String,
}

/// Parse raw probe output into a reading.
///
/// Requires exactly two non-empty lines after trimming; line 1 splits on the
/// first space into abbreviation and offset text. Returns `None` on any
/// deviation — malformed output is a verification failure, not a crash.
pub fn parse_probe(raw: &str) -> Option<TimezoneReading> {
    let lines: Vec<&str> = raw
        .trim()
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    let [first, identifier] = lines[..] else {
        return None;
    };

    let (abbreviation, offset_text) = first.split_once(' ')?;
    if abbreviation.is_empty() || offset_text.is_empty() {
        return None;
    }

    Some(TimezoneReading {
        abbreviation: abbreviation.to_string(),
        offset_text: offset_text.to_string(),
        identifier: identifier.to_string(),
    })
}

/// Format a signed offset in seconds as `±HH:MM`.
///
/// Matches the remote probe's `date +%:z` rendering byte-for-byte so the
/// comparison can be textual: `+` covers zero, magnitude is taken from the
/// absolute value, both fields are zero-padded.
pub fn format_offset(offset_seconds: i32) -> String {
    let sign = if offset_seconds >= 0 { '+' } else { '-' };
    let magnitude = offset_seconds.unsigned_abs();
    let hours = magnitude / 3600;
    let minutes = (magnitude % 3600) / 60;
    format!("{sign}{hours:02}:{minutes:02}")
}

/// Numeric stand-in for zones whose tz entry carries no alphabetic
/// abbreviation, matching what `date +%Z` prints there (`+04`, `-0330`).
fn numeric_abbreviation(offset_seconds: i32) -> String {
    let sign = if offset_seconds >= 0 { '+' } else { '-' };
    let magnitude = offset_seconds.unsigned_abs();
    let hours = magnitude / 3600;
    let minutes = (magnitude % 3600) / 60;
    if minutes == 0 {
        format!("{sign}{hours:02}")
    } else {
        format!("{sign}{hours:02}{minutes:02}")
    }
}

/// Compute the reading a correctly configured host should report for the
/// desired timezone at the given instant.
pub fn expected_reading(timezone: &Timezone, at: DateTime<Utc>) -> TimezoneReading {
    let offset = timezone.tz().offset_from_utc_datetime(&at.naive_utc());
    let offset_seconds = offset.fix().local_minus_utc();
    let abbreviation = offset
        .abbreviation()
        .map(str::to_string)
        .unwrap_or_else(|| numeric_abbreviation(offset_seconds));

    TimezoneReading {
        abbreviation,
        offset_text: format_offset(offset_seconds),
        identifier: timezone.as_str().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn winter() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap()
    }

    fn summer() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, 15, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_format_offset_positive() {
        assert_eq!(format_offset(3600), "+01:00");
        assert_eq!(format_offset(20700), "+05:45");
    }

    #[test]
    fn test_format_offset_negative() {
        assert_eq!(format_offset(-7200), "-02:00");
        assert_eq!(format_offset(-12600), "-03:30");
    }

    #[test]
    fn test_format_offset_zero_is_positive() {
        assert_eq!(format_offset(0), "+00:00");
    }

    #[test]
    fn test_format_offset_roundtrip_within_minute() {
        // Parsing our own output recovers the offset to the minute.
        for seconds in [-45900, -3600, 0, 59, 3661, 20700] {
            let text = format_offset(seconds);
            let (sign, rest) = text.split_at(1);
            let (hh, mm) = rest.split_once(':').unwrap();
            let mut recovered = hh.parse::<i32>().unwrap() * 3600 + mm.parse::<i32>().unwrap() * 60;
            if sign == "-" {
                recovered = -recovered;
            }
            assert_eq!(recovered / 60, seconds / 60);
            assert_eq!(format_offset(recovered), text);
        }
    }

    #[test]
    fn test_parse_probe_well_formed() {
        let reading = parse_probe("CET +01:00\nEurope/Berlin\n").unwrap();
        assert_eq!(reading.abbreviation, "CET");
        assert_eq!(reading.offset_text, "+01:00");
        assert_eq!(reading.identifier, "Europe/Berlin");
    }

    #[test]
    fn test_parse_probe_keeps_remainder_as_offset_text() {
        // Everything after the first space belongs to the offset field.
        let reading = parse_probe("CET +01:00 extra\nEurope/Berlin").unwrap();
        assert_eq!(reading.abbreviation, "CET");
        assert_eq!(reading.offset_text, "+01:00 extra");
    }

    #[test]
    fn test_parse_probe_wrong_line_count() {
        assert!(parse_probe("CET +01:00").is_none());
        assert!(parse_probe("").is_none());
        assert!(parse_probe("a b\nc\nd").is_none());
        assert!(parse_probe("\n\n").is_none());
    }

    #[test]
    fn test_parse_probe_missing_separator_or_empty_field() {
        assert!(parse_probe("CET+01:00\nEurope/Berlin").is_none());
        assert!(parse_probe(" +01:00\nEurope/Berlin").is_none());
    }

    #[test]
    fn test_expected_reading_berlin_winter() {
        let tz = Timezone::parse("Europe/Berlin").unwrap();
        let reading = expected_reading(&tz, winter());
        assert_eq!(reading.abbreviation, "CET");
        assert_eq!(reading.offset_text, "+01:00");
        assert_eq!(reading.identifier, "Europe/Berlin");
    }

    #[test]
    fn test_expected_reading_berlin_summer() {
        let tz = Timezone::parse("Europe/Berlin").unwrap();
        let reading = expected_reading(&tz, summer());
        assert_eq!(reading.abbreviation, "CEST");
        assert_eq!(reading.offset_text, "+02:00");
    }

    #[test]
    fn test_expected_reading_utc() {
        let tz = Timezone::parse("UTC").unwrap();
        let reading = expected_reading(&tz, winter());
        assert_eq!(reading.abbreviation, "UTC");
        assert_eq!(reading.offset_text, "+00:00");
    }

    #[test]
    fn test_expected_reading_half_hour_zone() {
        let tz = Timezone::parse("Asia/Kathmandu").unwrap();
        let reading = expected_reading(&tz, winter());
        assert_eq!(reading.offset_text, "+05:45");
    }

    #[test]
    fn test_numeric_abbreviation_forms() {
        assert_eq!(numeric_abbreviation(14400), "+04");
        assert_eq!(numeric_abbreviation(-12600), "-0330");
        assert_eq!(numeric_abbreviation(0), "+00");
    }
}
