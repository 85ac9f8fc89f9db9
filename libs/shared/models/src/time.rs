//! Calendar and clock-time helpers shared by the scheduling cells.
//!
//! Scheduling arithmetic works on minute-of-day offsets (`0..=1440`) so an
//! interval ending at midnight stays representable.

use chrono::{NaiveDate, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MINUTES_PER_DAY: u32 = 24 * 60;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimeParseError {
    #[error("invalid calendar date '{0}', expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("invalid clock time '{0}', expected HH:MM")]
    InvalidTime(String),
}

/// Parse a calendar date the way front-desk clients send it.
///
/// Only the leading `YYYY-MM-DD` is read. A trailing time-of-day or offset
/// (`2024-03-04T23:30:00-05:00`) is ignored rather than converted, so the
/// date a user picked never drifts across a timezone boundary.
pub fn parse_calendar_date(raw: &str) -> Result<NaiveDate, TimeParseError> {
    let trimmed = raw.trim();
    let date_part = match trimmed.get(..10) {
        Some(prefix) => {
            let rest = &trimmed[10..];
            if rest.is_empty() || rest.starts_with('T') || rest.starts_with(' ') {
                prefix
            } else {
                return Err(TimeParseError::InvalidDate(raw.to_string()));
            }
        }
        None => return Err(TimeParseError::InvalidDate(raw.to_string())),
    };

    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .map_err(|_| TimeParseError::InvalidDate(raw.to_string()))
}

/// Accepts `HH:MM` or `HH:MM:SS`.
pub fn parse_clock_time(raw: &str) -> Result<NaiveTime, TimeParseError> {
    let trimmed = raw.trim();
    NaiveTime::parse_from_str(trimmed, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M:%S"))
        .map_err(|_| TimeParseError::InvalidTime(raw.to_string()))
}

pub fn minute_of_day(time: NaiveTime) -> u32 {
    time.hour() * 60 + time.minute()
}

/// `None` for offsets at or past midnight.
pub fn time_from_minute(minute: u32) -> Option<NaiveTime> {
    if minute >= MINUTES_PER_DAY {
        return None;
    }
    NaiveTime::from_hms_opt(minute / 60, minute % 60, 0)
}

/// Exclusive end offset of a booking, never shorter than one slot.
/// Saturates instead of wrapping on absurd durations.
pub fn booking_end_minute(start: u32, duration_minutes: Option<u32>, slot_minutes: u32) -> u32 {
    start.saturating_add(duration_minutes.unwrap_or(slot_minutes).max(slot_minutes))
}

/// Half-open `[start, end)` overlap.
pub fn intervals_overlap(a_start: u32, a_end: u32, b_start: u32, b_end: u32) -> bool {
    a_start < b_end && a_end > b_start
}

/// A clock-time range within one day, `start` inclusive and `end` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeRange {
    #[serde(with = "hhmm")]
    pub start: NaiveTime,
    #[serde(with = "hhmm")]
    pub end: NaiveTime,
}

impl TimeRange {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    pub fn is_valid(&self) -> bool {
        self.start < self.end
    }

    pub fn start_minute(&self) -> u32 {
        minute_of_day(self.start)
    }

    pub fn end_minute(&self) -> u32 {
        minute_of_day(self.end)
    }

    pub fn overlaps_minutes(&self, start: u32, end: u32) -> bool {
        intervals_overlap(self.start_minute(), self.end_minute(), start, end)
    }

    pub fn contains_minutes(&self, start: u32, end: u32) -> bool {
        self.start_minute() <= start && end <= self.end_minute()
    }
}

/// Serde adapter writing `HH:MM` and reading `HH:MM` or `HH:MM:SS`.
pub mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&time.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        super::parse_clock_time(&raw).map_err(serde::de::Error::custom)
    }
}

/// Serde adapter for calendar dates using [`parse_calendar_date`] on input.
pub mod calendar_date {
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(date: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&date.format("%Y-%m-%d").to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        super::parse_calendar_date(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_plain_date_parses() {
        assert_eq!(parse_calendar_date("2024-03-04").unwrap(), date(2024, 3, 4));
    }

    #[test]
    fn test_late_evening_with_negative_offset_keeps_local_date() {
        // 23:30 at -05:00 is already the 5th in UTC; the picked date is the 4th.
        assert_eq!(
            parse_calendar_date("2024-03-04T23:30:00-05:00").unwrap(),
            date(2024, 3, 4)
        );
    }

    #[test]
    fn test_early_morning_utc_midnight_keeps_local_date() {
        assert_eq!(
            parse_calendar_date("2024-03-04T00:00:00Z").unwrap(),
            date(2024, 3, 4)
        );
        assert_eq!(
            parse_calendar_date(" 2024-03-04 00:00 ").unwrap(),
            date(2024, 3, 4)
        );
    }

    #[test]
    fn test_malformed_dates_rejected() {
        assert_matches!(parse_calendar_date("2024-3-4"), Err(TimeParseError::InvalidDate(_)));
        assert_matches!(parse_calendar_date("2024-02-30"), Err(TimeParseError::InvalidDate(_)));
        assert_matches!(parse_calendar_date("2024-03-04junk"), Err(TimeParseError::InvalidDate(_)));
        assert_matches!(parse_calendar_date(""), Err(TimeParseError::InvalidDate(_)));
    }

    #[test]
    fn test_clock_time_formats() {
        let t = NaiveTime::from_hms_opt(14, 30, 0).unwrap();
        assert_eq!(parse_clock_time("14:30").unwrap(), t);
        assert_eq!(parse_clock_time("14:30:00").unwrap(), t);
        assert_matches!(parse_clock_time("25:00"), Err(TimeParseError::InvalidTime(_)));
    }

    #[test]
    fn test_minutes_round_trip_and_midnight() {
        let t = NaiveTime::from_hms_opt(17, 30, 0).unwrap();
        assert_eq!(minute_of_day(t), 1050);
        assert_eq!(time_from_minute(1050), Some(t));
        assert_eq!(time_from_minute(MINUTES_PER_DAY), None);
    }

    #[test]
    fn test_adjacent_intervals_do_not_overlap() {
        assert!(!intervals_overlap(600, 630, 630, 660));
        assert!(intervals_overlap(600, 631, 630, 660));
    }

    #[test]
    fn test_booking_end_saturates_on_huge_duration() {
        assert_eq!(booking_end_minute(600, Some(10), 30), 630);
        assert_eq!(booking_end_minute(600, None, 30), 630);
        assert_eq!(booking_end_minute(600, Some(u32::MAX), 30), u32::MAX);
    }
}
