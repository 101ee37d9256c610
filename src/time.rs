//! CF time coordinates: units, calendars and date lookup along a time axis.
//!
//! Calendar handling is isolated in [`Calendar`]; decoding and lookup only go
//! through `days_from_date` / `date_from_days`, so adding a calendar never
//! touches the alignment logic.
use chrono::{Datelike, NaiveDate};
use std::fmt;
use thiserror::Error;

const MICROS_PER_SECOND: i64 = 1_000_000;
const MICROS_PER_MINUTE: i64 = 60 * MICROS_PER_SECOND;
const MICROS_PER_HOUR: i64 = 60 * MICROS_PER_MINUTE;
const MICROS_PER_DAY: i64 = 24 * MICROS_PER_HOUR;

const NOLEAP_MONTHS: [u32; 12] = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];
const ALL_LEAP_MONTHS: [u32; 12] = [31, 29, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];
const DAY360_MONTHS: [u32; 12] = [30; 12];

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TimeError {
    #[error("{dataset} has no `time` variable")]
    MissingTime { dataset: String },

    #[error("{dataset} `time` variable has no units attribute")]
    MissingUnits { dataset: String },

    #[error("invalid time units {units:?}: {reason}")]
    InvalidUnits { units: String, reason: String },

    #[error("unsupported calendar {0:?}")]
    UnsupportedCalendar(String),

    #[error("time value {0} cannot be converted to a date")]
    InvalidValue(f64),

    #[error("date {date} not found in remote time axis of {len} entries")]
    NotFound { date: CalendarDate, len: usize },

    #[error("date {date} matches several remote time indices {indices:?}")]
    Ambiguous {
        date: CalendarDate,
        indices: Vec<usize>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Calendar {
    /// Mixed Gregorian/Julian in CF; evaluated as proleptic Gregorian.
    Standard,
    ProlepticGregorian,
    NoLeap,
    AllLeap,
    Day360,
}

impl Calendar {
    /// Normalizes a CF `calendar` attribute.
    ///
    /// A missing attribute and the value `none` both select the standard
    /// calendar.
    pub fn from_attribute(raw: Option<&str>) -> Result<Self, TimeError> {
        let Some(raw) = raw else {
            return Ok(Calendar::Standard);
        };
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "none" | "standard" | "gregorian" => Ok(Calendar::Standard),
            "proleptic_gregorian" => Ok(Calendar::ProlepticGregorian),
            "noleap" | "365_day" => Ok(Calendar::NoLeap),
            "all_leap" | "366_day" => Ok(Calendar::AllLeap),
            "360_day" => Ok(Calendar::Day360),
            _ => Err(TimeError::UnsupportedCalendar(raw.to_string())),
        }
    }

    fn days_from_date(self, year: i64, month: u32, day: u32) -> Option<i64> {
        match self {
            Calendar::Standard | Calendar::ProlepticGregorian => {
                let year = i32::try_from(year).ok()?;
                NaiveDate::from_ymd_opt(year, month, day)
                    .map(|date| i64::from(date.num_days_from_ce()))
            }
            Calendar::NoLeap => fixed_days_from_date(&NOLEAP_MONTHS, year, month, day),
            Calendar::AllLeap => fixed_days_from_date(&ALL_LEAP_MONTHS, year, month, day),
            Calendar::Day360 => fixed_days_from_date(&DAY360_MONTHS, year, month, day),
        }
    }

    fn date_from_days(self, days: i64) -> Option<(i64, u32, u32)> {
        match self {
            Calendar::Standard | Calendar::ProlepticGregorian => {
                let days = i32::try_from(days).ok()?;
                NaiveDate::from_num_days_from_ce_opt(days)
                    .map(|date| (i64::from(date.year()), date.month(), date.day()))
            }
            Calendar::NoLeap => fixed_date_from_days(&NOLEAP_MONTHS, days),
            Calendar::AllLeap => fixed_date_from_days(&ALL_LEAP_MONTHS, days),
            Calendar::Day360 => fixed_date_from_days(&DAY360_MONTHS, days),
        }
    }
}

fn fixed_days_from_date(months: &[u32; 12], year: i64, month: u32, day: u32) -> Option<i64> {
    let month_idx = usize::try_from(month).ok()?.checked_sub(1)?;
    let month_len = *months.get(month_idx)?;
    if day == 0 || day > month_len {
        return None;
    }
    let year_len: i64 = months.iter().map(|&len| i64::from(len)).sum();
    let before: i64 = months[..month_idx].iter().map(|&len| i64::from(len)).sum();
    year.checked_mul(year_len)?
        .checked_add(before + i64::from(day) - 1)
}

fn fixed_date_from_days(months: &[u32; 12], days: i64) -> Option<(i64, u32, u32)> {
    let year_len: i64 = months.iter().map(|&len| i64::from(len)).sum();
    let year = days.div_euclid(year_len);
    let mut remaining = days.rem_euclid(year_len);
    for (month_idx, &len) in months.iter().enumerate() {
        let len = i64::from(len);
        if remaining < len {
            let month = u32::try_from(month_idx).ok()? + 1;
            let day = u32::try_from(remaining).ok()? + 1;
            return Some((year, month, day));
        }
        remaining -= len;
    }
    None
}

/// Broken-down date in whatever calendar produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct CalendarDate {
    pub year: i64,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
    pub microsecond: u32,
}

impl CalendarDate {
    fn from_day_micros(year: i64, month: u32, day: u32, micros_of_day: i64) -> Self {
        let part = |micros: i64, unit: i64, modulo: i64| {
            u32::try_from((micros / unit) % modulo).unwrap_or_default()
        };
        Self {
            year,
            month,
            day,
            hour: part(micros_of_day, MICROS_PER_HOUR, 24),
            minute: part(micros_of_day, MICROS_PER_MINUTE, 60),
            second: part(micros_of_day, MICROS_PER_SECOND, 60),
            microsecond: part(micros_of_day, 1, MICROS_PER_SECOND),
        }
    }

    fn micros_of_day(&self) -> i64 {
        i64::from(self.hour) * MICROS_PER_HOUR
            + i64::from(self.minute) * MICROS_PER_MINUTE
            + i64::from(self.second) * MICROS_PER_SECOND
            + i64::from(self.microsecond)
    }
}

impl fmt::Display for CalendarDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )?;
        if self.microsecond != 0 {
            write!(f, ".{:06}", self.microsecond)?;
        }
        Ok(())
    }
}

/// Parsed `<unit> since <reference date>` string.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeUnits {
    raw: String,
    step_micros: i64,
    reference: CalendarDate,
    /// Zone offset of the reference date east of UTC.
    utc_offset_micros: i64,
}

impl TimeUnits {
    pub fn parse(raw: &str) -> Result<Self, TimeError> {
        let invalid = |reason: String| TimeError::InvalidUnits {
            units: raw.to_string(),
            reason,
        };
        let lowered = raw.trim().to_ascii_lowercase();
        let (unit, reference) = lowered
            .split_once(" since ")
            .ok_or_else(|| invalid("expected `<unit> since <date>`".to_string()))?;
        let step_micros = match unit.trim() {
            "microseconds" | "microsecond" | "us" => 1,
            "milliseconds" | "millisecond" | "msec" | "ms" => 1_000,
            "seconds" | "second" | "secs" | "sec" | "s" => MICROS_PER_SECOND,
            "minutes" | "minute" | "mins" | "min" => MICROS_PER_MINUTE,
            "hours" | "hour" | "hrs" | "hr" | "h" => MICROS_PER_HOUR,
            "days" | "day" | "d" => MICROS_PER_DAY,
            other => return Err(invalid(format!("unsupported unit {other:?}"))),
        };
        let (reference, offset_minutes) = parse_reference(reference)
            .ok_or_else(|| invalid("unparseable reference date".to_string()))?;
        Ok(Self {
            raw: raw.to_string(),
            step_micros,
            reference,
            utc_offset_micros: offset_minutes * MICROS_PER_MINUTE,
        })
    }
}

// Accepts `Y-M-D`, optionally followed by `h[:m[:s[.frac]]]` separated by a
// space or `T`, then either a `Z` / `UTC` suffix or a `[+-]H[:MM]` /
// `[+-]HHMM` zone offset. Returns the date and the offset in minutes.
fn parse_reference(text: &str) -> Option<(CalendarDate, i64)> {
    let text = text.trim();
    let text = text.strip_suffix("utc").unwrap_or(text).trim_end();
    let text = text.strip_suffix('z').unwrap_or(text);
    let (date_part, time_part) = match text.split_once(['t', ' ']) {
        Some((date, time)) => (date, time.trim()),
        None => (text, ""),
    };
    let (clock, offset_minutes) = match time_part.find(['+', '-']) {
        Some(at) => (time_part[..at].trim(), parse_offset(&time_part[at..])?),
        None => (time_part, 0),
    };

    let mut date_fields = date_part.splitn(3, '-');
    let year: i64 = date_fields.next()?.trim().parse().ok()?;
    let month: u32 = date_fields.next()?.trim().parse().ok()?;
    let day: u32 = date_fields.next()?.trim().parse().ok()?;

    let (mut hour, mut minute, mut second, mut microsecond) = (0, 0, 0, 0);
    if !clock.is_empty() {
        let mut time_fields = clock.splitn(3, ':');
        hour = time_fields.next()?.trim().parse().ok()?;
        if let Some(field) = time_fields.next() {
            minute = field.trim().parse().ok()?;
        }
        if let Some(field) = time_fields.next() {
            let (whole, fraction) = field.trim().split_once('.').unwrap_or((field.trim(), ""));
            second = whole.parse().ok()?;
            microsecond = parse_fraction(fraction)?;
        }
    }
    if hour > 23 || minute > 59 || second > 59 {
        return None;
    }
    let date = CalendarDate {
        year,
        month,
        day,
        hour,
        minute,
        second,
        microsecond,
    };
    Some((date, offset_minutes))
}

// `+H`, `-HH`, `-H:MM`, `+HHMM`, `+HMM`; signed minutes east of UTC.
fn parse_offset(text: &str) -> Option<i64> {
    let (sign, body) = match text.as_bytes().first()? {
        b'+' => (1, &text[1..]),
        b'-' => (-1, &text[1..]),
        _ => return None,
    };
    let body = body.trim();
    let (hours, minutes) = match body.split_once(':') {
        Some((hours, minutes)) => (hours, minutes),
        None if body.len() > 2 => body.split_at(body.len() - 2),
        None => (body, "0"),
    };
    if hours.is_empty() || !hours.bytes().chain(minutes.bytes()).all(|b| b.is_ascii_digit()) {
        return None;
    }
    let hours: i64 = hours.parse().ok()?;
    let minutes: i64 = minutes.parse().ok()?;
    if hours > 23 || minutes > 59 {
        return None;
    }
    Some(sign * (hours * 60 + minutes))
}

fn parse_fraction(fraction: &str) -> Option<u32> {
    if fraction.is_empty() {
        return Some(0);
    }
    if !fraction.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let digits: String = fraction.chars().chain(std::iter::repeat('0')).take(6).collect();
    digits.parse().ok()
}

/// Units and calendar of a `time` coordinate.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeCoordinate {
    units: TimeUnits,
    calendar: Calendar,
}

impl TimeCoordinate {
    pub fn parse(units: &str, calendar: Option<&str>) -> Result<Self, TimeError> {
        Ok(Self {
            units: TimeUnits::parse(units)?,
            calendar: Calendar::from_attribute(calendar)?,
        })
    }

    pub fn calendar(&self) -> Calendar {
        self.calendar
    }

    /// Converts a raw coordinate value into a calendar date.
    pub fn decode(&self, value: f64) -> Result<CalendarDate, TimeError> {
        if !value.is_finite() {
            return Err(TimeError::InvalidValue(value));
        }
        let offset = value * self.units.step_micros as f64;
        // Keep the sum below within i64 for any valid reference date.
        if offset.abs() >= (i64::MAX / 4) as f64 {
            return Err(TimeError::InvalidValue(value));
        }
        let reference = &self.units.reference;
        let reference_days = self
            .calendar
            .days_from_date(reference.year, reference.month, reference.day)
            .ok_or_else(|| TimeError::InvalidUnits {
                units: self.units.raw.clone(),
                reason: format!("reference date is not valid in the {:?} calendar", self.calendar),
            })?;
        let total = reference_days
            .checked_mul(MICROS_PER_DAY)
            .and_then(|micros| micros.checked_add(reference.micros_of_day()))
            .and_then(|micros| micros.checked_sub(self.units.utc_offset_micros))
            .and_then(|micros| micros.checked_add(offset.round() as i64))
            .ok_or(TimeError::InvalidValue(value))?;
        let (year, month, day) = self
            .calendar
            .date_from_days(total.div_euclid(MICROS_PER_DAY))
            .ok_or(TimeError::InvalidValue(value))?;
        Ok(CalendarDate::from_day_micros(
            year,
            month,
            day,
            total.rem_euclid(MICROS_PER_DAY),
        ))
    }

    /// Finds the single index of `date` in `axis`.
    ///
    /// Axis entries that do not decode (fill values) never match.
    pub fn locate(&self, date: &CalendarDate, axis: &[f64]) -> Result<usize, TimeError> {
        let indices: Vec<usize> = axis
            .iter()
            .enumerate()
            .filter(|&(_, &value)| self.decode(value).is_ok_and(|decoded| decoded == *date))
            .map(|(idx, _)| idx)
            .collect();
        match indices.as_slice() {
            [idx] => Ok(*idx),
            [] => Err(TimeError::NotFound {
                date: *date,
                len: axis.len(),
            }),
            _ => Err(TimeError::Ambiguous {
                date: *date,
                indices,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn days_since_epoch() -> TimeCoordinate {
        TimeCoordinate::parse("days since 1970-01-01 00:00:00", Some("standard")).expect("units")
    }

    #[test]
    fn resolves_day_index_on_standard_calendar() {
        let coord = days_since_epoch();
        let date = coord.decode(2.0).expect("decode");
        assert_eq!(date.to_string(), "1970-01-03 00:00:00");
        assert_eq!(coord.locate(&date, &[0.0, 1.0, 2.0, 3.0]), Ok(2));
    }

    #[test]
    fn missing_date_is_not_found() {
        let coord = days_since_epoch();
        let date = coord.decode(7.0).expect("decode");
        assert_eq!(
            coord.locate(&date, &[0.0, 1.0, 2.0, 3.0]),
            Err(TimeError::NotFound { date, len: 4 })
        );
    }

    #[test]
    fn duplicate_entries_are_ambiguous() {
        let coord = days_since_epoch();
        let date = coord.decode(1.0).expect("decode");
        assert_eq!(
            coord.locate(&date, &[1.0, 1.0]),
            Err(TimeError::Ambiguous {
                date,
                indices: vec![0, 1]
            })
        );
    }

    #[test]
    fn fill_values_in_axis_do_not_match() {
        let coord = days_since_epoch();
        let date = coord.decode(1.0).expect("decode");
        assert_eq!(coord.locate(&date, &[1.0e36, 1.0]), Ok(1));
    }

    #[test]
    fn none_calendar_normalizes_to_standard() {
        assert_eq!(Calendar::from_attribute(Some("none")), Ok(Calendar::Standard));
        assert_eq!(Calendar::from_attribute(None), Ok(Calendar::Standard));
        assert_eq!(Calendar::from_attribute(Some("Gregorian")), Ok(Calendar::Standard));
        assert_eq!(Calendar::from_attribute(Some("365_day")), Ok(Calendar::NoLeap));
        assert_eq!(
            Calendar::from_attribute(Some("julian")),
            Err(TimeError::UnsupportedCalendar("julian".to_string()))
        );
    }

    #[test]
    fn decodes_seconds_with_utc_suffix() {
        let coord =
            TimeCoordinate::parse("seconds since 1970-01-01T00:00:00Z", None).expect("units");
        let date = coord.decode(1_491_724_800.0).expect("decode");
        assert_eq!(date.to_string(), "2017-04-09 08:00:00");
    }

    #[test]
    fn decodes_hours_with_reference_time_of_day() {
        let coord =
            TimeCoordinate::parse("hours since 2008-12-20 06:30 UTC", Some("gregorian"))
                .expect("units");
        let date = coord.decode(-7.5).expect("decode");
        assert_eq!(date.to_string(), "2008-12-19 23:00:00");
    }

    #[test]
    fn noleap_calendar_skips_february_29() {
        let coord = TimeCoordinate::parse("days since 2000-02-28", Some("noleap")).expect("units");
        assert_eq!(coord.decode(1.0).expect("decode").to_string(), "2000-03-01 00:00:00");

        let standard = TimeCoordinate::parse("days since 2000-02-28", None).expect("units");
        assert_eq!(standard.decode(1.0).expect("decode").to_string(), "2000-02-29 00:00:00");
    }

    #[test]
    fn day360_calendar_has_thirty_day_months() {
        let coord = TimeCoordinate::parse("days since 2001-02-29", Some("360_day")).expect("units");
        assert_eq!(coord.calendar(), Calendar::Day360);
        assert_eq!(coord.decode(2.0).expect("decode").to_string(), "2001-03-01 00:00:00");
    }

    #[test]
    fn invalid_reference_for_calendar_is_reported() {
        let coord = TimeCoordinate::parse("days since 2001-02-30", None).expect("units");
        assert!(matches!(coord.decode(0.0), Err(TimeError::InvalidUnits { .. })));
    }

    #[test]
    fn rejects_malformed_units() {
        assert!(matches!(
            TimeUnits::parse("days after 1970-01-01"),
            Err(TimeError::InvalidUnits { .. })
        ));
        assert!(matches!(
            TimeUnits::parse("fortnights since 1970-01-01"),
            Err(TimeError::InvalidUnits { .. })
        ));
        assert!(matches!(
            TimeUnits::parse("days since yesterday"),
            Err(TimeError::InvalidUnits { .. })
        ));
    }

    #[test]
    fn non_finite_values_are_rejected() {
        let coord = days_since_epoch();
        assert!(matches!(coord.decode(f64::NAN), Err(TimeError::InvalidValue(_))));
    }

    #[test]
    fn keeps_sub_second_precision() {
        let coord = TimeCoordinate::parse("seconds since 1970-01-01 00:00:00.5", None)
            .expect("units");
        assert_eq!(
            coord.decode(0.25).expect("decode").to_string(),
            "1970-01-01 00:00:00.750000"
        );
    }

    #[test]
    fn reference_zone_offset_shifts_to_utc() {
        let coord = TimeCoordinate::parse("seconds since 1992-10-8 15:15:42.5 -6:00", None)
            .expect("units");
        assert_eq!(
            coord.decode(0.0).expect("decode").to_string(),
            "1992-10-08 21:15:42.500000"
        );

        let coord =
            TimeCoordinate::parse("minutes since 2000-01-01T00:00:00+05:30", None).expect("units");
        assert_eq!(coord.decode(0.0).expect("decode").to_string(), "1999-12-31 18:30:00");
    }

    #[test]
    fn zero_offsets_match_plain_reference() {
        let plain = days_since_epoch();
        let colon = TimeCoordinate::parse("days since 1970-01-01 00:00:00 +00:00", None)
            .expect("units");
        assert_eq!(colon.decode(2.0), plain.decode(2.0));

        let compact = TimeCoordinate::parse("hours since 1970-01-01 00:00:00.0 +0000", None)
            .expect("units");
        assert_eq!(compact.decode(48.0), plain.decode(2.0));
    }

    #[test]
    fn malformed_zone_offset_is_rejected() {
        assert!(matches!(
            TimeUnits::parse("days since 1970-01-01 00:00:00 +25:00"),
            Err(TimeError::InvalidUnits { .. })
        ));
        assert!(matches!(
            TimeUnits::parse("days since 1970-01-01 00:00:00 +ab"),
            Err(TimeError::InvalidUnits { .. })
        ));
    }
}
