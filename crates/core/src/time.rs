//! Day and clock-time expressions as users type them ("next friday", "5:30pm")
//! resolved into concrete dates and instants in a business time zone.

use std::fmt;

use chrono::{DateTime, Datelike, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::slots::Interval;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TimeError {
    #[error("unable to parse time `{0}`")]
    InvalidTimeFormat(String),
    #[error("local time {0} does not exist in time zone {1}")]
    NonexistentLocalTime(NaiveDateTime, String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DayProvenance {
    Today,
    Tomorrow,
    NextWeekday,
    Literal,
    /// The input was not understood and today's date was substituted.
    Fallback,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResolvedDay {
    pub date: NaiveDate,
    pub provenance: DayProvenance,
}

impl ResolvedDay {
    pub fn is_fallback(&self) -> bool {
        self.provenance == DayProvenance::Fallback
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct ClockTime {
    pub hour: u32,
    pub minute: u32,
}

impl ClockTime {
    pub fn new(hour: u32, minute: u32) -> Option<Self> {
        (hour < 24 && minute < 60).then_some(Self { hour, minute })
    }

    pub fn as_naive_time(&self) -> NaiveTime {
        NaiveTime::from_hms_opt(self.hour, self.minute, 0).unwrap_or_default()
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// Resolves `today`, `tomorrow`, `next <weekday>` and `YYYY-MM-DD` relative to `today`.
///
/// Anything else resolves to `today` with [`DayProvenance::Fallback`]; this never fails.
pub fn resolve_day(input: &str, today: NaiveDate) -> ResolvedDay {
    let normalized = input.trim().to_ascii_lowercase();

    match normalized.as_str() {
        "today" => return ResolvedDay { date: today, provenance: DayProvenance::Today },
        "tomorrow" => {
            return ResolvedDay { date: today + Duration::days(1), provenance: DayProvenance::Tomorrow }
        }
        _ => {}
    }

    let mut words = normalized.split_whitespace();
    if let (Some("next"), Some(day), None) = (words.next(), words.next(), words.next()) {
        if let Some(weekday) = parse_weekday(day) {
            return ResolvedDay {
                date: today + Duration::days(days_until(today.weekday(), weekday)),
                provenance: DayProvenance::NextWeekday,
            };
        }
    }

    if let Some(date) = parse_literal_date(&normalized) {
        return ResolvedDay { date, provenance: DayProvenance::Literal };
    }

    warn!(event_name = "time.day_fallback", input = %input, %today, "could not parse day, defaulting to today");
    ResolvedDay { date: today, provenance: DayProvenance::Fallback }
}

/// Parses `H`, `H:MM` or `H:MM:SS` with an optional `am`/`pm` suffix. Seconds are dropped.
pub fn resolve_clock_time(input: &str) -> Result<ClockTime, TimeError> {
    let invalid = || TimeError::InvalidTimeFormat(input.to_string());
    let normalized = input.trim().to_ascii_lowercase();

    let (digits, meridiem) = match normalized.strip_suffix("am") {
        Some(rest) => (rest.trim_end(), Some(Meridiem::Am)),
        None => match normalized.strip_suffix("pm") {
            Some(rest) => (rest.trim_end(), Some(Meridiem::Pm)),
            None => (normalized.as_str(), None),
        },
    };

    let mut parts = digits.split(':');
    let hour = parts.next().filter(|part| is_digits(part, 1..=2)).ok_or_else(invalid)?;
    let minute = match parts.next() {
        Some(part) if is_digits(part, 2..=2) => part,
        Some(_) => return Err(invalid()),
        None => "0",
    };
    if let Some(seconds) = parts.next() {
        if !is_digits(seconds, 2..=2) || seconds.parse::<u32>().map_or(true, |value| value > 59) {
            return Err(invalid());
        }
    }
    if parts.next().is_some() {
        return Err(invalid());
    }

    let hour: u32 = hour.parse().map_err(|_| invalid())?;
    let minute: u32 = minute.parse().map_err(|_| invalid())?;

    let hour = match meridiem {
        Some(_) if !(1..=12).contains(&hour) => return Err(invalid()),
        Some(Meridiem::Am) if hour == 12 => 0,
        Some(Meridiem::Pm) if hour != 12 => hour + 12,
        _ => hour,
    };

    ClockTime::new(hour, minute).ok_or_else(invalid)
}

/// Naive composition; the caller decides which zone the result lives in.
pub fn combine(date: NaiveDate, time: ClockTime) -> NaiveDateTime {
    date.and_time(time.as_naive_time())
}

/// Composes a wall-clock time in `zone` into an absolute instant.
///
/// Ambiguous local times (DST fall-back) resolve to the earlier instant.
pub fn combine_in_zone(date: NaiveDate, time: ClockTime, zone: Tz) -> Result<DateTime<Utc>, TimeError> {
    localize(combine(date, time), zone)
}

fn localize(local: NaiveDateTime, zone: Tz) -> Result<DateTime<Utc>, TimeError> {
    match zone.from_local_datetime(&local) {
        LocalResult::Single(instant) => Ok(instant.with_timezone(&Utc)),
        LocalResult::Ambiguous(earliest, _) => Ok(earliest.with_timezone(&Utc)),
        LocalResult::None => Err(TimeError::NonexistentLocalTime(local, zone.name().to_string())),
    }
}

const NAIVE_INSTANT_FORMATS: [&str; 4] =
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"];

/// Parses an ISO 8601 date-time. Values carrying an offset are taken as-is; offset-less
/// values are wall-clock times in `zone`.
pub fn parse_instant(raw: &str, zone: Tz) -> Result<DateTime<Utc>, TimeError> {
    let raw = raw.trim();
    if let Ok(instant) = DateTime::parse_from_rfc3339(raw) {
        return Ok(instant.with_timezone(&Utc));
    }

    let local = NAIVE_INSTANT_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .ok_or_else(|| TimeError::InvalidTimeFormat(raw.to_string()))?;
    localize(local, zone)
}

/// `Friday, October 16, 2026 at 5:00 PM`
pub fn format_instant(instant: DateTime<Utc>, zone: Tz) -> String {
    instant.with_timezone(&zone).format("%A, %B %-d, %Y at %-I:%M %p").to_string()
}

/// `Friday, October 16, 2026`
pub fn format_date(date: NaiveDate) -> String {
    date.format("%A, %B %-d, %Y").to_string()
}

/// Window used when listing calendar events.
///
/// * no input: now until 14 days out
/// * `this week`: now until the coming Sunday ends
/// * `next week`: Monday to Monday of the following ISO week
/// * a bare weekday: that whole day, 1..=7 days ahead
/// * anything [`resolve_day`] understands: that whole day
pub fn resolve_time_frame(input: Option<&str>, now: DateTime<Utc>, zone: Tz) -> Result<Interval, TimeError> {
    let Some(raw) = input.map(str::trim).filter(|value| !value.is_empty()) else {
        return Ok(Interval { start: now, end: now + Duration::days(14) });
    };
    let today = now.with_timezone(&zone).date_naive();
    let normalized = raw.to_ascii_lowercase();

    match normalized.as_str() {
        "this week" => {
            let days_to_monday = 7 - i64::from(today.weekday().num_days_from_monday());
            let end = start_of_day(today + Duration::days(days_to_monday), zone)?;
            Ok(Interval { start: now, end })
        }
        "next week" => {
            let monday = today + Duration::days(7 - i64::from(today.weekday().num_days_from_monday()));
            full_days(monday, 7, zone)
        }
        other => match parse_weekday(other) {
            Some(weekday) => {
                full_days(today + Duration::days(days_until(today.weekday(), weekday)), 1, zone)
            }
            None => full_days(resolve_day(raw, today).date, 1, zone),
        },
    }
}

fn full_days(first: NaiveDate, days: i64, zone: Tz) -> Result<Interval, TimeError> {
    Ok(Interval {
        start: start_of_day(first, zone)?,
        end: start_of_day(first + Duration::days(days), zone)?,
    })
}

fn start_of_day(date: NaiveDate, zone: Tz) -> Result<DateTime<Utc>, TimeError> {
    combine_in_zone(date, ClockTime { hour: 0, minute: 0 }, zone)
}

enum Meridiem {
    Am,
    Pm,
}

fn is_digits(value: &str, len: std::ops::RangeInclusive<usize>) -> bool {
    len.contains(&value.len()) && value.bytes().all(|byte| byte.is_ascii_digit())
}

fn parse_literal_date(value: &str) -> Option<NaiveDate> {
    let shaped = value.len() == 10
        && value.bytes().enumerate().all(|(index, byte)| match index {
            4 | 7 => byte == b'-',
            _ => byte.is_ascii_digit(),
        });
    if !shaped {
        return None;
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()
}

fn parse_weekday(value: &str) -> Option<Weekday> {
    match value {
        "monday" => Some(Weekday::Mon),
        "tuesday" => Some(Weekday::Tue),
        "wednesday" => Some(Weekday::Wed),
        "thursday" => Some(Weekday::Thu),
        "friday" => Some(Weekday::Fri),
        "saturday" => Some(Weekday::Sat),
        "sunday" => Some(Weekday::Sun),
        _ => None,
    }
}

/// Days from `from` to the next `target`, in 1..=7.
fn days_until(from: Weekday, target: Weekday) -> i64 {
    let diff = (i64::from(target.num_days_from_sunday()) - i64::from(from.num_days_from_sunday()) + 7) % 7;
    if diff == 0 {
        7
    } else {
        diff
    }
}
