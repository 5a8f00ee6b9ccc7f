use chrono::{Duration, NaiveDate};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::slots::Interval;
use crate::time::{combine_in_zone, resolve_clock_time, ClockTime, TimeError};

/// Bookable service configuration: which external calendar backs it, business hours,
/// appointment length and the zone those hours are expressed in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CalendarServiceDescriptor {
    pub service_name: String,
    pub external_calendar_id: String,
    pub open_hours: ClockTime,
    pub close_hours: ClockTime,
    pub duration_minutes: u32,
    pub time_zone: Tz,
}

impl CalendarServiceDescriptor {
    pub fn duration(&self) -> Duration {
        Duration::minutes(i64::from(self.duration_minutes))
    }

    /// Business-hours window on `date`. A close time at or before the open time
    /// belongs to the following day.
    pub fn window_for(&self, date: NaiveDate) -> Result<Interval, TimeError> {
        let open = combine_in_zone(date, self.open_hours, self.time_zone)?;
        let close_date =
            if self.close_hours <= self.open_hours { date + Duration::days(1) } else { date };
        let close = combine_in_zone(close_date, self.close_hours, self.time_zone)?;
        Ok(Interval { start: open, end: close })
    }
}

/// Settings blob stored alongside each calendar service.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSettings {
    pub open_hours: Option<String>,
    pub close_hours: Option<String>,
    pub duration: Option<u32>,
    pub time_zone: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SettingsError {
    #[error("missing required setting `{0}`")]
    Missing(&'static str),
    #[error("invalid business hours format: {0}")]
    BusinessHours(#[from] TimeError),
    #[error("unknown time zone `{0}`")]
    TimeZone(String),
    #[error("duration must be greater than zero")]
    ZeroDuration,
}

impl ServiceSettings {
    pub fn into_descriptor(
        self,
        service_name: impl Into<String>,
        external_calendar_id: impl Into<String>,
        default_zone: Tz,
    ) -> Result<CalendarServiceDescriptor, SettingsError> {
        let open_hours = parse_business_hours(
            self.open_hours.as_deref().ok_or(SettingsError::Missing("openHours"))?,
        )?;
        let close_hours = parse_business_hours(
            self.close_hours.as_deref().ok_or(SettingsError::Missing("closeHours"))?,
        )?;
        let duration_minutes = match self.duration {
            Some(0) => return Err(SettingsError::ZeroDuration),
            Some(minutes) => minutes,
            None => return Err(SettingsError::Missing("duration")),
        };
        let time_zone = match self.time_zone.as_deref() {
            Some(name) => name.parse::<Tz>().map_err(|_| SettingsError::TimeZone(name.to_string()))?,
            None => default_zone,
        };

        Ok(CalendarServiceDescriptor {
            service_name: service_name.into(),
            external_calendar_id: external_calendar_id.into(),
            open_hours,
            close_hours,
            duration_minutes,
            time_zone,
        })
    }
}

/// Accepts `09:00` as well as the `T09:00` form used in stored settings.
pub fn parse_business_hours(raw: &str) -> Result<ClockTime, TimeError> {
    let trimmed = raw.trim();
    resolve_clock_time(trimmed.strip_prefix('T').unwrap_or(trimmed))
}
