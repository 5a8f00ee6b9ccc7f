use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::domain::calendar::CalendarServiceDescriptor;
use crate::slots::Interval;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("calendar request failed: {0}")]
    Transport(String),
    #[error("API request failed: {status} - {body}")]
    Status { status: u16, body: String },
    #[error("could not decode calendar response: {0}")]
    Decode(String),
    #[error("calendar request timed out")]
    Timeout,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("service directory lookup failed: {0}")]
    Lookup(String),
    #[error("calendar service `{service}` has invalid settings: {reason}")]
    InvalidSettings { service: String, reason: String },
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarBusy {
    #[serde(default)]
    pub busy: Vec<Interval>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreeBusyResponse {
    #[serde(default)]
    pub calendars: BTreeMap<String, CalendarBusy>,
}

impl FreeBusyResponse {
    /// Busy blocks for `calendar_id`, or for the first calendar returned when the
    /// upstream keyed its answer differently. `None` when no calendar came back.
    pub fn busy_for(&self, calendar_id: &str) -> Option<&[Interval]> {
        self.calendars
            .get(calendar_id)
            .or_else(|| self.calendars.values().next())
            .map(|calendar| calendar.busy.as_slice())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attendee {
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// User-supplied overrides for the event written to the calendar.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDetails {
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub time_zone: Option<String>,
    #[serde(default)]
    pub attendees: Option<Vec<Attendee>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDraft {
    pub summary: String,
    pub description: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub time_zone: String,
    pub attendees: Vec<Attendee>,
}

impl EventDraft {
    pub fn for_service(
        descriptor: &CalendarServiceDescriptor,
        slot: Interval,
        details: Option<&EventDetails>,
    ) -> Self {
        let details = details.cloned().unwrap_or_default();
        Self {
            summary: details
                .summary
                .unwrap_or_else(|| format!("{} Appointment", descriptor.service_name)),
            description: details
                .description
                .unwrap_or_else(|| format!("Appointment for {}", descriptor.service_name)),
            start: slot.start,
            end: slot.end,
            time_zone: details.time_zone.unwrap_or_else(|| descriptor.time_zone.name().to_string()),
            attendees: details.attendees.unwrap_or_default(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attendees: Option<Vec<Attendee>>,
}

impl EventPatch {
    pub fn is_empty(&self) -> bool {
        self.updated_fields().is_empty()
    }

    /// Human-readable names of the fields this patch touches.
    pub fn updated_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.start.is_some() {
            fields.push("start time");
        }
        if self.end.is_some() {
            fields.push("end time");
        }
        if self.summary.is_some() {
            fields.push("title");
        }
        if self.description.is_some() {
            fields.push("description");
        }
        if self.time_zone.is_some() {
            fields.push("timezone");
        }
        if self.attendees.is_some() {
            fields.push("attendees");
        }
        fields
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventTime {
    #[serde(default)]
    pub date_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub time_zone: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventAttendee {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub response_status: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEvent {
    pub id: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub start: EventTime,
    #[serde(default)]
    pub end: EventTime,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub attendees: Vec<EventAttendee>,
}

impl CalendarEvent {
    pub fn is_cancelled(&self) -> bool {
        self.status.as_deref() == Some("cancelled")
    }
}

/// External calendar capability. Every call is an independent request/response.
#[async_trait]
pub trait CalendarGateway: Send + Sync {
    async fn free_busy(&self, calendar_id: &str, window: Interval) -> Result<FreeBusyResponse, GatewayError>;

    async fn create_event(&self, calendar_id: &str, event: &EventDraft) -> Result<Value, GatewayError>;

    async fn update_event(
        &self,
        calendar_id: &str,
        event_id: &str,
        patch: &EventPatch,
    ) -> Result<Value, GatewayError>;

    async fn delete_event(&self, calendar_id: &str, event_id: &str) -> Result<(), GatewayError>;

    async fn list_events(
        &self,
        calendar_id: &str,
        window: Interval,
        max_results: u32,
    ) -> Result<Vec<CalendarEvent>, GatewayError>;
}

/// Resolves service names to their calendar configuration for a business.
#[async_trait]
pub trait ServiceDirectory: Send + Sync {
    async fn find_by_name(
        &self,
        business_id: &str,
        service_name: &str,
    ) -> Result<Option<CalendarServiceDescriptor>, DirectoryError>;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Clone, Copy, Debug)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    use super::{EventPatch, FreeBusyResponse};

    #[test]
    fn free_busy_decodes_offsets_and_falls_back_to_first_calendar() {
        let response: FreeBusyResponse = serde_json::from_value(json!({
            "calendars": {
                "clinic@group.calendar.google.com": {
                    "busy": [{"start": "2026-10-20T10:00:00-06:00", "end": "2026-10-20T10:30:00-06:00"}]
                }
            }
        }))
        .unwrap();

        let busy = response.busy_for("another-id").unwrap();
        assert_eq!(busy.len(), 1);
        assert_eq!(busy[0].start, Utc.with_ymd_and_hms(2026, 10, 20, 16, 0, 0).unwrap());

        assert!(FreeBusyResponse::default().busy_for("x").is_none());
    }

    #[test]
    fn patch_serializes_only_touched_fields() {
        let patch = EventPatch { summary: Some("Cleaning".into()), ..EventPatch::default() };

        assert_eq!(serde_json::to_value(&patch).unwrap(), json!({"summary": "Cleaning"}));
        assert_eq!(patch.updated_fields(), vec!["title"]);
        assert!(EventPatch::default().is_empty());
    }
}
