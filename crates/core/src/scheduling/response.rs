//! Typed results handed back to the language model by the scheduling tools.
//!
//! Every workflow outcome, including failures, is rendered into a [`ToolResponse`]
//! so that nothing raised by the calendar ever crosses the tool boundary.

use serde::Serialize;
use serde_json::Value;

use super::workflows::{
    AvailabilityOutcome, AvailabilityReport, DayAvailability, EventListing, SlotCheck,
    UnavailableReason, UpdatedAppointment,
};
use super::SchedulingError;
use crate::slots::Interval;
use crate::time::{format_date, format_instant};
use chrono_tz::Tz;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Success,
    Failure,
    NoData,
    PartialSuccess,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    BookingFailed,
    AvailabilityCheckFailed,
    InvalidTimeFormat,
    InvalidTime,
    NoUpdatesProvided,
    UpdateFailed,
    DeleteEventFailed,
    CalendarEventsError,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ResponseError {
    pub code: ErrorCode,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ToolResponse<T> {
    pub status: ResponseStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ResponseError>,
}

impl<T> ToolResponse<T> {
    fn new(status: ResponseStatus, message: impl Into<String>, data: Option<T>) -> Self {
        Self { status, message: message.into(), data, error: None }
    }

    fn with_error(mut self, code: ErrorCode, message: impl Into<String>) -> Self {
        self.error = Some(ResponseError { code, message: message.into() });
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AvailabilityStatus {
    Available,
    AvailableSuggestions,
    UnavailableSuggestions,
    Unavailable,
    Booked,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FormattedSlot {
    pub start: String,
    pub end: String,
}

impl FormattedSlot {
    fn new(slot: &Interval, zone: Tz) -> Self {
        Self { start: format_instant(slot.start, zone), end: format_instant(slot.end, zone) }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AvailabilityData {
    pub status: AvailabilityStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<FormattedSlot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

impl AvailabilityData {
    fn status(status: AvailabilityStatus) -> Self {
        Self { status, time: None, message: None, suggestions: Vec::new(), event: None, date: None }
    }

    fn unavailable(message: &str) -> Self {
        Self { message: Some(message.to_string()), ..Self::status(AvailabilityStatus::Unavailable) }
    }
}

pub const PAST_TIME_MESSAGE: &str = "The requested time has already passed. Please choose a future time.";
pub const NO_SLOTS_TODAY_MESSAGE: &str = "Sorry, there are no more available appointments today.";
pub const NO_SLOTS_ON_DAY_MESSAGE: &str = "Sorry, there are no available appointments on that day.";
pub const SUGGESTIONS_MESSAGE: &str = "That time is booked, but we have other openings on that day.";
pub const NO_UPDATES_MESSAGE: &str =
    "No updates provided. Please specify what you want to update (time, title, description, attendees, etc.).";
pub const PAST_UPDATE_MESSAGE: &str =
    "Cannot update appointment to a time in the past. Please choose a future date and time.";

pub fn availability_response(
    result: Result<AvailabilityReport, SchedulingError>,
) -> ToolResponse<AvailabilityData> {
    let report = match result {
        Ok(report) => report,
        Err(SchedulingError::Time(error)) => {
            let message = error.to_string();
            return ToolResponse::new(
                ResponseStatus::Failure,
                message.clone(),
                Some(AvailabilityData::unavailable(&message)),
            )
            .with_error(ErrorCode::InvalidTimeFormat, message);
        }
        Err(error) => {
            let message = error.to_string();
            return ToolResponse::new(
                ResponseStatus::Failure,
                message.clone(),
                Some(AvailabilityData::unavailable(&message)),
            )
            .with_error(ErrorCode::AvailabilityCheckFailed, message);
        }
    };

    let zone = report.time_zone;
    let date = Some(report.day.date.to_string());
    match report.outcome {
        AvailabilityOutcome::Booked { slot, event } => {
            let time = format_instant(slot.start, zone);
            let message = format!("Appointment successfully booked for {time}");
            ToolResponse::new(
                ResponseStatus::Success,
                message.clone(),
                Some(AvailabilityData {
                    time: Some(time),
                    message: Some(message),
                    event: Some(event),
                    date,
                    ..AvailabilityData::status(AvailabilityStatus::Booked)
                }),
            )
        }
        AvailabilityOutcome::Available { slot } => ToolResponse::new(
            ResponseStatus::Success,
            "Time slot is available.",
            Some(AvailabilityData {
                time: Some(format_instant(slot.start, zone)),
                date,
                ..AvailabilityData::status(AvailabilityStatus::Available)
            }),
        ),
        AvailabilityOutcome::Unavailable(UnavailableReason::PastTime) => ToolResponse::new(
            ResponseStatus::Failure,
            PAST_TIME_MESSAGE,
            Some(AvailabilityData { date, ..AvailabilityData::unavailable(PAST_TIME_MESSAGE) }),
        ),
        AvailabilityOutcome::Unavailable(UnavailableReason::BookingFailed(reason)) => {
            let message = format!("Time slot is available but booking failed: {reason}");
            ToolResponse::new(
                ResponseStatus::Failure,
                message.clone(),
                Some(AvailabilityData { date, ..AvailabilityData::unavailable(&message) }),
            )
            .with_error(ErrorCode::BookingFailed, reason)
        }
        AvailabilityOutcome::Unavailable(reason) => {
            let message = match reason {
                UnavailableReason::NoSlotsToday => NO_SLOTS_TODAY_MESSAGE,
                _ => NO_SLOTS_ON_DAY_MESSAGE,
            };
            ToolResponse::new(
                ResponseStatus::NoData,
                message,
                Some(AvailabilityData { date, ..AvailabilityData::unavailable(message) }),
            )
        }
        AvailabilityOutcome::UnavailableSuggestions { requested, slots } => ToolResponse::new(
            ResponseStatus::PartialSuccess,
            SUGGESTIONS_MESSAGE,
            Some(AvailabilityData {
                time: Some(format_instant(requested, zone)),
                message: Some(SUGGESTIONS_MESSAGE.to_string()),
                suggestions: slots.iter().map(|slot| FormattedSlot::new(slot, zone)).collect(),
                date,
                ..AvailabilityData::status(AvailabilityStatus::UnavailableSuggestions)
            }),
        ),
        AvailabilityOutcome::AvailableSuggestions { slots } => ToolResponse::new(
            ResponseStatus::Success,
            "Available slots found.",
            Some(AvailabilityData {
                suggestions: slots.iter().map(|slot| FormattedSlot::new(slot, zone)).collect(),
                date,
                ..AvailabilityData::status(AvailabilityStatus::AvailableSuggestions)
            }),
        ),
    }
}

/// Unreadable user time input is reported as such; everything else failed the check.
fn check_failure_code(error: &SchedulingError) -> ErrorCode {
    match error {
        SchedulingError::Time(_) => ErrorCode::InvalidTimeFormat,
        _ => ErrorCode::AvailabilityCheckFailed,
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotCheckData {
    pub is_available: bool,
    pub start: String,
    pub end: String,
}

pub fn slot_check_response(result: Result<SlotCheck, SchedulingError>) -> ToolResponse<SlotCheckData> {
    match result {
        Ok(check) => {
            let data = SlotCheckData {
                is_available: check.available,
                start: format_instant(check.slot.start, check.time_zone),
                end: format_instant(check.slot.end, check.time_zone),
            };
            let message =
                if check.available { "Time slot is available." } else { "Time slot is not available." };
            ToolResponse::new(ResponseStatus::Success, message, Some(data))
        }
        Err(error) => {
            let message = error.to_string();
            ToolResponse::new(ResponseStatus::Failure, message.clone(), None)
                .with_error(check_failure_code(&error), message)
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DaySlotsData {
    pub date: String,
    pub slots: Vec<FormattedSlot>,
}

pub fn day_slots_response(result: Result<DayAvailability, SchedulingError>) -> ToolResponse<DaySlotsData> {
    match result {
        Ok(day) => {
            let data = DaySlotsData {
                date: day.date.to_string(),
                slots: day.slots.iter().map(|slot| FormattedSlot::new(slot, day.time_zone)).collect(),
            };
            if data.slots.is_empty() {
                ToolResponse::new(ResponseStatus::NoData, "No available slots found.", Some(data))
            } else {
                let message = format!(
                    "Found {} available slot{} on {}.",
                    data.slots.len(),
                    if data.slots.len() == 1 { "" } else { "s" },
                    format_date(day.date)
                );
                ToolResponse::new(ResponseStatus::Success, message, Some(data))
            }
        }
        Err(error) => {
            let message = error.to_string();
            ToolResponse::new(ResponseStatus::Failure, message.clone(), None)
                .with_error(check_failure_code(&error), message)
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateData {
    pub event_id: String,
    pub event: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    pub updated_fields: Vec<String>,
}

pub fn update_response(result: Result<UpdatedAppointment, SchedulingError>) -> ToolResponse<UpdateData> {
    match result {
        Ok(updated) => {
            let zone = updated.time_zone;
            let message =
                format!("Appointment successfully updated. Updated: {}.", updated.updated_fields.join(", "));
            ToolResponse::new(
                ResponseStatus::Success,
                message,
                Some(UpdateData {
                    event_id: updated.event_id,
                    event: updated.event,
                    start_time: updated.slot.map(|slot| format_instant(slot.start, zone)),
                    end_time: updated.slot.map(|slot| format_instant(slot.end, zone)),
                    updated_fields: updated.updated_fields,
                }),
            )
        }
        Err(SchedulingError::PastTime) => ToolResponse::new(ResponseStatus::Failure, PAST_UPDATE_MESSAGE, None)
            .with_error(ErrorCode::InvalidTime, "Appointment time is in the past"),
        Err(SchedulingError::NoUpdatesProvided) => {
            ToolResponse::new(ResponseStatus::Failure, NO_UPDATES_MESSAGE, None)
                .with_error(ErrorCode::NoUpdatesProvided, "No update fields provided")
        }
        Err(error) => {
            let message = error.to_string();
            ToolResponse::new(ResponseStatus::Failure, message.clone(), None)
                .with_error(ErrorCode::UpdateFailed, message)
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeleteStatus {
    Success,
    Error,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DeleteData {
    pub status: DeleteStatus,
    pub message: String,
}

pub fn delete_response(event_id: &str, result: Result<(), SchedulingError>) -> ToolResponse<DeleteData> {
    match result {
        Ok(()) => {
            let message = format!("The event with ID {event_id} has been successfully deleted.");
            ToolResponse::new(
                ResponseStatus::Success,
                message.clone(),
                Some(DeleteData { status: DeleteStatus::Success, message }),
            )
        }
        Err(error) => {
            let message = format!("Failed to delete event {event_id}: {error}");
            ToolResponse::new(
                ResponseStatus::Failure,
                message.clone(),
                Some(DeleteData { status: DeleteStatus::Error, message }),
            )
            .with_error(ErrorCode::DeleteEventFailed, error.to_string())
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventsStatus {
    EventsFound,
    NoEventsFound,
    Error,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSummary {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub start_time: String,
    pub end_time: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attendees: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TimeFrameData {
    pub start: String,
    pub end: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventsData {
    pub status: EventsStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<EventSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_frame: Option<TimeFrameData>,
}

pub fn events_response(
    time_frame: Option<&str>,
    result: Result<EventListing, SchedulingError>,
) -> ToolResponse<EventsData> {
    let scope = match time_frame.map(str::trim).filter(|value| !value.is_empty()) {
        Some(label) => format!(" for {label}"),
        None => " in the next 14 days".to_string(),
    };

    let listing = match result {
        Ok(listing) => listing,
        Err(error) => {
            let message = error.to_string();
            return ToolResponse::new(
                ResponseStatus::Failure,
                message.clone(),
                Some(EventsData {
                    status: EventsStatus::Error,
                    message: message.clone(),
                    events: Vec::new(),
                    time_frame: None,
                }),
            )
            .with_error(ErrorCode::CalendarEventsError, message);
        }
    };

    let zone = listing.time_zone;
    let frame = TimeFrameData {
        start: format_date(listing.window.start.with_timezone(&zone).date_naive()),
        end: format_date(listing.window.end.with_timezone(&zone).date_naive()),
    };

    if listing.events.is_empty() {
        let message = format!("No appointments found{scope}.");
        return ToolResponse::new(
            ResponseStatus::NoData,
            message.clone(),
            Some(EventsData {
                status: EventsStatus::NoEventsFound,
                message,
                events: Vec::new(),
                time_frame: Some(frame),
            }),
        );
    }

    let events: Vec<EventSummary> = listing
        .events
        .into_iter()
        .map(|event| EventSummary {
            title: event.summary.clone().unwrap_or_else(|| "Untitled Event".to_string()),
            start_time: render_event_time(&event.start, zone),
            end_time: render_event_time(&event.end, zone),
            attendees: event
                .attendees
                .iter()
                .filter_map(|attendee| attendee.display_name.clone().or_else(|| attendee.email.clone()))
                .collect(),
            id: event.id,
            description: event.description,
            location: event.location,
        })
        .collect();

    let message = format!(
        "Found {} appointment{}{scope}.",
        events.len(),
        if events.len() == 1 { "" } else { "s" }
    );
    ToolResponse::new(
        ResponseStatus::Success,
        message.clone(),
        Some(EventsData { status: EventsStatus::EventsFound, message, events, time_frame: Some(frame) }),
    )
}

fn render_event_time(time: &super::ports::EventTime, zone: Tz) -> String {
    match (time.date_time, time.date) {
        (Some(instant), _) => format_instant(instant, zone),
        (None, Some(date)) => format_date(date),
        (None, None) => String::new(),
    }
}
