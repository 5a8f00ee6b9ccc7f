//! Calendar tools. Each call builds a [`Scheduler`] for the business named in the
//! request context and renders the workflow outcome as a typed tool response.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use concierge_core::scheduling::ports::{CalendarGateway, Clock, EventDetails, ServiceDirectory};
use concierge_core::scheduling::response::{
    availability_response, day_slots_response, delete_response, events_response,
    slot_check_response, update_response,
};
use concierge_core::scheduling::{AppointmentUpdate, Scheduler};

use super::{
    parse_args, require_context, to_value, whole_number, Tool, ToolArgs, ToolContext, ToolError,
    ToolRegistry, ToolRequirement,
};
use crate::llm::ToolSchema;

/// Shared collaborators for the calendar tools.
pub struct CalendarToolkit {
    directory: Arc<dyn ServiceDirectory>,
    calendar: Arc<dyn CalendarGateway>,
    clock: Arc<dyn Clock>,
}

impl CalendarToolkit {
    pub fn new(
        directory: Arc<dyn ServiceDirectory>,
        calendar: Arc<dyn CalendarGateway>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { directory, calendar, clock }
    }

    fn scheduler(&self, context: &ToolContext) -> Scheduler {
        Scheduler::new(
            context.business_id.clone(),
            self.directory.clone(),
            self.calendar.clone(),
            self.clock.clone(),
        )
    }
}

/// Registers all six calendar tools against one shared toolkit.
pub fn register_calendar_tools(registry: &mut ToolRegistry, toolkit: Arc<CalendarToolkit>) {
    registry.register(CheckSpecificAvailability(toolkit.clone()));
    registry.register(FindGeneralAvailability(toolkit.clone()));
    registry.register(CheckFreeBusyAndSchedule(toolkit.clone()));
    registry.register(ListCalendarEvents(toolkit.clone()));
    registry.register(UpdateAppointment(toolkit.clone()));
    registry.register(DeleteEvent(toolkit));
}

fn service_name_property() -> Value {
    json!({
        "type": "string",
        "description": "The name of the calendar service, exactly as the business calls it (e.g. 'Haircut')."
    })
}

fn event_details_property() -> Value {
    json!({
        "type": "object",
        "description": "Optional details written to the calendar event.",
        "properties": {
            "summary": { "type": "string", "description": "Title of the appointment." },
            "description": { "type": "string", "description": "Notes for the appointment." },
            "timeZone": { "type": "string", "description": "IANA time zone of the appointment, e.g. 'America/Mexico_City'." },
            "attendees": {
                "type": "array",
                "description": "People invited to the appointment.",
                "items": {
                    "type": "object",
                    "properties": {
                        "email": { "type": "string" },
                        "displayName": { "type": "string" }
                    },
                    "required": ["email"]
                }
            }
        }
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CheckSpecificArgs {
    service_name: String,
    time_min: String,
    #[serde(default)]
    time_max: Option<String>,
}

pub struct CheckSpecificAvailability(Arc<CalendarToolkit>);

#[async_trait]
impl Tool for CheckSpecificAvailability {
    fn name(&self) -> &'static str {
        "check_specific_availability"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name().to_string(),
            description: "Checks whether an exact time range is free on a service's calendar.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "serviceName": service_name_property(),
                    "timeMin": {
                        "type": "string",
                        "description": "Start of the range as an ISO 8601 date-time, e.g. '2026-10-20T10:00:00-06:00'."
                    },
                    "timeMax": {
                        "type": "string",
                        "description": "End of the range as an ISO 8601 date-time. Defaults to one appointment length after timeMin."
                    }
                },
                "required": ["serviceName", "timeMin"]
            }),
        }
    }

    fn requirement(&self) -> ToolRequirement {
        ToolRequirement::Context
    }

    async fn execute(&self, args: ToolArgs, context: Option<&ToolContext>) -> Result<Value, ToolError> {
        let context = require_context(self.name(), context)?;
        let args: CheckSpecificArgs = parse_args(self.name(), args)?;

        let result = self
            .0
            .scheduler(context)
            .check_specific(&args.service_name, &args.time_min, args.time_max.as_deref())
            .await;
        to_value(self.name(), &slot_check_response(result))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FindGeneralArgs {
    date: String,
    service_name: String,
}

pub struct FindGeneralAvailability(Arc<CalendarToolkit>);

#[async_trait]
impl Tool for FindGeneralAvailability {
    fn name(&self) -> &'static str {
        "find_general_availability"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name().to_string(),
            description: "Lists every open appointment slot for a service on a given day.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "date": {
                        "type": "string",
                        "description": "The day to inspect: 'today', 'tomorrow', 'next friday' or YYYY-MM-DD."
                    },
                    "serviceName": service_name_property()
                },
                "required": ["date", "serviceName"]
            }),
        }
    }

    fn requirement(&self) -> ToolRequirement {
        ToolRequirement::Context
    }

    async fn execute(&self, args: ToolArgs, context: Option<&ToolContext>) -> Result<Value, ToolError> {
        let context = require_context(self.name(), context)?;
        let args: FindGeneralArgs = parse_args(self.name(), args)?;

        let result = self.0.scheduler(context).find_general(&args.service_name, &args.date).await;
        to_value(self.name(), &day_slots_response(result))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScheduleArgs {
    day: String,
    #[serde(default)]
    hour: Option<String>,
    service_name: String,
    #[serde(default)]
    should_book: Option<bool>,
    #[serde(default)]
    event_details: Option<EventDetails>,
}

pub struct CheckFreeBusyAndSchedule(Arc<CalendarToolkit>);

#[async_trait]
impl Tool for CheckFreeBusyAndSchedule {
    fn name(&self) -> &'static str {
        "check_free_busy_and_schedule"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name().to_string(),
            description: "Checks availability for a day and optional hour and books the appointment when \
                the slot is free. When the requested time is taken, returns the remaining openings for that day."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "day": {
                        "type": "string",
                        "description": "Requested day: 'today', 'tomorrow', 'next monday' or YYYY-MM-DD."
                    },
                    "hour": {
                        "type": "string",
                        "description": "Requested time such as '17:00', '5pm' or '9:30 am'. Omit to list the day's openings."
                    },
                    "serviceName": service_name_property(),
                    "shouldBook": {
                        "type": "boolean",
                        "description": "Whether to book the slot when it is free. Defaults to true."
                    },
                    "eventDetails": event_details_property()
                },
                "required": ["day", "serviceName"]
            }),
        }
    }

    fn requirement(&self) -> ToolRequirement {
        ToolRequirement::Context
    }

    async fn execute(&self, args: ToolArgs, context: Option<&ToolContext>) -> Result<Value, ToolError> {
        let context = require_context(self.name(), context)?;
        let args: ScheduleArgs = parse_args(self.name(), args)?;

        let result = self
            .0
            .scheduler(context)
            .check_and_schedule(
                &args.service_name,
                &args.day,
                args.hour.as_deref(),
                args.should_book.unwrap_or(true),
                args.event_details.as_ref(),
            )
            .await;
        to_value(self.name(), &availability_response(result))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListArgs {
    service_name: String,
    #[serde(default)]
    time_frame: Option<String>,
    #[serde(default)]
    max_results: Option<f64>,
}

pub struct ListCalendarEvents(Arc<CalendarToolkit>);

#[async_trait]
impl Tool for ListCalendarEvents {
    fn name(&self) -> &'static str {
        "list_calendar_events"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name().to_string(),
            description: "Lists the upcoming appointments on a service's calendar.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "serviceName": service_name_property(),
                    "timeFrame": {
                        "type": "string",
                        "description": "Which period to list: 'today', 'tomorrow', 'this week', 'next week', a weekday or YYYY-MM-DD. Defaults to the next 14 days."
                    },
                    "maxResults": {
                        "type": "number",
                        "description": "Maximum number of events to return (1-250, default 50)."
                    }
                },
                "required": ["serviceName"]
            }),
        }
    }

    fn requirement(&self) -> ToolRequirement {
        ToolRequirement::Context
    }

    async fn execute(&self, args: ToolArgs, context: Option<&ToolContext>) -> Result<Value, ToolError> {
        let context = require_context(self.name(), context)?;
        let args: ListArgs = parse_args(self.name(), args)?;
        let max_results = args
            .max_results
            .map(|value| whole_number(self.name(), "maxResults", value))
            .transpose()?;

        let result = self
            .0
            .scheduler(context)
            .list_events(&args.service_name, args.time_frame.as_deref(), max_results)
            .await;
        to_value(self.name(), &events_response(args.time_frame.as_deref(), result))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateArgs {
    service_name: String,
    event_id: String,
    #[serde(default)]
    new_day: Option<String>,
    #[serde(default)]
    new_time: Option<String>,
    #[serde(default)]
    new_duration: Option<f64>,
    #[serde(default)]
    event_details: Option<EventDetails>,
}

pub struct UpdateAppointment(Arc<CalendarToolkit>);

#[async_trait]
impl Tool for UpdateAppointment {
    fn name(&self) -> &'static str {
        "update_appointment"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name().to_string(),
            description: "Reschedules an existing appointment or edits its details. A new time requires \
                both newDay and newTime."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "serviceName": service_name_property(),
                    "eventId": {
                        "type": "string",
                        "description": "ID of the event to update, as returned by list_calendar_events."
                    },
                    "newDay": {
                        "type": "string",
                        "description": "New day: 'today', 'tomorrow', 'next monday' or YYYY-MM-DD."
                    },
                    "newTime": {
                        "type": "string",
                        "description": "New start time such as '15:00' or '3pm'."
                    },
                    "newDuration": {
                        "type": "number",
                        "description": "New length in minutes. Only valid together with newDay and newTime."
                    },
                    "eventDetails": event_details_property()
                },
                "required": ["serviceName", "eventId"]
            }),
        }
    }

    fn requirement(&self) -> ToolRequirement {
        ToolRequirement::Context
    }

    async fn execute(&self, args: ToolArgs, context: Option<&ToolContext>) -> Result<Value, ToolError> {
        let context = require_context(self.name(), context)?;
        let args: UpdateArgs = parse_args(self.name(), args)?;
        let new_duration_minutes = args
            .new_duration
            .map(|value| whole_number(self.name(), "newDuration", value))
            .transpose()?;

        let update = AppointmentUpdate {
            event_id: args.event_id,
            new_day: args.new_day,
            new_time: args.new_time,
            new_duration_minutes,
            details: args.event_details.unwrap_or_default(),
        };
        let result = self.0.scheduler(context).update_appointment(&args.service_name, update).await;
        to_value(self.name(), &update_response(result))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeleteArgs {
    #[serde(alias = "calendarName")]
    service_name: String,
    event_id: String,
}

pub struct DeleteEvent(Arc<CalendarToolkit>);

#[async_trait]
impl Tool for DeleteEvent {
    fn name(&self) -> &'static str {
        "delete_event"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name().to_string(),
            description: "Cancels an appointment by deleting its calendar event.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "serviceName": service_name_property(),
                    "eventId": {
                        "type": "string",
                        "description": "ID of the event to delete, as returned by list_calendar_events."
                    }
                },
                "required": ["serviceName", "eventId"]
            }),
        }
    }

    fn requirement(&self) -> ToolRequirement {
        ToolRequirement::Context
    }

    async fn execute(&self, args: ToolArgs, context: Option<&ToolContext>) -> Result<Value, ToolError> {
        let context = require_context(self.name(), context)?;
        let args: DeleteArgs = parse_args(self.name(), args)?;

        let result = self.0.scheduler(context).delete_event(&args.service_name, &args.event_id).await;
        to_value(self.name(), &delete_response(&args.event_id, result))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{DateTime, TimeZone, Utc};
    use chrono_tz::Tz;
    use serde_json::{json, Map, Value};

    use concierge_core::domain::calendar::CalendarServiceDescriptor;
    use concierge_core::scheduling::ports::FixedClock;
    use concierge_core::scheduling::{InMemoryCalendar, StaticServiceDirectory};
    use concierge_core::slots::Interval;
    use concierge_core::time::ClockTime;

    use super::{register_calendar_tools, CalendarToolkit};
    use crate::tools::{ToolContext, ToolError, ToolRegistry};

    const BUSINESS: &str = "clinic-1";
    const CALENDAR: &str = "cal-haircut";

    fn utc(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, day, hour, minute, 0).unwrap()
    }

    fn context() -> ToolContext {
        ToolContext {
            business_id: BUSINESS.to_string(),
            conversation_key: "5215512345678".to_string(),
            correlation_id: "wamid.calendar".to_string(),
        }
    }

    fn args(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    async fn registry_at(now: DateTime<Utc>, calendar: Arc<InMemoryCalendar>) -> ToolRegistry {
        registry_in(Tz::UTC, now, calendar).await
    }

    async fn registry_in(zone: Tz, now: DateTime<Utc>, calendar: Arc<InMemoryCalendar>) -> ToolRegistry {
        let directory = StaticServiceDirectory::new();
        directory
            .insert(
                BUSINESS,
                CalendarServiceDescriptor {
                    service_name: "Haircut".to_string(),
                    external_calendar_id: CALENDAR.to_string(),
                    open_hours: ClockTime { hour: 9, minute: 0 },
                    close_hours: ClockTime { hour: 17, minute: 0 },
                    duration_minutes: 30,
                    time_zone: zone,
                },
            )
            .await;

        let toolkit = CalendarToolkit::new(Arc::new(directory), calendar, Arc::new(FixedClock(now)));
        let mut registry = ToolRegistry::default();
        register_calendar_tools(&mut registry, Arc::new(toolkit));
        registry
    }

    #[tokio::test]
    async fn registers_six_context_tools() {
        let registry = registry_at(utc(16, 8, 0), Arc::new(InMemoryCalendar::new())).await;
        assert_eq!(
            registry.names(),
            vec![
                "check_specific_availability",
                "find_general_availability",
                "check_free_busy_and_schedule",
                "list_calendar_events",
                "update_appointment",
                "delete_event",
            ]
        );

        let tool = registry.get("delete_event").expect("registered");
        let error = tool
            .execute(args(json!({ "serviceName": "Haircut", "eventId": "evt-1" })), None)
            .await
            .expect_err("context required");
        assert_eq!(error, ToolError::MissingContext("delete_event".to_string()));
    }

    #[tokio::test]
    async fn schedule_books_free_slot_by_default() {
        let calendar = Arc::new(InMemoryCalendar::new());
        let registry = registry_at(utc(16, 8, 0), calendar.clone()).await;
        let tool = registry.get("check_free_busy_and_schedule").expect("registered");

        let result = tool
            .execute(
                args(json!({
                    "day": "tomorrow",
                    "hour": "10am",
                    "serviceName": "Haircut",
                    "eventDetails": { "summary": "Trim for Ana" }
                })),
                Some(&context()),
            )
            .await
            .expect("schedule");

        assert_eq!(result["status"], "success");
        assert_eq!(result["data"]["status"], "BOOKED");
        assert_eq!(result["data"]["time"], "Saturday, October 17, 2026 at 10:00 AM");
        let events = calendar.events(CALENDAR).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].summary.as_deref(), Some("Trim for Ana"));
    }

    #[tokio::test]
    async fn specific_check_reads_offsetless_times_in_service_zone() {
        let zone: Tz = "America/Mexico_City".parse().unwrap();
        let calendar = Arc::new(InMemoryCalendar::new());
        // 10:15 local.
        calendar.block(CALENDAR, Interval::new(utc(20, 16, 0), utc(20, 16, 30)).unwrap(), "busy").await;
        let registry = registry_in(zone, utc(16, 8, 0), calendar).await;
        let tool = registry.get("check_specific_availability").expect("registered");

        let busy = tool
            .execute(
                args(json!({ "serviceName": "Haircut", "timeMin": "2026-10-20T10:15:00" })),
                Some(&context()),
            )
            .await
            .expect("check");
        assert_eq!(busy["data"]["isAvailable"], false);
        assert_eq!(busy["data"]["start"], "Tuesday, October 20, 2026 at 10:15 AM");

        let free = tool
            .execute(
                args(json!({ "serviceName": "Haircut", "timeMin": "2026-10-20T10:15:00Z" })),
                Some(&context()),
            )
            .await
            .expect("check");
        assert_eq!(free["data"]["isAvailable"], true);

        let garbled = tool
            .execute(args(json!({ "serviceName": "Haircut", "timeMin": "soon" })), Some(&context()))
            .await
            .expect("check");
        assert_eq!(garbled["status"], "failure");
        assert_eq!(garbled["error"]["code"], "INVALID_TIME_FORMAT");
    }

    #[tokio::test]
    async fn general_and_scheduling_tools_agree_on_today_near_midnight() {
        let zone: Tz = "America/Mexico_City".parse().unwrap();
        // Friday 21:00 in Mexico City, Saturday 03:00 UTC.
        let registry = registry_in(zone, utc(17, 3, 0), Arc::new(InMemoryCalendar::new())).await;

        let general = registry
            .get("find_general_availability")
            .expect("registered")
            .execute(args(json!({ "date": "today", "serviceName": "Haircut" })), Some(&context()))
            .await
            .expect("general");
        let scheduled = registry
            .get("check_free_busy_and_schedule")
            .expect("registered")
            .execute(args(json!({ "day": "today", "serviceName": "Haircut" })), Some(&context()))
            .await
            .expect("schedule");

        assert_eq!(general["data"]["date"], "2026-10-16");
        assert_eq!(scheduled["data"]["date"], general["data"]["date"]);
    }

    #[tokio::test]
    async fn unknown_service_is_reported_as_data() {
        let registry = registry_at(utc(16, 8, 0), Arc::new(InMemoryCalendar::new())).await;
        let tool = registry.get("find_general_availability").expect("registered");

        let result = tool
            .execute(args(json!({ "date": "tomorrow", "serviceName": "Massage" })), Some(&context()))
            .await
            .expect("tool result");

        assert_eq!(result["status"], "failure");
    }

    #[tokio::test]
    async fn delete_accepts_calendar_name_alias() {
        let calendar = Arc::new(InMemoryCalendar::new());
        let id = calendar.block(CALENDAR, Interval::new(utc(20, 10, 0), utc(20, 10, 30)).unwrap(), "busy").await;
        let registry = registry_at(utc(16, 8, 0), calendar.clone()).await;
        let tool = registry.get("delete_event").expect("registered");

        let result = tool
            .execute(args(json!({ "calendarName": "Haircut", "eventId": id })), Some(&context()))
            .await
            .expect("delete");

        assert_eq!(result["status"], "success");
        assert!(calendar.events(CALENDAR).await.is_empty());
    }

    #[tokio::test]
    async fn list_rejects_negative_limits() {
        let registry = registry_at(utc(16, 8, 0), Arc::new(InMemoryCalendar::new())).await;
        let tool = registry.get("list_calendar_events").expect("registered");

        let error = tool
            .execute(args(json!({ "serviceName": "Haircut", "maxResults": -3 })), Some(&context()))
            .await
            .expect_err("negative");
        assert!(matches!(error, ToolError::InvalidArguments { .. }));
    }
}
