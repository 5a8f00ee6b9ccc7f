use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use super::ports::{
    CalendarBusy, CalendarEvent, CalendarGateway, DirectoryError, EventAttendee, EventDraft,
    EventPatch, EventTime, FreeBusyResponse, GatewayError, ServiceDirectory,
};
use crate::domain::calendar::CalendarServiceDescriptor;
use crate::slots::Interval;

/// Process-local calendar backend. Busy time is derived from the stored,
/// non-cancelled events.
#[derive(Default)]
pub struct InMemoryCalendar {
    state: RwLock<CalendarState>,
}

#[derive(Default)]
struct CalendarState {
    calendars: HashMap<String, BTreeMap<String, CalendarEvent>>,
    next_id: u64,
}

impl InMemoryCalendar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks `slot` on `calendar_id` with a placeholder event and returns its id.
    pub async fn block(&self, calendar_id: &str, slot: Interval, summary: &str) -> String {
        let mut state = self.state.write().await;
        let id = state.allocate_id();
        let event = CalendarEvent {
            id: id.clone(),
            summary: Some(summary.to_string()),
            description: None,
            start: EventTime { date_time: Some(slot.start), ..EventTime::default() },
            end: EventTime { date_time: Some(slot.end), ..EventTime::default() },
            status: Some("confirmed".to_string()),
            location: None,
            attendees: Vec::new(),
        };
        state.calendars.entry(calendar_id.to_string()).or_default().insert(id.clone(), event);
        id
    }

    pub async fn events(&self, calendar_id: &str) -> Vec<CalendarEvent> {
        let state = self.state.read().await;
        state.calendars.get(calendar_id).map(|events| events.values().cloned().collect()).unwrap_or_default()
    }
}

impl CalendarState {
    fn allocate_id(&mut self) -> String {
        self.next_id += 1;
        format!("evt-{:06}", self.next_id)
    }
}

fn event_span(event: &CalendarEvent) -> Option<Interval> {
    Interval::new(event.start.date_time?, event.end.date_time?)
}

fn not_found(event_id: &str) -> GatewayError {
    GatewayError::Status { status: 404, body: format!("event `{event_id}` not found") }
}

fn encode(event: &CalendarEvent) -> Result<Value, GatewayError> {
    serde_json::to_value(event).map_err(|error| GatewayError::Decode(error.to_string()))
}

#[async_trait]
impl CalendarGateway for InMemoryCalendar {
    async fn free_busy(&self, calendar_id: &str, window: Interval) -> Result<FreeBusyResponse, GatewayError> {
        let state = self.state.read().await;
        let mut busy: Vec<Interval> = state
            .calendars
            .get(calendar_id)
            .into_iter()
            .flat_map(|events| events.values())
            .filter(|event| !event.is_cancelled())
            .filter_map(event_span)
            .filter(|span| span.overlaps(&window))
            .collect();
        busy.sort_by_key(|span| span.start);

        let mut calendars = BTreeMap::new();
        calendars.insert(calendar_id.to_string(), CalendarBusy { busy });
        Ok(FreeBusyResponse { calendars })
    }

    async fn create_event(&self, calendar_id: &str, draft: &EventDraft) -> Result<Value, GatewayError> {
        let mut state = self.state.write().await;
        let id = state.allocate_id();
        let event = CalendarEvent {
            id: id.clone(),
            summary: Some(draft.summary.clone()),
            description: Some(draft.description.clone()),
            start: EventTime {
                date_time: Some(draft.start),
                date: None,
                time_zone: Some(draft.time_zone.clone()),
            },
            end: EventTime { date_time: Some(draft.end), date: None, time_zone: Some(draft.time_zone.clone()) },
            status: Some("confirmed".to_string()),
            location: None,
            attendees: draft
                .attendees
                .iter()
                .map(|attendee| EventAttendee {
                    email: Some(attendee.email.clone()),
                    display_name: attendee.display_name.clone(),
                    response_status: Some("needsAction".to_string()),
                })
                .collect(),
        };
        let encoded = encode(&event)?;
        state.calendars.entry(calendar_id.to_string()).or_default().insert(id, event);
        Ok(encoded)
    }

    async fn update_event(
        &self,
        calendar_id: &str,
        event_id: &str,
        patch: &EventPatch,
    ) -> Result<Value, GatewayError> {
        let mut state = self.state.write().await;
        let event = state
            .calendars
            .get_mut(calendar_id)
            .and_then(|events| events.get_mut(event_id))
            .ok_or_else(|| not_found(event_id))?;

        if let Some(start) = patch.start {
            event.start.date_time = Some(start);
        }
        if let Some(end) = patch.end {
            event.end.date_time = Some(end);
        }
        if let Some(summary) = &patch.summary {
            event.summary = Some(summary.clone());
        }
        if let Some(description) = &patch.description {
            event.description = Some(description.clone());
        }
        if let Some(time_zone) = &patch.time_zone {
            event.start.time_zone = Some(time_zone.clone());
            event.end.time_zone = Some(time_zone.clone());
        }
        if let Some(attendees) = &patch.attendees {
            event.attendees = attendees
                .iter()
                .map(|attendee| EventAttendee {
                    email: Some(attendee.email.clone()),
                    display_name: attendee.display_name.clone(),
                    response_status: Some("needsAction".to_string()),
                })
                .collect();
        }
        encode(event)
    }

    async fn delete_event(&self, calendar_id: &str, event_id: &str) -> Result<(), GatewayError> {
        let mut state = self.state.write().await;
        state
            .calendars
            .get_mut(calendar_id)
            .and_then(|events| events.remove(event_id))
            .map(|_| ())
            .ok_or_else(|| not_found(event_id))
    }

    async fn list_events(
        &self,
        calendar_id: &str,
        window: Interval,
        max_results: u32,
    ) -> Result<Vec<CalendarEvent>, GatewayError> {
        let state = self.state.read().await;
        let mut events: Vec<CalendarEvent> = state
            .calendars
            .get(calendar_id)
            .into_iter()
            .flat_map(|events| events.values())
            .filter(|event| event_span(event).map_or(false, |span| span.overlaps(&window)))
            .cloned()
            .collect();
        events.sort_by_key(|event| event.start.date_time);
        events.truncate(max_results as usize);
        Ok(events)
    }
}

/// Fixed set of service descriptors keyed by business and service name.
#[derive(Default)]
pub struct StaticServiceDirectory {
    services: RwLock<HashMap<(String, String), CalendarServiceDescriptor>>,
}

impl StaticServiceDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, business_id: &str, descriptor: CalendarServiceDescriptor) {
        self.services
            .write()
            .await
            .insert((business_id.to_string(), descriptor.service_name.clone()), descriptor);
    }
}

#[async_trait]
impl ServiceDirectory for StaticServiceDirectory {
    async fn find_by_name(
        &self,
        business_id: &str,
        service_name: &str,
    ) -> Result<Option<CalendarServiceDescriptor>, DirectoryError> {
        let services = self.services.read().await;
        Ok(services.get(&(business_id.to_string(), service_name.to_string())).cloned())
    }
}
