use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use serde_json::Value;
use tracing::{info, warn};

use super::ports::{
    CalendarEvent, CalendarGateway, Clock, EventDetails, EventDraft, EventPatch, ServiceDirectory,
};
use super::SchedulingError;
use crate::domain::calendar::CalendarServiceDescriptor;
use crate::slots::{free_intervals, is_available, Interval};
use crate::time::{
    combine_in_zone, parse_instant, resolve_clock_time, resolve_day, resolve_time_frame, ResolvedDay,
};

/// Slots starting sooner than this from now are not offered for today.
pub const SAME_DAY_LEAD_TIME_MINUTES: i64 = 15;
pub const DEFAULT_LIST_RESULTS: u32 = 50;
pub const MAX_LIST_RESULTS: u32 = 250;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UnavailableReason {
    PastTime,
    BookingFailed(String),
    NoSlotsToday,
    NoSlotsOnDay,
}

#[derive(Clone, Debug, PartialEq)]
pub enum AvailabilityOutcome {
    Available { slot: Interval },
    Booked { slot: Interval, event: Value },
    AvailableSuggestions { slots: Vec<Interval> },
    UnavailableSuggestions { requested: DateTime<Utc>, slots: Vec<Interval> },
    Unavailable(UnavailableReason),
}

#[derive(Clone, Debug, PartialEq)]
pub struct AvailabilityReport {
    pub day: ResolvedDay,
    pub time_zone: Tz,
    pub outcome: AvailabilityOutcome,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlotCheck {
    pub slot: Interval,
    pub available: bool,
    pub time_zone: Tz,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DayAvailability {
    pub date: NaiveDate,
    pub window: Interval,
    pub slots: Vec<Interval>,
    pub time_zone: Tz,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AppointmentUpdate {
    pub event_id: String,
    pub new_day: Option<String>,
    pub new_time: Option<String>,
    pub new_duration_minutes: Option<u32>,
    pub details: EventDetails,
}

#[derive(Clone, Debug, PartialEq)]
pub struct UpdatedAppointment {
    pub event_id: String,
    pub event: Value,
    pub slot: Option<Interval>,
    pub updated_fields: Vec<String>,
    pub time_zone: Tz,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventListing {
    pub window: Interval,
    pub events: Vec<CalendarEvent>,
    pub time_zone: Tz,
}

/// Availability and booking workflows for one business.
///
/// Each call resolves the service descriptor by name, talks to the calendar through
/// [`CalendarGateway`] and returns a typed outcome; rendering for the model lives in
/// [`super::response`].
#[derive(Clone)]
pub struct Scheduler {
    business_id: String,
    directory: Arc<dyn ServiceDirectory>,
    calendar: Arc<dyn CalendarGateway>,
    clock: Arc<dyn Clock>,
}

impl Scheduler {
    pub fn new(
        business_id: impl Into<String>,
        directory: Arc<dyn ServiceDirectory>,
        calendar: Arc<dyn CalendarGateway>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { business_id: business_id.into(), directory, calendar, clock }
    }

    pub fn business_id(&self) -> &str {
        &self.business_id
    }

    /// Whether `[start, end)` is free; `end` defaults to `start + duration`.
    ///
    /// Offset-less timestamps are wall-clock times in the service's zone.
    pub async fn check_specific(
        &self,
        service_name: &str,
        start: &str,
        end: Option<&str>,
    ) -> Result<SlotCheck, SchedulingError> {
        let descriptor = self.descriptor(service_name).await?;
        let start = parse_instant(start, descriptor.time_zone)?;
        let end = match end {
            Some(raw) => parse_instant(raw, descriptor.time_zone)?,
            None => start + descriptor.duration(),
        };
        let slot = Interval::new(start, end).ok_or(SchedulingError::EmptyInterval)?;

        let busy = self.busy(&descriptor, slot).await?;
        let available = is_available(slot.start, slot.end, &busy);

        info!(
            event_name = "scheduling.check_specific",
            service = %service_name,
            start = %slot.start,
            end = %slot.end,
            available,
            "checked specific slot"
        );
        Ok(SlotCheck { slot, available, time_zone: descriptor.time_zone })
    }

    /// Every free slot inside the service's business hours on `day`, resolved against
    /// today in the service's zone.
    pub async fn find_general(&self, service_name: &str, day: &str) -> Result<DayAvailability, SchedulingError> {
        let descriptor = self.descriptor(service_name).await?;
        let today = self.clock.now().with_timezone(&descriptor.time_zone).date_naive();
        let date = resolve_day(day, today).date;
        let window = descriptor.window_for(date)?;
        let busy = self.busy(&descriptor, window).await?;
        let slots = free_intervals(window.start, window.end, &busy, descriptor.duration());

        info!(
            event_name = "scheduling.find_general",
            service = %service_name,
            %date,
            busy = busy.len(),
            slots = slots.len(),
            "computed free slots"
        );
        Ok(DayAvailability { date, window, slots, time_zone: descriptor.time_zone })
    }

    /// Checks a requested day (and optionally hour), books it when free, and
    /// otherwise suggests the day's remaining openings.
    pub async fn check_and_schedule(
        &self,
        service_name: &str,
        day: &str,
        hour: Option<&str>,
        should_book: bool,
        details: Option<&EventDetails>,
    ) -> Result<AvailabilityReport, SchedulingError> {
        let now = self.clock.now();
        let descriptor = self.descriptor(service_name).await?;
        let zone = descriptor.time_zone;
        let today = now.with_timezone(&zone).date_naive();
        let resolved = resolve_day(day, today);
        let report = |outcome| AvailabilityReport { day: resolved, time_zone: zone, outcome };

        let window = descriptor.window_for(resolved.date)?;

        let mut requested = None;
        if let Some(hour) = hour.map(str::trim).filter(|value| !value.is_empty()) {
            let start = combine_in_zone(resolved.date, resolve_clock_time(hour)?, zone)?;
            if start <= now {
                info!(
                    event_name = "scheduling.past_time_rejected",
                    service = %service_name,
                    requested = %start,
                    "requested time already passed"
                );
                return Ok(report(AvailabilityOutcome::Unavailable(UnavailableReason::PastTime)));
            }

            let slot = Interval { start, end: start + descriptor.duration() };
            let busy = self.busy(&descriptor, slot).await?;
            if is_available(slot.start, slot.end, &busy) {
                if !should_book {
                    return Ok(report(AvailabilityOutcome::Available { slot }));
                }

                let draft = EventDraft::for_service(&descriptor, slot, details);
                let outcome = match self.calendar.create_event(&descriptor.external_calendar_id, &draft).await {
                    Ok(event) => {
                        info!(
                            event_name = "scheduling.booked",
                            service = %service_name,
                            start = %slot.start,
                            "appointment booked"
                        );
                        AvailabilityOutcome::Booked { slot, event }
                    }
                    Err(error) => {
                        warn!(
                            event_name = "scheduling.booking_failed",
                            service = %service_name,
                            start = %slot.start,
                            error = %error,
                            "slot was free but booking failed"
                        );
                        AvailabilityOutcome::Unavailable(UnavailableReason::BookingFailed(error.to_string()))
                    }
                };
                return Ok(report(outcome));
            }
            requested = Some(start);
        }

        let busy = self.busy(&descriptor, window).await?;
        let cutoff = now + Duration::minutes(SAME_DAY_LEAD_TIME_MINUTES);
        let slots: Vec<Interval> = free_intervals(window.start, window.end, &busy, descriptor.duration())
            .into_iter()
            .filter(|slot| slot.start > cutoff)
            .collect();

        let outcome = match (slots.is_empty(), requested) {
            (true, _) if resolved.date == today => {
                AvailabilityOutcome::Unavailable(UnavailableReason::NoSlotsToday)
            }
            (true, _) => AvailabilityOutcome::Unavailable(UnavailableReason::NoSlotsOnDay),
            (false, Some(requested)) => AvailabilityOutcome::UnavailableSuggestions { requested, slots },
            (false, None) => AvailabilityOutcome::AvailableSuggestions { slots },
        };
        Ok(report(outcome))
    }

    pub async fn update_appointment(
        &self,
        service_name: &str,
        update: AppointmentUpdate,
    ) -> Result<UpdatedAppointment, SchedulingError> {
        let descriptor = self.descriptor(service_name).await?;
        let zone = descriptor.time_zone;
        let mut patch = EventPatch::default();
        let mut slot = None;

        match (update.new_day.as_deref(), update.new_time.as_deref()) {
            (Some(day), Some(time)) => {
                let now = self.clock.now();
                let resolved = resolve_day(day, now.with_timezone(&zone).date_naive());
                let start = combine_in_zone(resolved.date, resolve_clock_time(time)?, zone)?;
                if start <= now {
                    return Err(SchedulingError::PastTime);
                }
                let duration = match update.new_duration_minutes {
                    Some(0) => return Err(SchedulingError::EmptyInterval),
                    Some(minutes) => Duration::minutes(i64::from(minutes)),
                    None => descriptor.duration(),
                };
                let new_slot = Interval { start, end: start + duration };
                patch.start = Some(new_slot.start);
                patch.end = Some(new_slot.end);
                slot = Some(new_slot);
            }
            (None, None) if update.new_duration_minutes.is_some() => {
                return Err(SchedulingError::InvalidRequest(
                    "When updating duration, both newDay and newTime must also be provided".to_string(),
                ));
            }
            (None, None) => {}
            _ => {
                return Err(SchedulingError::InvalidRequest(
                    "Both newDay and newTime must be provided when updating appointment time".to_string(),
                ));
            }
        }

        let details = update.details;
        patch.summary = details.summary.filter(|value| !value.trim().is_empty());
        patch.description = details.description.filter(|value| !value.trim().is_empty());
        patch.time_zone = details.time_zone.filter(|value| !value.trim().is_empty());
        patch.attendees = details.attendees;

        if patch.is_empty() {
            return Err(SchedulingError::NoUpdatesProvided);
        }

        let event = self
            .calendar
            .update_event(&descriptor.external_calendar_id, &update.event_id, &patch)
            .await?;
        let updated_fields: Vec<String> =
            patch.updated_fields().into_iter().map(str::to_string).collect();

        info!(
            event_name = "scheduling.updated",
            service = %service_name,
            event_id = %update.event_id,
            fields = %updated_fields.join(","),
            "appointment updated"
        );
        Ok(UpdatedAppointment { event_id: update.event_id, event, slot, updated_fields, time_zone: zone })
    }

    pub async fn delete_event(&self, service_name: &str, event_id: &str) -> Result<(), SchedulingError> {
        let descriptor = self.descriptor(service_name).await?;
        self.calendar.delete_event(&descriptor.external_calendar_id, event_id).await?;
        info!(event_name = "scheduling.deleted", service = %service_name, %event_id, "event deleted");
        Ok(())
    }

    /// Non-cancelled events within a named time frame (see [`resolve_time_frame`]).
    pub async fn list_events(
        &self,
        service_name: &str,
        time_frame: Option<&str>,
        max_results: Option<u32>,
    ) -> Result<EventListing, SchedulingError> {
        let descriptor = self.descriptor(service_name).await?;
        let window = resolve_time_frame(time_frame, self.clock.now(), descriptor.time_zone)?;
        let max_results = max_results.unwrap_or(DEFAULT_LIST_RESULTS).clamp(1, MAX_LIST_RESULTS);

        let events: Vec<CalendarEvent> = self
            .calendar
            .list_events(&descriptor.external_calendar_id, window, max_results)
            .await?
            .into_iter()
            .filter(|event| !event.is_cancelled())
            .collect();

        Ok(EventListing { window, events, time_zone: descriptor.time_zone })
    }

    async fn descriptor(&self, service_name: &str) -> Result<CalendarServiceDescriptor, SchedulingError> {
        self.directory.find_by_name(&self.business_id, service_name).await?.ok_or_else(|| {
            SchedulingError::ServiceNotFound {
                service: service_name.to_string(),
                business: self.business_id.clone(),
            }
        })
    }

    async fn busy(
        &self,
        descriptor: &CalendarServiceDescriptor,
        window: Interval,
    ) -> Result<Vec<Interval>, SchedulingError> {
        let response = self.calendar.free_busy(&descriptor.external_calendar_id, window).await?;
        response
            .busy_for(&descriptor.external_calendar_id)
            .map(<[Interval]>::to_vec)
            .ok_or(SchedulingError::NoCalendars)
    }
}
