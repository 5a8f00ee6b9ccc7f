//! Appointment availability and booking against an external calendar.

pub mod memory;
pub mod ports;
pub mod response;
pub mod workflows;

use thiserror::Error;

use crate::time::TimeError;

pub use memory::{InMemoryCalendar, StaticServiceDirectory};
pub use ports::{
    Attendee, CalendarEvent, CalendarGateway, Clock, DirectoryError, EventDetails, EventDraft,
    EventPatch, FixedClock, FreeBusyResponse, GatewayError, ServiceDirectory, SystemClock,
};
pub use response::{ErrorCode, ResponseStatus, ToolResponse};
pub use workflows::{
    AppointmentUpdate, AvailabilityOutcome, AvailabilityReport, Scheduler, UnavailableReason,
};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SchedulingError {
    #[error("Calendar service '{service}' not found for business {business}")]
    ServiceNotFound { service: String, business: String },
    #[error(transparent)]
    Directory(#[from] DirectoryError),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Time(#[from] TimeError),
    #[error("Failed to retrieve availability information.")]
    NoCalendars,
    #[error("time range must end after it starts")]
    EmptyInterval,
    #[error("Appointment time is in the past")]
    PastTime,
    #[error("No update fields provided")]
    NoUpdatesProvided,
    #[error("{0}")]
    InvalidRequest(String),
}
