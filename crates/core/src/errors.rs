use thiserror::Error;

use crate::scheduling::SchedulingError;
use crate::time::TimeError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error(transparent)]
    Time(#[from] TimeError),
    #[error("calendar service `{0}` is not configured")]
    UnknownService(String),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "Sorry, I could not understand that request. Could you rephrase it?"
            }
            Self::ServiceUnavailable { .. } => {
                "Sorry, I am having trouble reaching one of our systems. Please try again shortly."
            }
            Self::Internal { .. } => "Sorry, something went wrong on our side.",
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<SchedulingError> for ApplicationError {
    fn from(value: SchedulingError) -> Self {
        match value {
            SchedulingError::ServiceNotFound { service, .. } => {
                Self::Domain(DomainError::UnknownService(service))
            }
            SchedulingError::Time(error) => Self::Domain(DomainError::Time(error)),
            SchedulingError::Directory(error) => Self::Persistence(error.to_string()),
            other => Self::Integration(other.to_string()),
        }
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        match value {
            ApplicationError::Domain(error) => {
                Self::BadRequest { message: error.to_string(), correlation_id: "unassigned".to_owned() }
            }
            ApplicationError::Persistence(message) | ApplicationError::Integration(message) => {
                Self::ServiceUnavailable { message, correlation_id: "unassigned".to_owned() }
            }
            ApplicationError::Configuration(message) => {
                Self::Internal { message, correlation_id: "unassigned".to_owned() }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::{ApplicationError, DomainError, InterfaceError};
    use crate::scheduling::{GatewayError, SchedulingError};
    use crate::time::TimeError;

    #[test]
    fn domain_error_maps_to_bad_request_interface_error() {
        let interface = ApplicationError::from(DomainError::InvariantViolation(
            "missing service name".to_owned(),
        ))
        .into_interface("wamid-1");

        assert!(matches!(
            interface,
            InterfaceError::BadRequest {
                ref correlation_id,
                ..
            } if correlation_id == "wamid-1"
        ));
    }

    #[test]
    fn invalid_time_is_a_bad_request_with_user_safe_message() {
        let interface = ApplicationError::from(DomainError::Time(TimeError::InvalidTimeFormat(
            "25 o'clock".to_owned(),
        )))
        .into_interface("wamid-2");

        assert_eq!(
            interface.user_message(),
            "Sorry, I could not understand that request. Could you rephrase it?"
        );
    }

    #[test]
    fn calendar_outage_maps_to_service_unavailable() {
        let error = SchedulingError::Gateway(GatewayError::Timeout);
        let interface = ApplicationError::from(error).into_interface("wamid-3");

        assert!(matches!(interface, InterfaceError::ServiceUnavailable { .. }));
        assert_eq!(
            interface.user_message(),
            "Sorry, I am having trouble reaching one of our systems. Please try again shortly."
        );
    }

    #[test]
    fn unknown_service_maps_to_domain_error() {
        let error = SchedulingError::ServiceNotFound {
            service: "Dental Cleaning".to_owned(),
            business: "biz-1".to_owned(),
        };

        assert_eq!(
            ApplicationError::from(error),
            ApplicationError::Domain(DomainError::UnknownService("Dental Cleaning".to_owned()))
        );
    }

    #[test]
    fn configuration_error_maps_to_internal() {
        let interface = ApplicationError::Configuration("missing verify token".to_owned())
            .into_interface("wamid-4");

        assert!(matches!(interface, InterfaceError::Internal { .. }));
        assert_eq!(interface.user_message(), "Sorry, something went wrong on our side.");
    }
}
