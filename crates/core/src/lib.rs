pub mod config;
pub mod domain;
pub mod errors;
pub mod knowledge;
pub mod scheduling;
pub mod slots;
pub mod time;

pub use domain::business::{Business, BusinessId, UserProfile};
pub use domain::calendar::{CalendarServiceDescriptor, ServiceSettings, SettingsError};
pub use domain::conversation::{ConversationHistory, ToolCall, ToolResult, Turn, TurnRole};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use knowledge::{KnowledgeError, KnowledgeIndex, KnowledgeMatch};
pub use scheduling::{Scheduler, SchedulingError};
pub use slots::Interval;
