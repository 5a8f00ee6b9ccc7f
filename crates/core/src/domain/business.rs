use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BusinessId(pub String);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Business {
    pub id: BusinessId,
    pub name: String,
    pub time_zone: Tz,
}

/// Someone who messages the business. `notes` carries free-form history that is
/// surfaced to the assistant on every request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserProfile {
    pub id: String,
    pub business_id: BusinessId,
    pub phone_number: String,
    pub display_name: Option<String>,
    pub notes: Option<String>,
}

impl UserProfile {
    pub fn new(business_id: BusinessId, phone_number: impl Into<String>) -> Self {
        let phone_number = phone_number.into();
        Self {
            id: format!("{}:{}", business_id.0, phone_number),
            business_id,
            phone_number,
            display_name: None,
            notes: None,
        }
    }
}
