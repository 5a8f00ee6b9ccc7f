use async_trait::async_trait;
use chrono::Utc;
use chrono_tz::Tz;
use sqlx::Row;
use tracing::warn;

use concierge_core::domain::business::BusinessId;
use concierge_core::domain::calendar::{CalendarServiceDescriptor, ServiceSettings};
use concierge_core::scheduling::{DirectoryError, ServiceDirectory};

use super::RepositoryError;
use crate::DbPool;

/// Row shape for a bookable calendar service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CalendarServiceRecord {
    pub id: String,
    pub business_id: BusinessId,
    pub name: String,
    pub external_calendar_id: String,
    pub settings: ServiceSettings,
}

/// SQL-backed service directory. Services without their own zone inherit the
/// business zone, then `default_zone`.
pub struct SqlCalendarServiceRepository {
    pool: DbPool,
    default_zone: Tz,
}

impl SqlCalendarServiceRepository {
    pub fn new(pool: DbPool, default_zone: Tz) -> Self {
        Self { pool, default_zone }
    }

    pub async fn save(&self, record: &CalendarServiceRecord) -> Result<(), RepositoryError> {
        let settings = serde_json::to_string(&record.settings)
            .map_err(|error| RepositoryError::Decode(error.to_string()))?;

        sqlx::query(
            "INSERT INTO calendar_services (
                id, business_id, name, external_calendar_id, settings_json, created_at
             ) VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(business_id, name) DO UPDATE SET
                external_calendar_id = excluded.external_calendar_id,
                settings_json = excluded.settings_json",
        )
        .bind(&record.id)
        .bind(&record.business_id.0)
        .bind(&record.name)
        .bind(&record.external_calendar_id)
        .bind(settings)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl ServiceDirectory for SqlCalendarServiceRepository {
    async fn find_by_name(
        &self,
        business_id: &str,
        service_name: &str,
    ) -> Result<Option<CalendarServiceDescriptor>, DirectoryError> {
        let row = sqlx::query(
            "SELECT cs.name, cs.external_calendar_id, cs.settings_json, b.time_zone
             FROM calendar_services cs
             JOIN businesses b ON b.id = cs.business_id
             WHERE cs.business_id = ? AND cs.name = ?",
        )
        .bind(business_id)
        .bind(service_name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| DirectoryError::Lookup(error.to_string()))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let lookup = |error: sqlx::Error| DirectoryError::Lookup(error.to_string());
        let name: String = row.try_get("name").map_err(lookup)?;
        let calendar_id: String = row.try_get("external_calendar_id").map_err(lookup)?;
        let raw_settings: String = row.try_get("settings_json").map_err(lookup)?;
        let business_zone: String = row.try_get("time_zone").map_err(lookup)?;

        let invalid = |reason: String| DirectoryError::InvalidSettings {
            service: service_name.to_string(),
            reason,
        };
        let settings: ServiceSettings =
            serde_json::from_str(&raw_settings).map_err(|error| invalid(error.to_string()))?;
        let zone = business_zone.parse::<Tz>().unwrap_or_else(|_| {
            warn!(
                event_name = "db.calendar_service.unknown_business_zone",
                business_id,
                time_zone = %business_zone,
                "falling back to default time zone"
            );
            self.default_zone
        });

        settings
            .into_descriptor(name, calendar_id, zone)
            .map(Some)
            .map_err(|error| invalid(error.to_string()))
    }
}
