use chrono::Utc;
use chrono_tz::Tz;
use sqlx::{sqlite::SqliteRow, Row};

use concierge_core::domain::business::{Business, BusinessId, UserProfile};

use super::{BusinessRepository, RepositoryError, UserRepository};
use crate::DbPool;

pub struct SqlBusinessRepository {
    pool: DbPool,
}

impl SqlBusinessRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl BusinessRepository for SqlBusinessRepository {
    async fn find_by_id(&self, id: &BusinessId) -> Result<Option<Business>, RepositoryError> {
        let row = sqlx::query("SELECT id, name, time_zone FROM businesses WHERE id = ?")
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.map(business_from_row).transpose()
    }

    async fn save(&self, business: Business) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO businesses (id, name, time_zone, created_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                time_zone = excluded.time_zone",
        )
        .bind(&business.id.0)
        .bind(&business.name)
        .bind(business.time_zone.name())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn business_from_row(row: SqliteRow) -> Result<Business, RepositoryError> {
    let zone: String = row.try_get("time_zone")?;
    let time_zone = zone
        .parse::<Tz>()
        .map_err(|_| RepositoryError::Decode(format!("unknown time zone `{zone}`")))?;

    Ok(Business { id: BusinessId(row.try_get("id")?), name: row.try_get("name")?, time_zone })
}

pub struct SqlUserRepository {
    pool: DbPool,
}

impl SqlUserRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl UserRepository for SqlUserRepository {
    async fn find_by_phone(
        &self,
        business_id: &BusinessId,
        phone_number: &str,
    ) -> Result<Option<UserProfile>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, business_id, phone_number, display_name, notes
             FROM users
             WHERE business_id = ? AND phone_number = ?",
        )
        .bind(&business_id.0)
        .bind(phone_number)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            Ok(UserProfile {
                id: row.try_get("id")?,
                business_id: BusinessId(row.try_get("business_id")?),
                phone_number: row.try_get("phone_number")?,
                display_name: row.try_get("display_name")?,
                notes: row.try_get("notes")?,
            })
        })
        .transpose()
    }

    async fn save(&self, user: UserProfile) -> Result<(), RepositoryError> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO users (
                id, business_id, phone_number, display_name, notes, created_at, updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(business_id, phone_number) DO UPDATE SET
                display_name = COALESCE(excluded.display_name, users.display_name),
                notes = COALESCE(excluded.notes, users.notes),
                updated_at = excluded.updated_at",
        )
        .bind(&user.id)
        .bind(&user.business_id.0)
        .bind(&user.phone_number)
        .bind(user.display_name.as_deref())
        .bind(user.notes.as_deref())
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
