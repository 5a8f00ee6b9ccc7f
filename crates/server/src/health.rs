//! `GET /health`: whether webhooks can be accepted and answered right now.

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use concierge_db::{ping, DbPool};
use concierge_whatsapp::MessageQueue;
use serde::Serialize;

#[derive(Clone)]
pub struct HealthState {
    pub db_pool: DbPool,
    pub queue: MessageQueue,
    pub calendar_backend: &'static str,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Readiness {
    Ready,
    Degraded,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ComponentReport {
    pub status: Readiness,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub status: Readiness,
    pub database: ComponentReport,
    pub message_queue: ComponentReport,
    pub calendar_backend: &'static str,
    pub checked_at: String,
}

pub fn router(state: HealthState) -> Router {
    Router::new().route("/health", get(health)).with_state(state)
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthReport>) {
    let database = match ping(&state.db_pool).await {
        Ok(()) => ComponentReport { status: Readiness::Ready, detail: "conversation store reachable".to_string() },
        Err(error) => ComponentReport {
            status: Readiness::Degraded,
            detail: format!("conversation store unreachable: {error}"),
        },
    };
    let message_queue = if state.queue.is_closed() {
        ComponentReport { status: Readiness::Degraded, detail: "message worker stopped".to_string() }
    } else {
        ComponentReport {
            status: Readiness::Ready,
            detail: format!("{} of {} messages waiting", state.queue.backlog(), state.queue.max_capacity()),
        }
    };

    let ready = database.status == Readiness::Ready && message_queue.status == Readiness::Ready;
    let report = HealthReport {
        status: if ready { Readiness::Ready } else { Readiness::Degraded },
        database,
        message_queue,
        calendar_backend: state.calendar_backend,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(report))
}
