//! HTTP client for the calendar proxy that fronts the external calendar provider.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use concierge_core::config::CalendarConfig;
use concierge_core::scheduling::{
    CalendarEvent, CalendarGateway, EventDraft, EventPatch, FreeBusyResponse, GatewayError,
};
use concierge_core::slots::Interval;

pub struct HttpCalendarGateway {
    http: reqwest::Client,
    base_url: String,
    token: Option<SecretString>,
}

#[derive(Debug, Default, Deserialize)]
struct EventsPage {
    #[serde(default)]
    items: Vec<CalendarEvent>,
}

impl HttpCalendarGateway {
    /// `None` when no calendar base URL is configured.
    pub fn from_config(config: &CalendarConfig) -> Result<Option<Self>, GatewayError> {
        let Some(base_url) = config.base_url.as_deref() else {
            return Ok(None);
        };
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| GatewayError::Transport(error.to_string()))?;

        Ok(Some(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: config.api_token.clone(),
        }))
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .http
            .request(method, format!("{}{path}", self.base_url))
            .header(reqwest::header::ACCEPT, "application/json");
        match &self.token {
            Some(token) => builder.bearer_auth(token.expose_secret()),
            None => builder,
        }
    }

    /// Sends `builder`; a 204 comes back as `Value::Null`.
    async fn send(&self, builder: RequestBuilder) -> Result<Value, GatewayError> {
        let response = builder.send().await.map_err(|error| {
            if error.is_timeout() {
                GatewayError::Timeout
            } else {
                GatewayError::Transport(error.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(event_name = "calendar.api_error", status = status.as_u16(), %body, "calendar API rejected request");
            return Err(GatewayError::Status { status: status.as_u16(), body });
        }
        if status == reqwest::StatusCode::NO_CONTENT {
            return Ok(Value::Null);
        }

        let text = response.text().await.map_err(|error| GatewayError::Transport(error.to_string()))?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|error| GatewayError::Decode(error.to_string()))
    }
}

fn window_params(window: Interval) -> [(&'static str, String); 2] {
    [("timeMin", window.start.to_rfc3339()), ("timeMax", window.end.to_rfc3339())]
}

fn decode<T: serde::de::DeserializeOwned>(raw: Value) -> Result<T, GatewayError> {
    serde_json::from_value(raw).map_err(|error| GatewayError::Decode(error.to_string()))
}

#[async_trait]
impl CalendarGateway for HttpCalendarGateway {
    async fn free_busy(&self, calendar_id: &str, window: Interval) -> Result<FreeBusyResponse, GatewayError> {
        debug!(event_name = "calendar.free_busy", %calendar_id, "querying free/busy");
        let request = self
            .request(Method::GET, "/calendar/free-busy")
            .query(&window_params(window))
            .query(&[("items[0].id", calendar_id)]);
        decode(self.send(request).await?)
    }

    async fn create_event(&self, calendar_id: &str, event: &EventDraft) -> Result<Value, GatewayError> {
        let mut body = serde_json::to_value(event).map_err(|error| GatewayError::Decode(error.to_string()))?;
        body["calendarId"] = json!(calendar_id);
        self.send(self.request(Method::POST, "/calendar/events").json(&body)).await
    }

    async fn update_event(
        &self,
        calendar_id: &str,
        event_id: &str,
        patch: &EventPatch,
    ) -> Result<Value, GatewayError> {
        let mut body = serde_json::to_value(patch).map_err(|error| GatewayError::Decode(error.to_string()))?;
        body["calendarId"] = json!(calendar_id);
        let path = format!("/calendar/events/{event_id}");
        self.send(self.request(Method::PUT, &path).json(&body)).await
    }

    async fn delete_event(&self, calendar_id: &str, event_id: &str) -> Result<(), GatewayError> {
        let path = format!("/calendar/events/{event_id}");
        let request = self.request(Method::DELETE, &path).query(&[("calendarId", calendar_id)]);
        self.send(request).await.map(|_| ())
    }

    async fn list_events(
        &self,
        calendar_id: &str,
        window: Interval,
        max_results: u32,
    ) -> Result<Vec<CalendarEvent>, GatewayError> {
        let request = self
            .request(Method::GET, "/calendar/events")
            .query(&[("calendarId", calendar_id)])
            .query(&window_params(window))
            .query(&[("maxResults", max_results.to_string()), ("singleEvents", "true".to_string())]);
        let raw = self.send(request).await?;
        if raw.is_null() {
            return Ok(Vec::new());
        }
        decode::<EventsPage>(raw).map(|page| page.items)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use axum::extract::{Path, Query, State};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{delete, get};
    use axum::{Json, Router};
    use chrono::{TimeZone, Utc};
    use concierge_core::config::CalendarConfig;
    use concierge_core::scheduling::{CalendarGateway, GatewayError};
    use concierge_core::slots::Interval;
    use serde_json::{json, Value};
    use tokio::sync::Mutex;

    use super::HttpCalendarGateway;

    #[derive(Clone, Default)]
    struct Recorded {
        queries: Arc<Mutex<Vec<HashMap<String, String>>>>,
        auth: Arc<Mutex<Vec<String>>>,
    }

    async fn free_busy(
        State(recorded): State<Recorded>,
        headers: HeaderMap,
        Query(query): Query<HashMap<String, String>>,
    ) -> Json<Value> {
        let auth = headers
            .get("authorization")
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        recorded.auth.lock().await.push(auth);
        recorded.queries.lock().await.push(query);
        Json(json!({
            "calendars": {
                "clinic@group.calendar.google.com": {
                    "busy": [{ "start": "2026-10-20T16:00:00Z", "end": "2026-10-20T16:30:00Z" }]
                }
            }
        }))
    }

    async fn events(State(recorded): State<Recorded>, Query(query): Query<HashMap<String, String>>) -> Json<Value> {
        recorded.queries.lock().await.push(query);
        Json(json!({
            "items": [{
                "id": "evt-1",
                "summary": "Haircut Appointment",
                "start": { "dateTime": "2026-10-20T16:00:00Z" },
                "end": { "dateTime": "2026-10-20T16:30:00Z" },
                "status": "confirmed"
            }]
        }))
    }

    async fn remove(Path(event_id): Path<String>) -> StatusCode {
        if event_id == "evt-1" {
            StatusCode::NO_CONTENT
        } else {
            StatusCode::NOT_FOUND
        }
    }

    async fn serve(recorded: Recorded) -> HttpCalendarGateway {
        let router = Router::new()
            .route("/calendar/free-busy", get(free_busy))
            .route("/calendar/events", get(events))
            .route("/calendar/events/{event_id}", delete(remove))
            .with_state(recorded);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let address = listener.local_addr().expect("address");
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });

        let config = CalendarConfig {
            base_url: Some(format!("http://{address}/")),
            api_token: Some("calendar-token".to_string().into()),
            business_id: "biz-1".to_string(),
            timeout_secs: 5,
        };
        HttpCalendarGateway::from_config(&config).expect("client").expect("configured")
    }

    fn window() -> Interval {
        Interval {
            start: Utc.with_ymd_and_hms(2026, 10, 20, 15, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2026, 10, 20, 23, 0, 0).unwrap(),
        }
    }

    #[test]
    fn missing_base_url_means_no_gateway() {
        let config = CalendarConfig {
            base_url: None,
            api_token: None,
            business_id: "biz-1".to_string(),
            timeout_secs: 5,
        };
        assert!(HttpCalendarGateway::from_config(&config).expect("config").is_none());
    }

    #[tokio::test]
    async fn free_busy_sends_window_and_calendar_item() {
        let recorded = Recorded::default();
        let gateway = serve(recorded.clone()).await;

        let response = gateway.free_busy("clinic@group.calendar.google.com", window()).await.expect("free busy");
        assert_eq!(response.busy_for("clinic@group.calendar.google.com").map(<[_]>::len), Some(1));

        let queries = recorded.queries.lock().await;
        assert_eq!(queries[0]["items[0].id"], "clinic@group.calendar.google.com");
        assert_eq!(queries[0]["timeMin"], "2026-10-20T15:00:00+00:00");
        assert_eq!(recorded.auth.lock().await[0], "Bearer calendar-token");
    }

    #[tokio::test]
    async fn lists_events_and_maps_delete_statuses() {
        let recorded = Recorded::default();
        let gateway = serve(recorded.clone()).await;

        let events = gateway.list_events("clinic", window(), 25).await.expect("events");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, "evt-1");
        {
            let queries = recorded.queries.lock().await;
            assert_eq!(queries[0]["maxResults"], "25");
            assert_eq!(queries[0]["singleEvents"], "true");
        }

        gateway.delete_event("clinic", "evt-1").await.expect("deleted");
        let missing = gateway.delete_event("clinic", "evt-404").await.expect_err("not found");
        assert!(matches!(missing, GatewayError::Status { status: 404, .. }));
    }
}
