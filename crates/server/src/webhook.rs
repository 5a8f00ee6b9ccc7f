use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use secrecy::SecretString;
use serde::Serialize;
use tracing::{info, warn};

use concierge_whatsapp::{
    classify, verify_subscription, MessageQueue, MessageTask, VerifyQuery, WebhookEvent, WebhookPayload,
};

pub const QUEUED_MESSAGE: &str = "Webhook received and queued for processing";
pub const NON_MESSAGE_MESSAGE: &str = "Non-message event processed";
pub const MISSING_ID_MESSAGE: &str = "Missing message ID";
pub const QUEUE_FAILED_MESSAGE: &str = "Webhook received but failed to queue for processing";

#[derive(Clone)]
pub struct WebhookState {
    pub verify_token: SecretString,
    pub queue: MessageQueue,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct WebhookAck {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WebhookAck {
    fn accepted(message: &str, webhook_id: Option<String>) -> Self {
        Self { success: true, message: Some(message.to_string()), webhook_id, error: None }
    }

    fn rejected(message: &str) -> Self {
        Self { success: false, message: Some(message.to_string()), webhook_id: None, error: None }
    }

    fn not_queued() -> Self {
        Self { success: false, message: None, webhook_id: None, error: Some(QUEUE_FAILED_MESSAGE.to_string()) }
    }
}

pub fn router(state: WebhookState) -> Router {
    Router::new().route("/webhook", get(verify).post(receive)).with_state(state)
}

pub async fn verify(State(state): State<WebhookState>, Query(query): Query<VerifyQuery>) -> Response {
    match verify_subscription(&query, &state.verify_token) {
        Ok(challenge) => {
            info!(event_name = "webhook.verified", "webhook subscription verified");
            (StatusCode::OK, challenge).into_response()
        }
        Err(error) => {
            warn!(event_name = "webhook.verify_rejected", mode = ?query.mode, "webhook verification failed");
            (StatusCode::FORBIDDEN, error.to_string()).into_response()
        }
    }
}

/// Always answers fast: processing happens on the queue worker. Meta retries any
/// non-2xx, so queue trouble is still reported with a 200.
pub async fn receive(State(state): State<WebhookState>, body: Bytes) -> (StatusCode, Json<WebhookAck>) {
    let event = serde_json::from_slice::<WebhookPayload>(&body)
        .map_err(|error| error.to_string())
        .and_then(|payload| classify(&payload).map_err(|error| error.to_string()));

    let message = match event {
        Ok(WebhookEvent::Message(message)) => message,
        Ok(WebhookEvent::NonMessage { field }) => {
            info!(event_name = "webhook.non_message", %field, "ignoring non-message change");
            return (StatusCode::OK, Json(WebhookAck::accepted(NON_MESSAGE_MESSAGE, None)));
        }
        Ok(WebhookEvent::MissingMessageId) => {
            warn!(event_name = "webhook.missing_message_id", "message change without an id");
            return (StatusCode::BAD_REQUEST, Json(WebhookAck::rejected(MISSING_ID_MESSAGE)));
        }
        Err(error) => {
            warn!(event_name = "webhook.malformed", error = %error, "could not read webhook payload");
            return (StatusCode::OK, Json(WebhookAck::not_queued()));
        }
    };

    let message_id = message.id.clone();
    match state.queue.enqueue(MessageTask::new(message)) {
        Ok(()) => {
            info!(event_name = "webhook.queued", correlation_id = %message_id, "message queued");
            (StatusCode::OK, Json(WebhookAck::accepted(QUEUED_MESSAGE, Some(message_id))))
        }
        Err(error) => {
            warn!(event_name = "webhook.queue_failed", correlation_id = %message_id, error = %error, "message not queued");
            (StatusCode::OK, Json(WebhookAck::not_queued()))
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use secrecy::SecretString;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use concierge_whatsapp::MessageQueue;

    use super::{router, WebhookState, MISSING_ID_MESSAGE, QUEUED_MESSAGE, QUEUE_FAILED_MESSAGE};

    fn state(capacity: usize) -> (WebhookState, tokio::sync::mpsc::Receiver<concierge_whatsapp::MessageTask>) {
        let (queue, receiver) = MessageQueue::bounded(capacity);
        (WebhookState { verify_token: SecretString::from("s3cret".to_string()), queue }, receiver)
    }

    fn message_payload(id: Value) -> Value {
        json!({
            "object": "whatsapp_business_account",
            "entry": [{ "id": "1", "changes": [{
                "field": "messages",
                "value": {
                    "metadata": { "display_phone_number": "15550001111", "phone_number_id": "109876543210" },
                    "contacts": [{ "profile": { "name": "Ana" }, "wa_id": "5215512345678" }],
                    "messages": [{ "id": id, "from": "5215512345678", "timestamp": "1792166400",
                                   "type": "text", "text": { "body": "hola" } }]
                }
            }]}]
        })
    }

    async fn post(state: WebhookState, body: Value) -> (StatusCode, Value) {
        let response = router(state)
            .oneshot(
                Request::post("/webhook")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .expect("request"),
            )
            .await
            .expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        (status, serde_json::from_slice(&bytes).expect("json"))
    }

    #[tokio::test]
    async fn handshake_echoes_challenge_or_forbids() {
        let (state, _receiver) = state(4);
        let ok = router(state.clone())
            .oneshot(
                Request::get("/webhook?hub.mode=subscribe&hub.verify_token=s3cret&hub.challenge=1158201444")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(ok.status(), StatusCode::OK);
        assert_eq!(to_bytes(ok.into_body(), usize::MAX).await.expect("body"), "1158201444");

        let forbidden = router(state)
            .oneshot(
                Request::get("/webhook?hub.mode=subscribe&hub.verify_token=wrong&hub.challenge=1")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);
        assert_eq!(to_bytes(forbidden.into_body(), usize::MAX).await.expect("body"), "Invalid verify token");
    }

    #[tokio::test]
    async fn text_message_is_queued_with_its_id() {
        let (state, mut receiver) = state(4);

        let (status, body) = post(state, message_payload(json!("wamid.HBgM"))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "success": true, "message": QUEUED_MESSAGE, "webhook_id": "wamid.HBgM" }));
        let queued = receiver.try_recv().expect("queued task");
        assert_eq!(queued.message.from, "525512345678");
    }

    #[tokio::test]
    async fn missing_id_is_a_bad_request_and_status_updates_are_accepted() {
        let (state, mut receiver) = state(4);

        let (status, body) = post(state.clone(), message_payload(Value::Null)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], MISSING_ID_MESSAGE);

        let (status, body) = post(
            state,
            json!({ "object": "whatsapp_business_account",
                    "entry": [{ "id": "1", "changes": [{ "field": "message_template_status_update", "value": {} }] }] }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert!(receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn full_queue_still_answers_ok() {
        let (state, _receiver) = state(1);

        let (_, first) = post(state.clone(), message_payload(json!("wamid.1"))).await;
        assert_eq!(first["success"], true);

        let (status, second) = post(state, message_payload(json!("wamid.2"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(second, json!({ "success": false, "error": QUEUE_FAILED_MESSAGE }));
    }
}
