//! Inbound webhook for WhatsApp Cloud API deliveries.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::InboundEvent;
use crate::actors::ActorRole;
use crate::dispatcher::Dispatcher;
use crate::store::Database;

/// Shared state for the webhook routes.
#[derive(Clone)]
pub struct WebhookState {
    pub dispatcher: Arc<Dispatcher>,
    pub db: Arc<dyn Database>,
    pub verify_token: SecretString,
}

// ── Cloud API payload ───────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    entry: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
struct Entry {
    #[serde(default)]
    changes: Vec<Change>,
}

#[derive(Debug, Deserialize)]
struct Change {
    #[serde(default)]
    value: ChangeValue,
}

#[derive(Debug, Default, Deserialize)]
struct ChangeValue {
    /// Absent on delivery-status callbacks.
    #[serde(default)]
    messages: Vec<WaMessage>,
}

#[derive(Debug, Deserialize)]
struct WaMessage {
    from: String,
    #[serde(rename = "type")]
    kind: String,
    text: Option<WaText>,
    interactive: Option<WaInteractive>,
    button: Option<WaButton>,
}

#[derive(Debug, Deserialize)]
struct WaText {
    body: String,
}

#[derive(Debug, Deserialize)]
struct WaInteractive {
    button_reply: Option<WaReply>,
    list_reply: Option<WaReply>,
}

#[derive(Debug, Deserialize)]
struct WaReply {
    id: String,
}

/// Quick-reply button on a template message.
#[derive(Debug, Deserialize)]
struct WaButton {
    payload: String,
}

/// Flatten a delivery into events, in order. Unsupported message types
/// (media, location, ...) are skipped.
pub fn parse_events(payload: &WebhookPayload) -> Vec<InboundEvent> {
    payload
        .entry
        .iter()
        .flat_map(|e| &e.changes)
        .flat_map(|c| &c.value.messages)
        .filter_map(|m| {
            let event = match m.kind.as_str() {
                "text" => m.text.as_ref().map(|t| InboundEvent::text(&m.from, &t.body)),
                "interactive" => m
                    .interactive
                    .as_ref()
                    .and_then(|i| i.button_reply.as_ref().or(i.list_reply.as_ref()))
                    .map(|r| InboundEvent::button(&m.from, &r.id)),
                "button" => m
                    .button
                    .as_ref()
                    .map(|b| InboundEvent::button(&m.from, &b.payload)),
                _ => None,
            };
            if event.is_none() {
                tracing::debug!(from = %m.from, kind = %m.kind, "Skipping unsupported message");
            }
            event
        })
        .collect()
}

// ── Handlers ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct VerifyParams {
    #[serde(rename = "hub.mode")]
    mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    challenge: Option<String>,
}

/// GET /webhook: subscription handshake.
async fn verify(
    State(state): State<WebhookState>,
    Query(params): Query<VerifyParams>,
) -> impl IntoResponse {
    let token_ok = params
        .verify_token
        .as_deref()
        .is_some_and(|t| t == state.verify_token.expose_secret());
    match (params.mode.as_deref(), token_ok, params.challenge) {
        (Some("subscribe"), true, Some(challenge)) => (StatusCode::OK, challenge).into_response(),
        _ => {
            tracing::warn!("Webhook verification rejected");
            StatusCode::FORBIDDEN.into_response()
        }
    }
}

/// POST /webhook: acknowledge at once, dispatch in the background.
async fn receive(
    State(state): State<WebhookState>,
    Json(payload): Json<WebhookPayload>,
) -> impl IntoResponse {
    let events = parse_events(&payload);
    if !events.is_empty() {
        tokio::spawn(async move {
            for event in events {
                let role = resolve_role(state.db.as_ref(), &event.actor_key).await;
                state.dispatcher.handle_event(role, event).await;
            }
        });
    }
    StatusCode::OK
}

/// Role of a sender, from the actor directory. Unknown numbers are
/// treated as trainers.
async fn resolve_role(db: &dyn Database, actor_key: &str) -> ActorRole {
    match db.get_actor(actor_key).await {
        Ok(Some(actor)) => actor.role,
        Ok(None) => ActorRole::Initiator,
        Err(e) => {
            tracing::error!(actor_key, "Failed to look up actor role: {e}");
            ActorRole::Initiator
        }
    }
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Build the webhook routes.
pub fn webhook_routes(state: WebhookState) -> Router {
    Router::new()
        .route("/webhook", get(verify).post(receive))
        .route("/health", get(health))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::json;
    use tower::ServiceExt;

    use super::*;
    use crate::channels::{ChoiceOption, EventKind, MessagingChannel, Notifier};
    use crate::config::{EngineConfig, to_chrono};
    use crate::error::ChannelError;
    use crate::invitations::InvitationLedger;
    use crate::relationships::RelationshipGraph;
    use crate::store::LibSqlBackend;
    use crate::tasks::{ActorLocks, TaskType};

    struct NullChannel;

    #[async_trait]
    impl MessagingChannel for NullChannel {
        fn name(&self) -> &str {
            "null"
        }

        async fn send_text(&self, _actor_key: &str, _text: &str) -> Result<(), ChannelError> {
            Ok(())
        }

        async fn send_choice(
            &self,
            _actor_key: &str,
            _text: &str,
            _options: &[ChoiceOption],
        ) -> Result<(), ChannelError> {
            Ok(())
        }
    }

    async fn state() -> WebhookState {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let config = EngineConfig::default();
        let (notifier, _rx) = Notifier::channel(16);
        let ledger = Arc::new(InvitationLedger::new(
            Arc::clone(&db),
            RelationshipGraph::new(Arc::clone(&db)),
            notifier,
            to_chrono(config.invitation_ttl),
        ));
        let dispatcher = Dispatcher::new(
            Arc::clone(&db),
            ledger,
            ActorLocks::new(),
            Arc::new(NullChannel),
            config,
        );
        WebhookState {
            dispatcher: Arc::new(dispatcher),
            db,
            verify_token: SecretString::from("s3cret"),
        }
    }

    fn delivery(messages: serde_json::Value) -> serde_json::Value {
        json!({
            "object": "whatsapp_business_account",
            "entry": [{ "id": "1", "changes": [{ "field": "messages", "value": {
                "messaging_product": "whatsapp",
                "messages": messages,
            }}]}]
        })
    }

    #[test]
    fn parses_text_and_button_replies() {
        let payload: WebhookPayload = serde_json::from_value(delivery(json!([
            { "from": "27820000001", "id": "a", "type": "text", "text": { "body": "register" } },
            { "from": "27820000001", "id": "b", "type": "interactive",
              "interactive": { "type": "button_reply", "button_reply": { "id": "choice:yes", "title": "Yes" } } },
            { "from": "27820000001", "id": "c", "type": "image", "image": { "id": "x" } },
        ])))
        .unwrap();

        let events = parse_events(&payload);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], InboundEvent::text("27820000001", "register"));
        assert_eq!(
            events[1].kind,
            EventKind::Button {
                button_id: "choice:yes".into()
            }
        );
    }

    #[test]
    fn status_callbacks_carry_no_events() {
        let payload: WebhookPayload = serde_json::from_value(json!({
            "entry": [{ "changes": [{ "value": { "statuses": [{ "id": "x", "status": "read" }] } }] }]
        }))
        .unwrap();
        assert!(parse_events(&payload).is_empty());
    }

    #[tokio::test]
    async fn verification_echoes_challenge() {
        let app = webhook_routes(state().await);
        let resp = app
            .oneshot(
                Request::get("/webhook?hub.mode=subscribe&hub.verify_token=s3cret&hub.challenge=42")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = axum::body::to_bytes(resp.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"42");
    }

    #[tokio::test]
    async fn verification_rejects_wrong_token() {
        let app = webhook_routes(state().await);
        let resp = app
            .oneshot(
                Request::get("/webhook?hub.mode=subscribe&hub.verify_token=nope&hub.challenge=42")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn health_is_ok() {
        let app = webhook_routes(state().await);
        let resp = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn delivery_starts_a_task() {
        let state = state().await;
        let db = Arc::clone(&state.db);
        let app = webhook_routes(state);

        let body = delivery(json!([
            { "from": "27820000001", "id": "a", "type": "text", "text": { "body": "register" } }
        ]));
        let resp = app
            .oneshot(
                Request::post("/webhook")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let mut running = None;
        for _ in 0..100 {
            running = db
                .get_running_task("27820000001", ActorRole::Initiator)
                .await
                .unwrap();
            if running.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(running.unwrap().task_type, TaskType::Registration);
    }
}
