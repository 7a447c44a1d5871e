//! Channel abstraction for message I/O.

pub mod notify;
pub mod webhook;
pub mod whatsapp;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ChannelError;

pub use notify::{Notification, NotificationTemplate, Notifier, spawn_delivery};
pub use webhook::{WebhookState, webhook_routes};
pub use whatsapp::{WhatsAppChannel, WhatsAppConfig};

/// What the actor sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventKind {
    /// Free-text message.
    Text { text: String },
    /// Button tap carrying a structured `action:target` id.
    Button { button_id: String },
}

/// An inbound message delivered by the channel webhook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundEvent {
    pub actor_key: String,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl InboundEvent {
    pub fn text(actor_key: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            actor_key: actor_key.into(),
            kind: EventKind::Text { text: text.into() },
        }
    }

    pub fn button(actor_key: impl Into<String>, button_id: impl Into<String>) -> Self {
        Self {
            actor_key: actor_key.into(),
            kind: EventKind::Button {
                button_id: button_id.into(),
            },
        }
    }
}

/// One tappable option in a choice message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceOption {
    pub id: String,
    pub label: String,
}

impl ChoiceOption {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
        }
    }
}

/// A message to send back to an actor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Text(String),
    Choice {
        text: String,
        options: Vec<ChoiceOption>,
    },
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    pub fn choice(text: impl Into<String>, options: Vec<ChoiceOption>) -> Self {
        Self::Choice {
            text: text.into(),
            options,
        }
    }

    /// Prepend a line (e.g. a validation message) to the reply text.
    pub fn prefixed(self, prefix: &str) -> Self {
        match self {
            Self::Text(text) => Self::Text(format!("{prefix}\n\n{text}")),
            Self::Choice { text, options } => Self::Choice {
                text: format!("{prefix}\n\n{text}"),
                options,
            },
        }
    }

    pub fn body(&self) -> &str {
        match self {
            Self::Text(text) | Self::Choice { text, .. } => text,
        }
    }
}

/// Outbound side of a messaging channel.
#[async_trait]
pub trait MessagingChannel: Send + Sync {
    /// Channel name, for logs.
    fn name(&self) -> &str;

    /// Send a plain text message.
    async fn send_text(&self, actor_key: &str, text: &str) -> Result<(), ChannelError>;

    /// Send a message with tappable options.
    async fn send_choice(
        &self,
        actor_key: &str,
        text: &str,
        options: &[ChoiceOption],
    ) -> Result<(), ChannelError>;

    /// Send a `Reply`, picking text or choice.
    async fn send_reply(&self, actor_key: &str, reply: &Reply) -> Result<(), ChannelError> {
        match reply {
            Reply::Text(text) => self.send_text(actor_key, text).await,
            Reply::Choice { text, options } => self.send_choice(actor_key, text, options).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inbound_event_json_shape() {
        let event = InboundEvent::button("2782", "accept_invitation:abc");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["actor_key"], "2782");
        assert_eq!(json["kind"], "button");
        assert_eq!(json["button_id"], "accept_invitation:abc");

        let parsed: InboundEvent = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn prefixed_keeps_options() {
        let reply = Reply::choice("Confirm?", vec![ChoiceOption::new("choice:yes", "Yes")])
            .prefixed("That didn't look right.");
        assert_eq!(reply.body(), "That didn't look right.\n\nConfirm?");
        match reply {
            Reply::Choice { options, .. } => assert_eq!(options.len(), 1),
            Reply::Text(_) => panic!("expected choice"),
        }
    }
}
