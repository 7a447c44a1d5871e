//! Fire-and-forget notifications.
//!
//! Engine components enqueue a `Notification` after their state change is
//! committed; a separate delivery task renders it and sends it through the
//! messaging channel. Delivery failures are logged and go no further.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use super::{ChoiceOption, MessagingChannel, Reply};
use crate::dispatcher::ButtonAction;
use crate::tasks::TaskType;

/// Which message to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationTemplate {
    /// To the invited contact: `{token, from_name, client_name}`.
    InvitationReceived,
    /// To the inviter: `{contact, client_name}`.
    InvitationAccepted,
    /// To the contact who accepted: `{from_name}`.
    InvitationConnected,
    /// To the inviter: `{contact, client_name}`.
    InvitationDeclined,
    /// To an idle actor: `{task_type}`.
    TaskReminder,
    /// To an actor whose task was abandoned: `{task_type, resume_hours}`.
    TaskAbandoned,
}

/// A queued outbound notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub actor_key: String,
    pub template: NotificationTemplate,
    pub data: Value,
}

/// Enqueue side of the notification queue.
#[derive(Clone)]
pub struct Notifier {
    tx: mpsc::Sender<Notification>,
}

impl Notifier {
    /// Create a notifier and the receiver its delivery task drains.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Notification>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Queue a notification. Never fails the caller.
    pub async fn notify(&self, actor_key: &str, template: NotificationTemplate, data: Value) {
        let notification = Notification {
            actor_key: actor_key.to_string(),
            template,
            data,
        };
        if let Err(e) = self.tx.send(notification).await {
            tracing::error!(actor_key, ?template, "Failed to queue notification: {e}");
        }
    }
}

fn field<'a>(data: &'a Value, key: &str) -> Option<&'a str> {
    data.get(key).and_then(Value::as_str)
}

fn task_type_of(data: &Value) -> Option<TaskType> {
    field(data, "task_type").and_then(|s| s.parse().ok())
}

/// Render a notification to the reply the actor sees.
pub fn render(notification: &Notification) -> Reply {
    let data = &notification.data;
    match notification.template {
        NotificationTemplate::InvitationReceived => {
            let token = field(data, "token").unwrap_or_default();
            let from = field(data, "from_name").unwrap_or("A trainer");
            Reply::choice(
                format!("{from} has invited you to train with them. Would you like to accept?"),
                vec![
                    ChoiceOption::new(ButtonAction::AcceptInvitation(token.into()).to_string(), "Accept"),
                    ChoiceOption::new(ButtonAction::DeclineInvitation(token.into()).to_string(), "Decline"),
                ],
            )
        }
        NotificationTemplate::InvitationAccepted => {
            let who = field(data, "client_name")
                .or_else(|| field(data, "contact"))
                .unwrap_or("Your client");
            Reply::text(format!("{who} accepted your invitation. They're now your client."))
        }
        NotificationTemplate::InvitationConnected => {
            let from = field(data, "from_name").unwrap_or("your trainer");
            Reply::text(format!("You're now connected with {from}."))
        }
        NotificationTemplate::InvitationDeclined => {
            let who = field(data, "client_name")
                .or_else(|| field(data, "contact"))
                .unwrap_or("Your client");
            Reply::text(format!("{who} declined your invitation."))
        }
        NotificationTemplate::TaskReminder => match task_type_of(data) {
            Some(task_type) => Reply::choice(
                format!(
                    "You're partway through {}. Would you like to continue?",
                    task_type.label()
                ),
                vec![
                    ChoiceOption::new(ButtonAction::ContinueTask(task_type).to_string(), "Continue"),
                    ChoiceOption::new(ButtonAction::RestartTask(task_type).to_string(), "Start over"),
                ],
            ),
            None => Reply::text("You have an unfinished task. Reply to continue."),
        },
        NotificationTemplate::TaskAbandoned => {
            let label = task_type_of(data).map_or("your task", |t| t.label());
            let hours = data.get("resume_hours").and_then(Value::as_i64).unwrap_or(24);
            Reply::text(format!(
                "I've paused {label} since we haven't heard from you. Start it again within {hours} hours to pick up where you left off."
            ))
        }
    }
}

/// Spawn the delivery task: drain the queue and send each notification.
pub fn spawn_delivery(
    mut rx: mpsc::Receiver<Notification>,
    channel: Arc<dyn MessagingChannel>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(notification) = rx.recv().await {
            let reply = render(&notification);
            if let Err(e) = channel.send_reply(&notification.actor_key, &reply).await {
                tracing::warn!(
                    actor_key = %notification.actor_key,
                    template = ?notification.template,
                    channel = channel.name(),
                    "Notification delivery failed: {e}"
                );
            }
        }
        tracing::debug!("Notification queue closed");
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn notify_enqueues_in_order() {
        let (notifier, mut rx) = Notifier::channel(8);
        notifier
            .notify("2782", NotificationTemplate::TaskReminder, json!({"task_type": "registration"}))
            .await;
        notifier
            .notify("2782", NotificationTemplate::TaskAbandoned, json!({"task_type": "registration"}))
            .await;

        assert_eq!(rx.recv().await.unwrap().template, NotificationTemplate::TaskReminder);
        assert_eq!(rx.recv().await.unwrap().template, NotificationTemplate::TaskAbandoned);
    }

    #[tokio::test]
    async fn notify_after_receiver_dropped_does_not_panic() {
        let (notifier, rx) = Notifier::channel(1);
        drop(rx);
        notifier
            .notify("2782", NotificationTemplate::InvitationDeclined, json!({}))
            .await;
    }

    #[test]
    fn invitation_renders_accept_and_decline_buttons() {
        let reply = render(&Notification {
            actor_key: "2783".into(),
            template: NotificationTemplate::InvitationReceived,
            data: json!({"token": "abc123", "from_name": "Sipho"}),
        });
        match reply {
            Reply::Choice { text, options } => {
                assert!(text.starts_with("Sipho"));
                assert_eq!(options[0].id, "accept_invitation:abc123");
                assert_eq!(options[1].id, "decline_invitation:abc123");
            }
            Reply::Text(_) => panic!("expected choice"),
        }
    }

    #[test]
    fn reminder_renders_continue_and_restart() {
        let reply = render(&Notification {
            actor_key: "2782".into(),
            template: NotificationTemplate::TaskReminder,
            data: json!({"task_type": "add_client"}),
        });
        match reply {
            Reply::Choice { options, .. } => {
                assert_eq!(options[0].id, "continue_task:add_client");
                assert_eq!(options[1].id, "restart_task:add_client");
            }
            Reply::Text(_) => panic!("expected choice"),
        }
    }

    #[test]
    fn connected_names_the_trainer() {
        let reply = render(&Notification {
            actor_key: "2783".into(),
            template: NotificationTemplate::InvitationConnected,
            data: json!({"from_name": "Sipho"}),
        });
        assert_eq!(reply, Reply::text("You're now connected with Sipho."));

        let unnamed = render(&Notification {
            actor_key: "2783".into(),
            template: NotificationTemplate::InvitationConnected,
            data: json!({"from_name": null}),
        });
        assert_eq!(unnamed, Reply::text("You're now connected with your trainer."));
    }
}
