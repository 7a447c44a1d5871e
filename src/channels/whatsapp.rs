//! WhatsApp channel: sends replies through the WhatsApp Cloud API.
//!
//! Inbound deliveries arrive on the webhook (see `webhook.rs`); this side
//! only posts to the Graph API `messages` endpoint.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};

use super::{ChoiceOption, MessagingChannel};
use crate::error::ChannelError;

const DEFAULT_API_BASE: &str = "https://graph.facebook.com/v20.0";

/// Cloud API limits.
const MAX_TEXT_LENGTH: usize = 4096;
const MAX_BODY_LENGTH: usize = 1024;
const MAX_REPLY_BUTTONS: usize = 3;
const MAX_BUTTON_TITLE: usize = 20;
const MAX_LIST_ROWS: usize = 10;
const MAX_ROW_TITLE: usize = 24;

/// Credentials and endpoint for the Cloud API.
#[derive(Debug, Clone)]
pub struct WhatsAppConfig {
    pub token: SecretString,
    pub phone_number_id: String,
    /// Shared secret echoed during the webhook verification handshake.
    pub verify_token: SecretString,
    pub api_base: String,
}

impl WhatsAppConfig {
    /// Read `WHATSAPP_TOKEN`, `WHATSAPP_PHONE_NUMBER_ID` and
    /// `WHATSAPP_VERIFY_TOKEN`. `None` if any is missing.
    pub fn from_env() -> Option<Self> {
        let token = std::env::var("WHATSAPP_TOKEN").ok()?;
        let phone_number_id = std::env::var("WHATSAPP_PHONE_NUMBER_ID").ok()?;
        let verify_token = std::env::var("WHATSAPP_VERIFY_TOKEN").ok()?;
        Some(Self {
            token: SecretString::from(token),
            phone_number_id,
            verify_token: SecretString::from(verify_token),
            api_base: std::env::var("WHATSAPP_API_BASE")
                .unwrap_or_else(|_| DEFAULT_API_BASE.to_string()),
        })
    }
}

/// WhatsApp channel: posts to the Cloud API.
pub struct WhatsAppChannel {
    config: WhatsAppConfig,
    client: reqwest::Client,
}

impl WhatsAppChannel {
    pub fn new(config: WhatsAppConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/{}/messages",
            self.config.api_base.trim_end_matches('/'),
            self.config.phone_number_id
        )
    }

    async fn post(&self, payload: &Value) -> Result<(), ChannelError> {
        let resp = self
            .client
            .post(self.messages_url())
            .bearer_auth(self.config.token.expose_secret())
            .json(payload)
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed {
                name: "whatsapp".into(),
                reason: e.to_string(),
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let err = resp.text().await.unwrap_or_default();
            return Err(ChannelError::SendFailed {
                name: "whatsapp".into(),
                reason: format!("messages returned {status}: {err}"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl MessagingChannel for WhatsAppChannel {
    fn name(&self) -> &str {
        "whatsapp"
    }

    async fn send_text(&self, actor_key: &str, text: &str) -> Result<(), ChannelError> {
        for chunk in split_message(text, MAX_TEXT_LENGTH) {
            self.post(&text_payload(actor_key, &chunk)).await?;
        }
        tracing::debug!(to = actor_key, "WhatsApp text sent");
        Ok(())
    }

    async fn send_choice(
        &self,
        actor_key: &str,
        text: &str,
        options: &[ChoiceOption],
    ) -> Result<(), ChannelError> {
        let payload = choice_payload(actor_key, text, options)?;
        self.post(&payload).await?;
        tracing::debug!(to = actor_key, options = options.len(), "WhatsApp choice sent");
        Ok(())
    }
}

fn text_payload(to: &str, text: &str) -> Value {
    json!({
        "messaging_product": "whatsapp",
        "to": to,
        "type": "text",
        "text": { "body": text },
    })
}

/// Reply buttons for up to three options, a list message above that.
fn choice_payload(to: &str, text: &str, options: &[ChoiceOption]) -> Result<Value, ChannelError> {
    if options.is_empty() {
        return Ok(text_payload(to, text));
    }
    if options.len() > MAX_LIST_ROWS {
        return Err(ChannelError::InvalidMessage(format!(
            "{} options exceed the {MAX_LIST_ROWS}-row list limit",
            options.len()
        )));
    }

    let body = truncate(text, MAX_BODY_LENGTH);
    let interactive = if options.len() <= MAX_REPLY_BUTTONS {
        let buttons: Vec<Value> = options
            .iter()
            .map(|o| {
                json!({
                    "type": "reply",
                    "reply": { "id": o.id, "title": truncate(&o.label, MAX_BUTTON_TITLE) },
                })
            })
            .collect();
        json!({
            "type": "button",
            "body": { "text": body },
            "action": { "buttons": buttons },
        })
    } else {
        let rows: Vec<Value> = options
            .iter()
            .map(|o| json!({ "id": o.id, "title": truncate(&o.label, MAX_ROW_TITLE) }))
            .collect();
        json!({
            "type": "list",
            "body": { "text": body },
            "action": {
                "button": "Choose",
                "sections": [{ "title": "Options", "rows": rows }],
            },
        })
    };

    Ok(json!({
        "messaging_product": "whatsapp",
        "to": to,
        "type": "interactive",
        "interactive": interactive,
    }))
}

/// Cut to at most `max` characters.
fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Split text into chunks of at most `max_len` bytes, preferring line and
/// word boundaries.
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }

        let mut boundary = max_len;
        while !remaining.is_char_boundary(boundary) {
            boundary -= 1;
        }
        let chunk = &remaining[..boundary];
        let split_at = chunk
            .rfind('\n')
            .or_else(|| chunk.rfind(' '))
            .filter(|&i| i > 0)
            .unwrap_or(boundary);

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(n: usize) -> Vec<ChoiceOption> {
        (0..n)
            .map(|i| ChoiceOption::new(format!("choice:{i}"), format!("Option {i}")))
            .collect()
    }

    #[test]
    fn text_payload_shape() {
        let payload = text_payload("27820000001", "hello");
        assert_eq!(payload["type"], "text");
        assert_eq!(payload["to"], "27820000001");
        assert_eq!(payload["text"]["body"], "hello");
    }

    #[test]
    fn few_options_become_reply_buttons() {
        let payload = choice_payload("2782", "Pick one", &options(2)).unwrap();
        assert_eq!(payload["interactive"]["type"], "button");
        let buttons = payload["interactive"]["action"]["buttons"].as_array().unwrap();
        assert_eq!(buttons.len(), 2);
        assert_eq!(buttons[1]["reply"]["id"], "choice:1");
    }

    #[test]
    fn many_options_become_a_list() {
        let payload = choice_payload("2782", "Pick one", &options(5)).unwrap();
        assert_eq!(payload["interactive"]["type"], "list");
        let rows = payload["interactive"]["action"]["sections"][0]["rows"]
            .as_array()
            .unwrap();
        assert_eq!(rows.len(), 5);
    }

    #[test]
    fn too_many_options_is_an_error() {
        assert!(choice_payload("2782", "Pick one", &options(11)).is_err());
    }

    #[test]
    fn button_titles_are_truncated() {
        let opts = vec![ChoiceOption::new("choice:x", "A very long button label indeed")];
        let payload = choice_payload("2782", "Pick", &opts).unwrap();
        let title = payload["interactive"]["action"]["buttons"][0]["reply"]["title"]
            .as_str()
            .unwrap();
        assert_eq!(title.chars().count(), MAX_BUTTON_TITLE);
    }

    #[test]
    fn split_prefers_word_boundaries() {
        let chunks = split_message("aaaa bbbb cccc", 9);
        assert_eq!(chunks, vec!["aaaa", "bbbb cccc"]);
    }

    #[test]
    fn split_respects_char_boundaries() {
        let text = "é".repeat(10);
        for chunk in split_message(&text, 5) {
            assert!(chunk.len() <= 5);
        }
    }

    #[test]
    fn messages_url_joins_base_and_number() {
        let channel = WhatsAppChannel::new(WhatsAppConfig {
            token: SecretString::from("t"),
            phone_number_id: "12345".into(),
            verify_token: SecretString::from("v"),
            api_base: "http://localhost:9999/".into(),
        });
        assert_eq!(channel.messages_url(), "http://localhost:9999/12345/messages");
    }
}
