//! Typed text commands and the intent-detection seam.

use async_trait::async_trait;

use crate::tasks::TaskType;

/// What an idle actor can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start(TaskType),
    Help,
}

impl Command {
    /// Parse a typed command. Case and surrounding whitespace are ignored.
    pub fn parse(text: &str) -> Option<Self> {
        let normalized = text
            .trim()
            .trim_start_matches('/')
            .to_lowercase()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        match normalized.as_str() {
            "register" | "registration" | "sign up" | "signup" => {
                Some(Self::Start(TaskType::Registration))
            }
            "add client" | "add a client" | "new client" => Some(Self::Start(TaskType::AddClient)),
            "log habit" | "log habits" | "log" | "habit" => Some(Self::Start(TaskType::LogHabit)),
            "help" | "menu" | "hi" | "hello" | "start" => Some(Self::Help),
            _ => None,
        }
    }
}

/// Whether free text is a universal interrupt.
pub fn is_interrupt(text: &str) -> bool {
    matches!(
        text.trim().to_lowercase().as_str(),
        "cancel" | "stop" | "/cancel" | "/stop"
    )
}

/// Maps free text an idle actor sent to a command.
#[async_trait]
pub trait IntentService: Send + Sync {
    async fn propose(&self, actor_key: &str, text: &str) -> Option<Command>;
}

/// Intent service that never proposes anything.
#[derive(Debug, Default, Clone)]
pub struct NoIntent;

#[async_trait]
impl IntentService for NoIntent {
    async fn propose(&self, _actor_key: &str, _text: &str) -> Option<Command> {
        None
    }
}
