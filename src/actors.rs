//! Actors: trainers (initiators) and clients (targets), keyed by phone number.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which side of a trainer/client relationship an actor is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    /// A trainer: adds clients and sends invitations.
    Initiator,
    /// A client: receives invitations and logs habits.
    Target,
}

impl ActorRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initiator => "initiator",
            Self::Target => "target",
        }
    }
}

impl std::fmt::Display for ActorRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActorRole {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "initiator" => Ok(Self::Initiator),
            "target" => Ok(Self::Target),
            other => Err(format!("unknown actor role: {other}")),
        }
    }
}

/// A stored contact record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Actor {
    pub actor_key: String,
    pub role: ActorRole,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business_name: Option<String>,
    /// False while an invited client still has to finish their own profile.
    pub profile_complete: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Actor {
    pub fn new(actor_key: impl Into<String>, role: ActorRole, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            actor_key: actor_key.into(),
            role,
            name: name.into(),
            email: None,
            business_name: None,
            profile_complete: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_email(mut self, email: Option<String>) -> Self {
        self.email = email;
        self
    }

    pub fn with_business_name(mut self, business_name: Option<String>) -> Self {
        self.business_name = business_name;
        self
    }

    pub fn incomplete(mut self) -> Self {
        self.profile_complete = false;
        self
    }
}
