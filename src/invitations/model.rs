//! Invitation data model.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::{Deserialize, Serialize};

/// Length of generated invitation tokens.
const TOKEN_LEN: usize = 32;

/// Lifecycle of an invitation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvitationStatus {
    Pending,
    PendingTargetCompletion,
    Accepted,
    Declined,
    Expired,
}

impl InvitationStatus {
    /// Still waiting on the invitee.
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending | Self::PendingTargetCompletion)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::PendingTargetCompletion => "pending_target_completion",
            Self::Accepted => "accepted",
            Self::Declined => "declined",
            Self::Expired => "expired",
        }
    }
}

impl std::fmt::Display for InvitationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvitationStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "pending_target_completion" => Ok(Self::PendingTargetCompletion),
            "accepted" => Ok(Self::Accepted),
            "declined" => Ok(Self::Declined),
            "expired" => Ok(Self::Expired),
            other => Err(format!("unknown invitation status: {other}")),
        }
    }
}

/// Who provides the invitee's profile data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionMode {
    /// The trainer typed the client's details; accepting applies them.
    InviterSuppliesData,
    /// The client fills in their own profile after accepting.
    InviteeCompletesProfile,
}

impl CompletionMode {
    /// Status a new invitation starts in.
    pub fn initial_status(&self) -> InvitationStatus {
        match self {
            Self::InviterSuppliesData => InvitationStatus::Pending,
            Self::InviteeCompletesProfile => InvitationStatus::PendingTargetCompletion,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InviterSuppliesData => "inviter_supplies_data",
            Self::InviteeCompletesProfile => "invitee_completes_profile",
        }
    }
}

impl std::fmt::Display for CompletionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CompletionMode {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inviter_supplies_data" => Ok(Self::InviterSuppliesData),
            "invitee_completes_profile" => Ok(Self::InviteeCompletesProfile),
            other => Err(format!("unknown completion mode: {other}")),
        }
    }
}

/// Snapshot of client details captured when the invitation was created.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// An offer from a trainer to a contact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invitation {
    pub token: String,
    pub from_key: String,
    pub to_contact: String,
    pub status: InvitationStatus,
    pub completion_mode: CompletionMode,
    pub payload: ClientDetails,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responded_at: Option<DateTime<Utc>>,
}

impl Invitation {
    pub fn new(
        from_key: impl Into<String>,
        to_contact: impl Into<String>,
        payload: ClientDetails,
        completion_mode: CompletionMode,
        now: DateTime<Utc>,
        ttl: chrono::Duration,
    ) -> Self {
        Self {
            token: generate_token(),
            from_key: from_key.into(),
            to_contact: to_contact.into(),
            status: completion_mode.initial_status(),
            completion_mode,
            payload,
            created_at: now,
            expires_at: now + ttl,
            responded_at: None,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Unguessable alphanumeric token.
pub fn generate_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LEN)
        .map(char::from)
        .collect()
}
