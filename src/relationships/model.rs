//! Relationship edges between trainers and clients, and the classifier output.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::actors::ActorRole;

/// Status of a trainer/client edge. Edges are never hard-deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Pending,
    Active,
    Declined,
    Removed,
}

impl ConnectionStatus {
    /// Check if a transition from `self` to `target` is valid.
    ///
    /// Forward-only, except that a declined or removed edge may be proposed
    /// again (re-invitation).
    pub fn can_transition_to(&self, target: ConnectionStatus) -> bool {
        use ConnectionStatus::*;
        matches!(
            (self, target),
            (Pending, Active)
                | (Pending, Declined)
                | (Active, Removed)
                | (Declined, Pending)
                | (Removed, Pending)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Declined => "declined",
            Self::Removed => "removed",
        }
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConnectionStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "active" => Ok(Self::Active),
            "declined" => Ok(Self::Declined),
            "removed" => Ok(Self::Removed),
            other => Err(format!("unknown connection status: {other}")),
        }
    }
}

/// A relationship record between one initiator and one target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub initiator_key: String,
    pub target_key: String,
    pub connection_status: ConnectionStatus,
    /// Which side proposed the connection.
    pub invited_by: ActorRole,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Edge {
    pub fn new(
        initiator_key: impl Into<String>,
        target_key: impl Into<String>,
        connection_status: ConnectionStatus,
        invited_by: ActorRole,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            initiator_key: initiator_key.into(),
            target_key: target_key.into(),
            connection_status,
            invited_by,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Relationship between an initiator and a target contact, as seen at
/// classification time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Scenario {
    /// No record of the target contact exists.
    New,
    /// The target exists but has no active edge to any initiator.
    Available,
    /// An active edge already links this initiator and target.
    AlreadyConnected,
    /// The target has an active edge to a different initiator.
    ConnectedElsewhere,
}

impl std::fmt::Display for Scenario {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::New => "NEW",
            Self::Available => "AVAILABLE",
            Self::AlreadyConnected => "ALREADY_CONNECTED",
            Self::ConnectedElsewhere => "CONNECTED_ELSEWHERE",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_transitions() {
        use ConnectionStatus::*;
        assert!(Pending.can_transition_to(Active));
        assert!(Pending.can_transition_to(Declined));
        assert!(Active.can_transition_to(Removed));
        assert!(Declined.can_transition_to(Pending));
        assert!(Removed.can_transition_to(Pending));
    }

    #[test]
    fn invalid_transitions() {
        use ConnectionStatus::*;
        assert!(!Active.can_transition_to(Pending));
        assert!(!Active.can_transition_to(Declined));
        assert!(!Declined.can_transition_to(Active));
        assert!(!Removed.can_transition_to(Active));
        assert!(!Pending.can_transition_to(Removed));
        assert!(!Active.can_transition_to(Active));
    }

    #[test]
    fn scenario_display_matches_serde() {
        for scenario in [
            Scenario::New,
            Scenario::Available,
            Scenario::AlreadyConnected,
            Scenario::ConnectedElsewhere,
        ] {
            let json = serde_json::to_string(&scenario).unwrap();
            assert_eq!(format!("\"{scenario}\""), json);
        }
    }
}
