//! InvitationLedger: create, accept, decline, and expire invitations.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;

use super::model::{ClientDetails, CompletionMode, Invitation, InvitationStatus};
use crate::actors::{Actor, ActorRole};
use crate::channels::{NotificationTemplate, Notifier};
use crate::error::EngineError;
use crate::relationships::{ConnectionStatus, RelationshipGraph};
use crate::store::Database;

/// Outcome of accepting an invitation. Identical on every repeated accept.
#[derive(Debug, Clone, PartialEq)]
pub struct Acceptance {
    pub token: String,
    pub inviter_key: String,
    pub target_key: String,
    pub completion_mode: CompletionMode,
    pub details: ClientDetails,
    pub accepted_at: DateTime<Utc>,
}

impl Acceptance {
    fn of(invitation: &Invitation, accepted_at: DateTime<Utc>) -> Self {
        Self {
            token: invitation.token.clone(),
            inviter_key: invitation.from_key.clone(),
            target_key: invitation.to_contact.clone(),
            completion_mode: invitation.completion_mode,
            details: invitation.payload.clone(),
            accepted_at,
        }
    }

    /// Whether the invitee still has to fill in their own profile.
    pub fn needs_profile(&self) -> bool {
        self.completion_mode == CompletionMode::InviteeCompletesProfile
    }
}

/// Tracks invitations from trainers to contacts.
pub struct InvitationLedger {
    db: Arc<dyn Database>,
    graph: RelationshipGraph,
    notifier: Notifier,
    ttl: chrono::Duration,
}

impl InvitationLedger {
    pub fn new(
        db: Arc<dyn Database>,
        graph: RelationshipGraph,
        notifier: Notifier,
        ttl: chrono::Duration,
    ) -> Self {
        Self {
            db,
            graph,
            notifier,
            ttl,
        }
    }

    pub async fn get(&self, token: &str) -> Result<Invitation, EngineError> {
        self.db
            .get_invitation(token)
            .await?
            .ok_or_else(|| EngineError::not_found("invitation", token))
    }

    /// Record an invitation, propose the edge, and notify the contact.
    /// While an earlier invitation to the same contact is still open, that
    /// one is returned instead.
    pub async fn create(
        &self,
        from_key: &str,
        to_contact: &str,
        payload: ClientDetails,
        completion_mode: CompletionMode,
        now: DateTime<Utc>,
    ) -> Result<Invitation, EngineError> {
        if from_key == to_contact {
            return Err(EngineError::InvalidState(
                "an actor cannot invite themselves".into(),
            ));
        }

        // Checked before anything is written so a refused pair leaves no row.
        self.graph.ensure_proposable(from_key, to_contact).await?;
        if let Some(open) = self.db.find_open_invitation(from_key, to_contact, now).await? {
            tracing::info!(token = %open.token, from = from_key, to = to_contact, "Invitation already open");
            return Ok(open);
        }

        let invitation = Invitation::new(from_key, to_contact, payload, completion_mode, now, self.ttl);
        self.db.insert_invitation(&invitation).await?;
        self.graph
            .propose(from_key, to_contact, ActorRole::Initiator, now)
            .await?;

        tracing::info!(
            token = %invitation.token,
            from = from_key,
            to = to_contact,
            mode = %completion_mode,
            "Invitation created"
        );

        let from_name = self.db.get_actor(from_key).await?.map(|a| a.name);
        self.notifier
            .notify(
                to_contact,
                NotificationTemplate::InvitationReceived,
                json!({
                    "token": invitation.token,
                    "from_name": from_name,
                    "client_name": invitation.payload.name,
                }),
            )
            .await;
        Ok(invitation)
    }

    /// Accept an invitation. Repeating an accept returns the first result
    /// and writes nothing.
    pub async fn accept(&self, token: &str, now: DateTime<Utc>) -> Result<Acceptance, EngineError> {
        let invitation = self.get(token).await?;
        match invitation.status {
            InvitationStatus::Accepted => {
                let accepted_at = invitation.responded_at.unwrap_or(invitation.created_at);
                return Ok(Acceptance::of(&invitation, accepted_at));
            }
            InvitationStatus::Declined | InvitationStatus::Expired => {
                return Err(EngineError::InvalidState(format!(
                    "invitation {token} is already {}",
                    invitation.status
                )));
            }
            InvitationStatus::Pending | InvitationStatus::PendingTargetCompletion => {}
        }
        self.reject_if_expired(&invitation, now).await?;

        // Materialize and connect first; both are safe to repeat.
        let details = &invitation.payload;
        let mut actor = Actor::new(
            &invitation.to_contact,
            ActorRole::Target,
            details.name.clone().unwrap_or_else(|| invitation.to_contact.clone()),
        )
        .with_email(details.email.clone());
        if invitation.completion_mode == CompletionMode::InviteeCompletesProfile {
            actor = actor.incomplete();
        }
        actor.created_at = now;
        actor.updated_at = now;
        let created = self.db.insert_actor_if_absent(&actor).await?;

        let edge = self
            .graph
            .edge(&invitation.from_key, &invitation.to_contact)
            .await?;
        if matches!(
            edge.map(|e| e.connection_status),
            Some(ConnectionStatus::Declined | ConnectionStatus::Removed)
        ) {
            self.graph
                .propose(&invitation.from_key, &invitation.to_contact, ActorRole::Initiator, now)
                .await?;
        }
        self.graph
            .activate(&invitation.from_key, &invitation.to_contact, now)
            .await?;

        if !self
            .db
            .update_invitation_status(token, invitation.status, InvitationStatus::Accepted, now)
            .await?
        {
            // Someone else resolved it in between; report what they did.
            let current = self.get(token).await?;
            return match (current.status, current.responded_at) {
                (InvitationStatus::Accepted, Some(at)) => Ok(Acceptance::of(&current, at)),
                (status, _) => Err(EngineError::InvalidState(format!(
                    "invitation {token} is already {status}"
                ))),
            };
        }

        tracing::info!(
            token,
            inviter = %invitation.from_key,
            target = %invitation.to_contact,
            actor_created = created,
            "Invitation accepted"
        );

        let data = json!({
            "contact": invitation.to_contact,
            "client_name": invitation.payload.name,
        });
        self.notifier
            .notify(&invitation.from_key, NotificationTemplate::InvitationAccepted, data)
            .await;
        let from_name = self.db.get_actor(&invitation.from_key).await?.map(|a| a.name);
        self.notifier
            .notify(
                &invitation.to_contact,
                NotificationTemplate::InvitationConnected,
                json!({ "from_name": from_name }),
            )
            .await;
        Ok(Acceptance::of(&invitation, now))
    }

    /// Decline an invitation. Declining twice is a no-op.
    pub async fn decline(&self, token: &str, now: DateTime<Utc>) -> Result<Invitation, EngineError> {
        let invitation = self.get(token).await?;
        match invitation.status {
            InvitationStatus::Declined => return Ok(invitation),
            InvitationStatus::Accepted | InvitationStatus::Expired => {
                return Err(EngineError::InvalidState(format!(
                    "invitation {token} is already {}",
                    invitation.status
                )));
            }
            InvitationStatus::Pending | InvitationStatus::PendingTargetCompletion => {}
        }
        self.reject_if_expired(&invitation, now).await?;

        let edge = self
            .graph
            .edge(&invitation.from_key, &invitation.to_contact)
            .await?;
        if matches!(edge.map(|e| e.connection_status), Some(ConnectionStatus::Pending)) {
            self.graph
                .decline(&invitation.from_key, &invitation.to_contact, now)
                .await?;
        }

        if !self
            .db
            .update_invitation_status(token, invitation.status, InvitationStatus::Declined, now)
            .await?
        {
            let current = self.get(token).await?;
            return match current.status {
                InvitationStatus::Declined => Ok(current),
                status => Err(EngineError::InvalidState(format!(
                    "invitation {token} is already {status}"
                ))),
            };
        }

        tracing::info!(token, inviter = %invitation.from_key, "Invitation declined");
        self.notifier
            .notify(
                &invitation.from_key,
                NotificationTemplate::InvitationDeclined,
                json!({
                    "contact": invitation.to_contact,
                    "client_name": invitation.payload.name,
                }),
            )
            .await;

        Ok(Invitation {
            status: InvitationStatus::Declined,
            responded_at: Some(now),
            ..invitation
        })
    }

    /// Expire every pending invitation past its deadline.
    pub async fn expire_sweep(&self, now: DateTime<Utc>) -> Result<usize, EngineError> {
        let expired = self.db.expire_invitations(now).await?;
        if expired > 0 {
            tracing::info!(expired, "Expired overdue invitations");
        }
        Ok(expired)
    }

    /// A pending invitation past its deadline is expired on the spot.
    async fn reject_if_expired(
        &self,
        invitation: &Invitation,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        if !invitation.is_expired_at(now) {
            return Ok(());
        }
        self.db
            .update_invitation_status(
                &invitation.token,
                invitation.status,
                InvitationStatus::Expired,
                now,
            )
            .await?;
        Err(EngineError::InvalidState(format!(
            "invitation {} has expired",
            invitation.token
        )))
    }
}
