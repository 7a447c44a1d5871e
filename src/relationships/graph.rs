//! RelationshipGraph: edge writes and the read-only scenario classifier.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::model::{ConnectionStatus, Edge, Scenario};
use crate::actors::ActorRole;
use crate::error::EngineError;
use crate::store::Database;

/// Edge store between initiators and targets.
#[derive(Clone)]
pub struct RelationshipGraph {
    db: Arc<dyn Database>,
}

impl RelationshipGraph {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    /// Classify how `target_contact` relates to `initiator_key`.
    ///
    /// Computed fresh from the store on every call; never writes.
    pub async fn classify(
        &self,
        initiator_key: &str,
        target_contact: &str,
    ) -> Result<Scenario, EngineError> {
        if self.db.get_actor(target_contact).await?.is_none() {
            return Ok(Scenario::New);
        }
        let active = self
            .db
            .list_edges_for_target(target_contact, Some(ConnectionStatus::Active))
            .await?;
        Ok(match active.as_slice() {
            [] => Scenario::Available,
            [only] if only.initiator_key == initiator_key => Scenario::AlreadyConnected,
            _ => Scenario::ConnectedElsewhere,
        })
    }

    pub async fn edge(
        &self,
        initiator_key: &str,
        target_key: &str,
    ) -> Result<Option<Edge>, EngineError> {
        Ok(self.db.get_edge(initiator_key, target_key).await?)
    }

    /// All edges pointing at a target, any status.
    pub async fn edges_for_target(&self, target_key: &str) -> Result<Vec<Edge>, EngineError> {
        Ok(self.db.list_edges_for_target(target_key, None).await?)
    }

    /// Check, without writing, that `propose` would succeed.
    pub async fn ensure_proposable(
        &self,
        initiator_key: &str,
        target_key: &str,
    ) -> Result<(), EngineError> {
        self.ensure_no_reverse(initiator_key, target_key).await?;
        match self.db.get_edge(initiator_key, target_key).await? {
            Some(edge)
                if edge.connection_status != ConnectionStatus::Pending
                    && !edge.connection_status.can_transition_to(ConnectionStatus::Pending) =>
            {
                Err(EngineError::InvalidState(format!(
                    "edge {initiator_key}->{target_key} is already {}",
                    edge.connection_status
                )))
            }
            _ => Ok(()),
        }
    }

    /// Create a pending edge, or reopen a declined/removed one.
    pub async fn propose(
        &self,
        initiator_key: &str,
        target_key: &str,
        invited_by: ActorRole,
        now: DateTime<Utc>,
    ) -> Result<Edge, EngineError> {
        self.ensure_no_reverse(initiator_key, target_key).await?;
        match self.db.get_edge(initiator_key, target_key).await? {
            None => {
                let edge = Edge::new(
                    initiator_key,
                    target_key,
                    ConnectionStatus::Pending,
                    invited_by,
                    now,
                );
                self.db.upsert_edge(&edge).await?;
                Ok(edge)
            }
            Some(mut edge) => {
                edge.invited_by = invited_by;
                self.set_status(edge, ConnectionStatus::Pending, now).await
            }
        }
    }

    /// Mark an edge active. Creates it when no proposal was recorded.
    pub async fn activate(
        &self,
        initiator_key: &str,
        target_key: &str,
        now: DateTime<Utc>,
    ) -> Result<Edge, EngineError> {
        self.ensure_no_reverse(initiator_key, target_key).await?;
        match self.db.get_edge(initiator_key, target_key).await? {
            None => {
                let edge = Edge::new(
                    initiator_key,
                    target_key,
                    ConnectionStatus::Active,
                    ActorRole::Initiator,
                    now,
                );
                self.db.upsert_edge(&edge).await?;
                Ok(edge)
            }
            Some(edge) => self.set_status(edge, ConnectionStatus::Active, now).await,
        }
    }

    pub async fn decline(
        &self,
        initiator_key: &str,
        target_key: &str,
        now: DateTime<Utc>,
    ) -> Result<Edge, EngineError> {
        let edge = self.require(initiator_key, target_key).await?;
        self.set_status(edge, ConnectionStatus::Declined, now).await
    }

    pub async fn remove(
        &self,
        initiator_key: &str,
        target_key: &str,
        now: DateTime<Utc>,
    ) -> Result<Edge, EngineError> {
        let edge = self.require(initiator_key, target_key).await?;
        self.set_status(edge, ConnectionStatus::Removed, now).await
    }

    /// A pair of actors shares at most one edge, whichever way it points.
    async fn ensure_no_reverse(&self, initiator_key: &str, target_key: &str) -> Result<(), EngineError> {
        match self.db.get_edge(target_key, initiator_key).await? {
            Some(reverse) if initiator_key != target_key => Err(EngineError::InvalidState(format!(
                "{initiator_key} and {target_key} are already linked by edge {target_key}->{initiator_key} ({})",
                reverse.connection_status
            ))),
            _ => Ok(()),
        }
    }

    async fn require(&self, initiator_key: &str, target_key: &str) -> Result<Edge, EngineError> {
        self.db
            .get_edge(initiator_key, target_key)
            .await?
            .ok_or_else(|| EngineError::not_found("edge", format!("{initiator_key}->{target_key}")))
    }

    /// Apply a status change. Same-status writes are no-ops.
    async fn set_status(
        &self,
        mut edge: Edge,
        to: ConnectionStatus,
        now: DateTime<Utc>,
    ) -> Result<Edge, EngineError> {
        if edge.connection_status == to {
            return Ok(edge);
        }
        if !edge.connection_status.can_transition_to(to) {
            return Err(EngineError::InvalidState(format!(
                "edge {}->{} cannot go from {} to {to}",
                edge.initiator_key, edge.target_key, edge.connection_status
            )));
        }
        let from = edge.connection_status;
        edge.connection_status = to;
        edge.updated_at = now;
        self.db.upsert_edge(&edge).await?;

        tracing::info!(
            initiator = %edge.initiator_key,
            target = %edge.target_key,
            %from,
            %to,
            "Edge status changed"
        );
        Ok(edge)
    }
}
