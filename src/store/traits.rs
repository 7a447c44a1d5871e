//! Unified `Database` trait: single async interface for all persistence.
//!
//! Task writes are conditional on the caller's `expected_version`; they
//! return `false` instead of writing when another writer got there first.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::actors::{Actor, ActorRole};
use crate::error::DatabaseError;
use crate::flows::habit_log::HabitLog;
use crate::invitations::model::{Invitation, InvitationStatus};
use crate::relationships::model::{ConnectionStatus, Edge};
use crate::tasks::{AbandonedSnapshot, Task, TaskStatus, TaskType};

/// Backend-agnostic database trait covering tasks, actors, edges, and invitations.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn init_schema(&self) -> Result<(), DatabaseError>;

    // ── Tasks ───────────────────────────────────────────────────────

    /// Insert a new task. Fails with `DatabaseError::Constraint` if the actor
    /// already has a running task.
    async fn insert_task(&self, task: &Task) -> Result<(), DatabaseError>;

    /// Get a task by ID.
    async fn get_task(&self, id: Uuid) -> Result<Option<Task>, DatabaseError>;

    /// Get the running task for an actor, if any.
    async fn get_running_task(
        &self,
        actor_key: &str,
        role: ActorRole,
    ) -> Result<Option<Task>, DatabaseError>;

    /// Replace step data, record activity, and clear the reminder flag.
    async fn update_task_data(
        &self,
        id: Uuid,
        expected_version: i64,
        step_data_json: &str,
        step: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, DatabaseError>;

    /// Record activity without changing step data or the reminder flag.
    async fn touch_task(
        &self,
        id: Uuid,
        expected_version: i64,
        now: DateTime<Utc>,
    ) -> Result<bool, DatabaseError>;

    /// Move a running task to a terminal status.
    async fn set_task_status(
        &self,
        id: Uuid,
        expected_version: i64,
        status: TaskStatus,
        now: DateTime<Utc>,
    ) -> Result<bool, DatabaseError>;

    /// Set `reminder_sent` without touching `last_activity_at`.
    async fn mark_task_reminded(
        &self,
        id: Uuid,
        expected_version: i64,
        now: DateTime<Utc>,
    ) -> Result<bool, DatabaseError>;

    /// Running tasks whose last activity is at or before `cutoff`.
    async fn list_idle_running_tasks(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Task>, DatabaseError>;

    /// Count running tasks for an actor (at most one when the invariant holds).
    async fn count_running_tasks(
        &self,
        actor_key: &str,
        role: ActorRole,
    ) -> Result<i64, DatabaseError>;

    // ── Abandoned snapshots ─────────────────────────────────────────

    /// Save (or replace) the resumable snapshot for `(actor_key, task_type)`.
    async fn save_abandoned_snapshot(
        &self,
        snapshot: &AbandonedSnapshot,
    ) -> Result<(), DatabaseError>;

    async fn get_abandoned_snapshot(
        &self,
        actor_key: &str,
        task_type: TaskType,
    ) -> Result<Option<AbandonedSnapshot>, DatabaseError>;

    async fn delete_abandoned_snapshot(
        &self,
        actor_key: &str,
        task_type: TaskType,
    ) -> Result<bool, DatabaseError>;

    // ── Actors ──────────────────────────────────────────────────────

    /// Insert or fully replace an actor record.
    async fn upsert_actor(&self, actor: &Actor) -> Result<(), DatabaseError>;

    /// Insert an actor only if no record with that key exists.
    /// Returns whether a row was written.
    async fn insert_actor_if_absent(&self, actor: &Actor) -> Result<bool, DatabaseError>;

    async fn get_actor(&self, actor_key: &str) -> Result<Option<Actor>, DatabaseError>;

    // ── Relationship edges ──────────────────────────────────────────

    async fn get_edge(
        &self,
        initiator_key: &str,
        target_key: &str,
    ) -> Result<Option<Edge>, DatabaseError>;

    /// Insert or update the edge for `(initiator_key, target_key)`.
    async fn upsert_edge(&self, edge: &Edge) -> Result<(), DatabaseError>;

    /// Edges pointing at a target, optionally filtered by status.
    async fn list_edges_for_target(
        &self,
        target_key: &str,
        status: Option<ConnectionStatus>,
    ) -> Result<Vec<Edge>, DatabaseError>;

    /// Edges from an initiator, optionally filtered by status.
    async fn list_edges_for_initiator(
        &self,
        initiator_key: &str,
        status: Option<ConnectionStatus>,
    ) -> Result<Vec<Edge>, DatabaseError>;

    async fn count_edges(&self) -> Result<i64, DatabaseError>;

    // ── Invitations ─────────────────────────────────────────────────

    async fn insert_invitation(&self, invitation: &Invitation) -> Result<(), DatabaseError>;

    async fn get_invitation(&self, token: &str) -> Result<Option<Invitation>, DatabaseError>;

    /// The newest unanswered, unexpired invitation between two actors.
    async fn find_open_invitation(
        &self,
        from_key: &str,
        to_contact: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Invitation>, DatabaseError>;

    /// Move an invitation from `from` to `to`. Returns false if its status
    /// was no longer `from`.
    async fn update_invitation_status(
        &self,
        token: &str,
        from: InvitationStatus,
        to: InvitationStatus,
        now: DateTime<Utc>,
    ) -> Result<bool, DatabaseError>;

    /// Expire pending invitations past `expires_at`. Returns the count.
    async fn expire_invitations(&self, now: DateTime<Utc>) -> Result<usize, DatabaseError>;

    // ── Habit logs & analytics ──────────────────────────────────────

    async fn insert_habit_log(&self, log: &HabitLog) -> Result<(), DatabaseError>;

    async fn list_habit_logs(&self, actor_key: &str) -> Result<Vec<HabitLog>, DatabaseError>;

    /// Append an analytics event.
    async fn record_event(
        &self,
        event: &str,
        actor_key: &str,
        data: &serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<(), DatabaseError>;

    /// List analytics events by name, oldest first.
    async fn list_events(&self, event: &str) -> Result<Vec<serde_json::Value>, DatabaseError>;
}
