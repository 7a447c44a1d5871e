//! TaskStore: the engine's view of the `tasks` table.
//!
//! Every write is conditional on the version the caller read, so a writer
//! holding a stale copy gets `ConcurrentModification` instead of clobbering.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::model::{Task, TaskStatus, TaskType};
use super::step_data::StepData;
use crate::actors::ActorRole;
use crate::error::{DatabaseError, EngineError};
use crate::store::Database;

/// Durable per-actor task storage.
#[derive(Clone)]
pub struct TaskStore {
    db: Arc<dyn Database>,
}

impl TaskStore {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    /// Start a new running task for an actor.
    pub async fn start(
        &self,
        actor_key: &str,
        actor_role: ActorRole,
        task_type: TaskType,
        initial: StepData,
        now: DateTime<Utc>,
    ) -> Result<Task, EngineError> {
        if initial.task_type() != task_type {
            return Err(EngineError::InvalidState(format!(
                "step data for {} cannot start a {task_type} task",
                initial.task_type()
            )));
        }
        if let Some(running) = self.db.get_running_task(actor_key, actor_role).await? {
            return Err(conflict(actor_key, actor_role, running.id));
        }

        let task = Task::new(actor_key, actor_role, initial, now);
        match self.db.insert_task(&task).await {
            Ok(()) => {}
            // Lost a race with another start for the same actor.
            Err(DatabaseError::Constraint(_)) => {
                let existing = self
                    .db
                    .get_running_task(actor_key, actor_role)
                    .await?
                    .map(|t| t.id)
                    .unwrap_or_else(Uuid::nil);
                return Err(conflict(actor_key, actor_role, existing));
            }
            Err(e) => return Err(e.into()),
        }

        tracing::info!(
            task_id = %task.id,
            actor_key,
            role = %actor_role,
            %task_type,
            "Task started"
        );
        Ok(task)
    }

    pub async fn get_running(
        &self,
        actor_key: &str,
        actor_role: ActorRole,
    ) -> Result<Option<Task>, EngineError> {
        Ok(self.db.get_running_task(actor_key, actor_role).await?)
    }

    pub async fn get(&self, id: Uuid) -> Result<Task, EngineError> {
        self.db
            .get_task(id)
            .await?
            .ok_or_else(|| EngineError::not_found("task", id))
    }

    /// Replace the step data and record activity. Clears `reminder_sent`.
    pub async fn update(
        &self,
        task: &Task,
        data: StepData,
        now: DateTime<Utc>,
    ) -> Result<Task, EngineError> {
        if data.task_type() != task.task_type {
            return Err(EngineError::InvalidState(format!(
                "task {} is {}, got step data for {}",
                task.id,
                task.task_type,
                data.task_type()
            )));
        }
        ensure_running(task)?;

        let json = data
            .to_json()
            .map_err(|e| DatabaseError::Serialization(format!("task {}: {e}", task.id)))?;
        let applied = self
            .db
            .update_task_data(task.id, task.version, &json, data.step_name(), now)
            .await?;
        if !applied {
            return Err(EngineError::ConcurrentModification { task_id: task.id });
        }

        Ok(Task {
            step_data: data,
            last_activity_at: now,
            reminder_sent: false,
            version: task.version + 1,
            updated_at: now,
            ..task.clone()
        })
    }

    /// Record activity without changing step data or the reminder flag.
    pub async fn touch(&self, task: &Task, now: DateTime<Utc>) -> Result<Task, EngineError> {
        ensure_running(task)?;
        if !self.db.touch_task(task.id, task.version, now).await? {
            return Err(EngineError::ConcurrentModification { task_id: task.id });
        }
        Ok(Task {
            last_activity_at: now,
            version: task.version + 1,
            updated_at: now,
            ..task.clone()
        })
    }

    /// Move a running task to a terminal status.
    pub async fn transition(
        &self,
        task: &Task,
        status: TaskStatus,
        now: DateTime<Utc>,
    ) -> Result<Task, EngineError> {
        if !task.status.can_transition_to(status) {
            return Err(EngineError::InvalidTransition {
                task_id: task.id,
                from: task.status.to_string(),
                to: status.to_string(),
            });
        }
        if !self
            .db
            .set_task_status(task.id, task.version, status, now)
            .await?
        {
            return Err(EngineError::ConcurrentModification { task_id: task.id });
        }

        tracing::info!(task_id = %task.id, from = %task.status, to = %status, "Task transitioned");
        Ok(Task {
            status,
            last_activity_at: now,
            version: task.version + 1,
            updated_at: now,
            ..task.clone()
        })
    }

    // ── Monitor primitives ──────────────────────────────────────────

    /// Running tasks idle since at least `cutoff`.
    pub async fn idle_since(&self, cutoff: DateTime<Utc>) -> Result<Vec<Task>, EngineError> {
        Ok(self.db.list_idle_running_tasks(cutoff).await?)
    }

    /// Flag that the idle reminder went out. Leaves `last_activity_at` alone.
    /// Returns `false` if the task changed since it was read.
    pub async fn mark_reminded(&self, task: &Task, now: DateTime<Utc>) -> Result<bool, EngineError> {
        Ok(self.db.mark_task_reminded(task.id, task.version, now).await?)
    }

    /// Abandon a running task. Returns `false` (and writes nothing) if a live
    /// write got there first.
    pub async fn abandon(&self, task: &Task, now: DateTime<Utc>) -> Result<bool, EngineError> {
        if task.status != TaskStatus::Running {
            return Ok(false);
        }
        Ok(self
            .db
            .set_task_status(task.id, task.version, TaskStatus::Abandoned, now)
            .await?)
    }
}

fn conflict(actor_key: &str, actor_role: ActorRole, task_id: Uuid) -> EngineError {
    EngineError::Conflict {
        actor_key: actor_key.to_string(),
        role: actor_role.to_string(),
        task_id,
    }
}

fn ensure_running(task: &Task) -> Result<(), EngineError> {
    if task.status.is_terminal() {
        return Err(EngineError::InvalidState(format!(
            "task {} is already {}",
            task.id, task.status
        )));
    }
    Ok(())
}
