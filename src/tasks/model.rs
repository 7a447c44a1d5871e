//! Task model: one in-progress multi-step flow owned by one actor.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::step_data::StepData;
use crate::actors::ActorRole;

/// Which step graph a task follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Registration,
    AddClient,
    LogHabit,
}

impl TaskType {
    pub const ALL: [TaskType; 3] = [Self::Registration, Self::AddClient, Self::LogHabit];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Registration => "registration",
            Self::AddClient => "add_client",
            Self::LogHabit => "log_habit",
        }
    }

    /// Human label used in chat messages.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Registration => "registration",
            Self::AddClient => "adding a client",
            Self::LogHabit => "habit logging",
        }
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "registration" => Ok(Self::Registration),
            "add_client" => Ok(Self::AddClient),
            "log_habit" => Ok(Self::LogHabit),
            other => Err(format!("unknown task type: {other}")),
        }
    }
}

/// Lifecycle status of a task.
///
/// `Running` is the only non-terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Running,
    Completed,
    Stopped,
    Abandoned,
}

impl TaskStatus {
    /// Check if a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, target),
            (Running, Completed) | (Running, Stopped) | (Running, Abandoned)
        )
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Stopped => "stopped",
            Self::Abandoned => "abandoned",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "stopped" => Ok(Self::Stopped),
            "abandoned" => Ok(Self::Abandoned),
            other => Err(format!("unknown task status: {other}")),
        }
    }
}

/// A persisted task row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub actor_key: String,
    pub actor_role: ActorRole,
    pub task_type: TaskType,
    pub status: TaskStatus,
    pub step_data: StepData,
    /// Last time the actor (or the engine on their behalf) touched this task.
    pub last_activity_at: DateTime<Utc>,
    /// Whether the idle reminder went out since the last activity.
    pub reminder_sent: bool,
    /// Optimistic concurrency counter, bumped on every write.
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Create a new running task at `now`.
    pub fn new(
        actor_key: impl Into<String>,
        actor_role: ActorRole,
        step_data: StepData,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            actor_key: actor_key.into(),
            actor_role,
            task_type: step_data.task_type(),
            status: TaskStatus::Running,
            step_data,
            last_activity_at: now,
            reminder_sent: false,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    /// Name of the current step.
    pub fn step(&self) -> &'static str {
        self.step_data.step_name()
    }

    /// How long the task has been idle at `now`.
    pub fn idle_for(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.last_activity_at
    }
}

/// Resumable copy of an abandoned task, kept apart from the terminal task row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbandonedSnapshot {
    pub actor_key: String,
    pub actor_role: ActorRole,
    pub task_type: TaskType,
    pub step: String,
    pub step_data: StepData,
    pub abandoned_at: DateTime<Utc>,
}

impl AbandonedSnapshot {
    pub fn of(task: &Task, abandoned_at: DateTime<Utc>) -> Self {
        Self {
            actor_key: task.actor_key.clone(),
            actor_role: task.actor_role,
            task_type: task.task_type,
            step: task.step().to_string(),
            step_data: task.step_data.clone(),
            abandoned_at,
        }
    }

    /// Whether the snapshot can still be resumed at `now`.
    pub fn is_resumable_at(&self, now: DateTime<Utc>, window: chrono::Duration) -> bool {
        now - self.abandoned_at < window
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flows::registration::RegistrationData;

    #[test]
    fn only_running_transitions_out() {
        use TaskStatus::*;
        for target in [Completed, Stopped, Abandoned] {
            assert!(Running.can_transition_to(target), "running -> {target}");
        }
        for from in [Completed, Stopped, Abandoned] {
            for target in [Running, Completed, Stopped, Abandoned] {
                assert!(!from.can_transition_to(target), "{from} -> {target}");
            }
        }
        assert!(!Running.can_transition_to(Running));
    }

    #[test]
    fn display_matches_serde() {
        for status in [
            TaskStatus::Running,
            TaskStatus::Completed,
            TaskStatus::Stopped,
            TaskStatus::Abandoned,
        ] {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(format!("\"{status}\""), json);
            assert_eq!(status.as_str().parse::<TaskStatus>().unwrap(), status);
        }
        for task_type in TaskType::ALL {
            let json = serde_json::to_string(&task_type).unwrap();
            assert_eq!(format!("\"{task_type}\""), json);
            assert_eq!(task_type.as_str().parse::<TaskType>().unwrap(), task_type);
        }
    }

    #[test]
    fn new_task_takes_type_from_step_data() {
        let now = Utc::now();
        let task = Task::new(
            "27820000001",
            ActorRole::Initiator,
            StepData::Registration(RegistrationData::default()),
            now,
        );
        assert_eq!(task.task_type, TaskType::Registration);
        assert_eq!(task.status, TaskStatus::Running);
        assert_eq!(task.step(), "name");
        assert!(!task.reminder_sent);
        assert_eq!(task.idle_for(now + chrono::Duration::minutes(6)).num_minutes(), 6);
    }

    #[test]
    fn snapshot_resume_window() {
        let now = Utc::now();
        let task = Task::new(
            "27820000001",
            ActorRole::Initiator,
            StepData::Registration(RegistrationData::default()),
            now,
        );
        let snapshot = AbandonedSnapshot::of(&task, now);
        assert_eq!(snapshot.step, "name");
        assert_eq!(snapshot.step_data, task.step_data);

        let window = chrono::Duration::hours(24);
        assert!(snapshot.is_resumable_at(now + chrono::Duration::hours(23), window));
        assert!(!snapshot.is_resumable_at(now + chrono::Duration::hours(24), window));
    }
}
