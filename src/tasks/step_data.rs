//! Typed step data: one schema per flow, serialized as a JSON blob at the
//! storage boundary.

use serde::{Deserialize, Serialize};

use super::model::TaskType;
use crate::flows::add_client::AddClientData;
use crate::flows::habit_log::HabitLogData;
use crate::flows::registration::RegistrationData;

/// Collected fields and current step for a task, tagged by flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "flow", rename_all = "snake_case")]
pub enum StepData {
    Registration(RegistrationData),
    AddClient(AddClientData),
    LogHabit(HabitLogData),
}

impl StepData {
    /// Fresh step data for the first step of a flow.
    pub fn initial(task_type: TaskType) -> Self {
        match task_type {
            TaskType::Registration => Self::Registration(RegistrationData::default()),
            TaskType::AddClient => Self::AddClient(AddClientData::default()),
            TaskType::LogHabit => Self::LogHabit(HabitLogData::default()),
        }
    }

    pub fn task_type(&self) -> TaskType {
        match self {
            Self::Registration(_) => TaskType::Registration,
            Self::AddClient(_) => TaskType::AddClient,
            Self::LogHabit(_) => TaskType::LogHabit,
        }
    }

    pub fn step_name(&self) -> &'static str {
        match self {
            Self::Registration(d) => d.step.as_str(),
            Self::AddClient(d) => d.step.as_str(),
            Self::LogHabit(d) => d.step.as_str(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}
