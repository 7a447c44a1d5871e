//! Habit logging flow for clients: habit → value.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Completion, Field, FlowContext, StepOutcome};
use crate::channels::{ChoiceOption, Reply};
use crate::dispatcher::ButtonAction;
use crate::error::EngineError;
use crate::tasks::StepData;

/// Habits offered as quick-pick buttons.
const SUGGESTED_HABITS: [&str; 3] = ["water", "sleep", "steps"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HabitLogStep {
    #[default]
    Habit,
    Value,
}

impl HabitLogStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Habit => "habit",
            Self::Value => "value",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HabitLogData {
    pub step: HabitLogStep,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub habit: Option<String>,
}

/// One stored habit entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HabitLog {
    pub id: Uuid,
    pub actor_key: String,
    pub habit: String,
    pub value: f64,
    pub logged_at: DateTime<Utc>,
}

impl HabitLog {
    pub fn new(actor_key: impl Into<String>, habit: impl Into<String>, value: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            actor_key: actor_key.into(),
            habit: habit.into(),
            value,
            logged_at: Utc::now(),
        }
    }
}

pub fn handle(
    ctx: &FlowContext<'_>,
    input: &str,
    data: &HabitLogData,
) -> Result<StepOutcome, EngineError> {
    match data.step {
        HabitLogStep::Habit => {
            let habit = ctx.validator.validate(Field::HabitName, input)?.to_lowercase();
            Ok(StepOutcome::Advance {
                data: StepData::LogHabit(HabitLogData {
                    step: HabitLogStep::Value,
                    habit: Some(habit),
                }),
            })
        }
        HabitLogStep::Value => {
            let Some(habit) = data.habit.clone() else {
                return Err(EngineError::InvalidState(
                    "habit value entered before a habit was chosen".into(),
                ));
            };
            let raw = ctx.validator.validate(Field::HabitValue, input)?;
            let value = raw
                .parse::<f64>()
                .map_err(|e| EngineError::InvalidState(format!("habit value {raw}: {e}")))?;
            Ok(StepOutcome::Complete(Completion::LogHabit(HabitLog::new(
                ctx.actor_key,
                habit,
                value,
            ))))
        }
    }
}

pub fn prompt(data: &HabitLogData) -> Reply {
    match data.step {
        HabitLogStep::Habit => Reply::choice(
            "Which habit are you logging? Tap one or type your own.",
            SUGGESTED_HABITS
                .iter()
                .map(|h| ChoiceOption::new(ButtonAction::Choice((*h).into()).to_string(), *h))
                .collect(),
        ),
        HabitLogStep::Value => Reply::text(format!(
            "How much {} today? Send a number.",
            data.habit.as_deref().unwrap_or("of it")
        )),
    }
}
