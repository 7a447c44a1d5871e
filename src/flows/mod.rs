//! Flows: the fixed step graphs the dispatcher drives.
//!
//! Each flow owns a step-data schema and a pure step handler. Handlers read
//! (never write) shared state and return a `StepOutcome`; the dispatcher
//! applies it.

pub mod add_client;
pub mod habit_log;
pub mod registration;
pub mod validator;

use crate::actors::{Actor, ActorRole};
use crate::channels::{ChoiceOption, Reply};
use crate::dispatcher::ButtonAction;
use crate::error::EngineError;
use crate::invitations::model::{ClientDetails, CompletionMode};
use crate::relationships::RelationshipGraph;
use crate::relationships::model::Scenario;
use crate::tasks::StepData;

pub use habit_log::HabitLog;
pub use validator::{BasicValidator, Field, FieldValidator};

/// What a step handler can see.
pub struct FlowContext<'a> {
    pub actor_key: &'a str,
    pub actor_role: ActorRole,
    pub graph: &'a RelationshipGraph,
    pub validator: &'a dyn FieldValidator,
}

/// Result of handling one inbound event on the current step.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// Move to the step recorded in `data`; the task stays running.
    Advance { data: StepData },
    /// Perform the flow's terminal side effect and complete the task.
    Complete(Completion),
    /// Re-prompt the same step with a message.
    Reprompt { message: String },
    /// Stop the task.
    Cancel { message: String },
}

/// Terminal side effect of a finished flow.
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    /// Write (or replace) the actor's own profile.
    RegisterActor(Actor),
    /// Create an invitation to a contact.
    InviteClient {
        to_contact: String,
        details: ClientDetails,
        mode: CompletionMode,
        scenario: Scenario,
    },
    /// Store a habit log entry.
    LogHabit(HabitLog),
    /// Nothing to write; tell the actor why.
    Nothing { message: String },
}

/// Run the handler for the current step of `data`.
pub async fn handle(
    ctx: &FlowContext<'_>,
    input: &str,
    data: &StepData,
) -> Result<StepOutcome, EngineError> {
    match data {
        StepData::Registration(d) => registration::handle(ctx, input, d),
        StepData::AddClient(d) => add_client::handle(ctx, input, d).await,
        StepData::LogHabit(d) => habit_log::handle(ctx, input, d),
    }
}

/// Prompt for the current step of `data`.
pub fn prompt(data: &StepData) -> Reply {
    match data {
        StepData::Registration(d) => registration::prompt(d),
        StepData::AddClient(d) => add_client::prompt(d),
        StepData::LogHabit(d) => habit_log::prompt(d),
    }
}

/// Interpret a yes/no answer (typed or tapped).
pub fn parse_yes_no(input: &str) -> Option<bool> {
    match input.trim().to_lowercase().as_str() {
        "yes" | "y" | "yep" | "yeah" | "ok" | "confirm" | "1" => Some(true),
        "no" | "n" | "nope" | "0" => Some(false),
        _ => None,
    }
}

/// Standard yes/no buttons.
pub fn yes_no_options(yes: &str, no: &str) -> Vec<ChoiceOption> {
    vec![
        ChoiceOption::new(ButtonAction::Choice("yes".into()).to_string(), yes),
        ChoiceOption::new(ButtonAction::Choice("no".into()).to_string(), no),
    ]
}
