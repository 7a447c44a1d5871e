//! Flow dispatcher: routes inbound events to the actor's running task.
//!
//! Every delivery for an actor runs under that actor's lock. Handlers compute
//! their whole outcome first; the dispatcher then commits it and returns the
//! replies to send.

pub mod button;
pub mod command;

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;

use crate::actors::ActorRole;
use crate::channels::{ChoiceOption, EventKind, InboundEvent, MessagingChannel, Reply};
use crate::config::{EngineConfig, to_chrono};
use crate::error::EngineError;
use crate::flows::registration::RegistrationData;
use crate::flows::{self, BasicValidator, Completion, FieldValidator, FlowContext, StepOutcome};
use crate::invitations::{InvitationLedger, InvitationStatus};
use crate::relationships::RelationshipGraph;
use crate::store::Database;
use crate::tasks::{ActorLocks, StepData, Task, TaskStatus, TaskStore, TaskType};

pub use button::ButtonAction;
pub use command::{Command, IntentService, NoIntent, is_interrupt};

const GENERIC_FAILURE: &str = "Sorry, something went wrong on our side. Please try again.";

/// What a dispatch did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Started(TaskType),
    Advanced,
    Reprompted,
    Completed(TaskType),
    Cancelled,
    ResumeOffered(TaskType),
    Resumed(TaskType),
    Continued,
    InvitationAccepted,
    InvitationDeclined,
    /// The task type isn't available to this role.
    Denied(TaskType),
    Help,
    Unrecognized,
    /// An integrity error; the actor got a generic failure message.
    Failed { kind: &'static str },
}

/// Result of one dispatch: what happened and what to send back.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchResult {
    pub outcome: DispatchOutcome,
    pub replies: Vec<Reply>,
}

impl DispatchResult {
    fn new(outcome: DispatchOutcome, reply: Reply) -> Self {
        Self {
            outcome,
            replies: vec![reply],
        }
    }
}

/// Routes events for all actors.
pub struct Dispatcher {
    db: Arc<dyn Database>,
    tasks: TaskStore,
    graph: RelationshipGraph,
    ledger: Arc<InvitationLedger>,
    locks: Arc<ActorLocks>,
    channel: Arc<dyn MessagingChannel>,
    validator: Arc<dyn FieldValidator>,
    intents: Arc<dyn IntentService>,
    config: EngineConfig,
}

impl Dispatcher {
    pub fn new(
        db: Arc<dyn Database>,
        ledger: Arc<InvitationLedger>,
        locks: Arc<ActorLocks>,
        channel: Arc<dyn MessagingChannel>,
        config: EngineConfig,
    ) -> Self {
        Self {
            tasks: TaskStore::new(Arc::clone(&db)),
            graph: RelationshipGraph::new(Arc::clone(&db)),
            db,
            ledger,
            locks,
            channel,
            validator: Arc::new(BasicValidator),
            intents: Arc::new(NoIntent),
            config,
        }
    }

    pub fn with_validator(mut self, validator: Arc<dyn FieldValidator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_intents(mut self, intents: Arc<dyn IntentService>) -> Self {
        self.intents = intents;
        self
    }

    /// Dispatch an event and send the replies through the channel.
    pub async fn handle_event(&self, actor_role: ActorRole, event: InboundEvent) -> DispatchResult {
        let result = self.dispatch(&event.actor_key, actor_role, &event).await;
        for reply in &result.replies {
            if let Err(e) = self.channel.send_reply(&event.actor_key, reply).await {
                tracing::warn!(
                    actor_key = %event.actor_key,
                    channel = self.channel.name(),
                    "Failed to send reply: {e}"
                );
            }
        }
        result
    }

    pub async fn dispatch(
        &self,
        actor_key: &str,
        actor_role: ActorRole,
        event: &InboundEvent,
    ) -> DispatchResult {
        self.dispatch_at(actor_key, actor_role, event, Utc::now())
            .await
    }

    /// Dispatch with an explicit clock.
    pub async fn dispatch_at(
        &self,
        actor_key: &str,
        actor_role: ActorRole,
        event: &InboundEvent,
        now: DateTime<Utc>,
    ) -> DispatchResult {
        let _guard = self.locks.lock(actor_key, actor_role).await;
        match self.route(actor_key, actor_role, event, now).await {
            Ok(result) => {
                tracing::debug!(actor_key, role = %actor_role, outcome = ?result.outcome, "Dispatched");
                result
            }
            Err(e) => {
                tracing::error!(
                    actor_key,
                    role = %actor_role,
                    kind = e.kind(),
                    "Dispatch failed: {e}"
                );
                DispatchResult::new(
                    DispatchOutcome::Failed { kind: e.kind() },
                    Reply::text(GENERIC_FAILURE),
                )
            }
        }
    }

    async fn route(
        &self,
        actor_key: &str,
        role: ActorRole,
        event: &InboundEvent,
        now: DateTime<Utc>,
    ) -> Result<DispatchResult, EngineError> {
        let (action, text) = match &event.kind {
            EventKind::Text { text } => (None, text.clone()),
            EventKind::Button { button_id } => match ButtonAction::from_str(button_id) {
                Ok(action) => (Some(action), String::new()),
                Err(e) => {
                    tracing::debug!(actor_key, button_id, "Unparseable button id, treating as text: {e}");
                    (None, button_id.clone())
                }
            },
        };

        let running = self.tasks.get_running(actor_key, role).await?;

        if matches!(action, Some(ButtonAction::Cancel)) || (action.is_none() && is_interrupt(&text)) {
            return self.cancel(running, now).await;
        }

        match action {
            Some(ButtonAction::AcceptInvitation(token)) => {
                self.accept_invitation(actor_key, role, &token, now).await
            }
            Some(ButtonAction::DeclineInvitation(token)) => {
                self.decline_invitation(actor_key, &token, now).await
            }
            Some(ButtonAction::ContinueTask(task_type)) => match running {
                Some(task) if task.task_type == task_type => {
                    let task = self.tasks.touch(&task, now).await?;
                    Ok(DispatchResult::new(
                        DispatchOutcome::Continued,
                        flows::prompt(&task.step_data),
                    ))
                }
                _ => Ok(DispatchResult::new(
                    DispatchOutcome::Unrecognized,
                    help_reply(role).prefixed("That task isn't in progress any more."),
                )),
            },
            Some(
                ButtonAction::RestartTask(task_type)
                | ButtonAction::ResumeTask(task_type)
                | ButtonAction::StartFresh(task_type),
            ) if role_denial(role, task_type).is_some() => Ok(denied(role, task_type)),
            Some(ButtonAction::RestartTask(task_type)) => {
                if let Some(task) = running {
                    self.tasks.transition(&task, TaskStatus::Stopped, now).await?;
                }
                self.start_task(actor_key, role, StepData::initial(task_type), now)
                    .await
            }
            Some(ButtonAction::ResumeTask(task_type)) => {
                self.resume(actor_key, role, task_type, running, now).await
            }
            Some(ButtonAction::StartFresh(task_type)) => {
                self.db.delete_abandoned_snapshot(actor_key, task_type).await?;
                if let Some(task) = running {
                    self.tasks.transition(&task, TaskStatus::Stopped, now).await?;
                }
                self.start_task(actor_key, role, StepData::initial(task_type), now)
                    .await
            }
            Some(ButtonAction::Start(task_type)) => match running {
                Some(task) => self.step(actor_key, role, task, task_type.as_str(), now).await,
                None => self.begin(actor_key, role, task_type, now).await,
            },
            Some(ButtonAction::Choice(value)) => match running {
                Some(task) => self.step(actor_key, role, task, &value, now).await,
                None => self.idle_text(actor_key, role, &value, now).await,
            },
            Some(ButtonAction::Cancel) => self.cancel(running, now).await,
            None => match running {
                Some(task) => self.step(actor_key, role, task, &text, now).await,
                None => self.idle_text(actor_key, role, &text, now).await,
            },
        }
    }

    // ── Running task ────────────────────────────────────────────────

    async fn step(
        &self,
        actor_key: &str,
        role: ActorRole,
        task: Task,
        input: &str,
        now: DateTime<Utc>,
    ) -> Result<DispatchResult, EngineError> {
        let ctx = FlowContext {
            actor_key,
            actor_role: role,
            graph: &self.graph,
            validator: self.validator.as_ref(),
        };

        let outcome = match flows::handle(&ctx, input, &task.step_data).await {
            Ok(outcome) => outcome,
            Err(EngineError::Validation(e)) => StepOutcome::Reprompt { message: e.message },
            Err(e) => return Err(e),
        };

        match outcome {
            StepOutcome::Advance { data } => {
                let task = self.tasks.update(&task, data, now).await?;
                Ok(DispatchResult::new(
                    DispatchOutcome::Advanced,
                    flows::prompt(&task.step_data),
                ))
            }
            StepOutcome::Reprompt { message } => {
                let task = self.tasks.touch(&task, now).await?;
                Ok(DispatchResult::new(
                    DispatchOutcome::Reprompted,
                    flows::prompt(&task.step_data).prefixed(&message),
                ))
            }
            StepOutcome::Cancel { message } => {
                self.tasks.transition(&task, TaskStatus::Stopped, now).await?;
                Ok(DispatchResult::new(DispatchOutcome::Cancelled, Reply::text(message)))
            }
            StepOutcome::Complete(completion) => {
                let reply = self.complete(actor_key, completion, now).await?;
                self.tasks.transition(&task, TaskStatus::Completed, now).await?;
                Ok(DispatchResult::new(
                    DispatchOutcome::Completed(task.task_type),
                    reply,
                ))
            }
        }
    }

    /// Apply a flow's terminal side effect.
    async fn complete(
        &self,
        actor_key: &str,
        completion: Completion,
        now: DateTime<Utc>,
    ) -> Result<Reply, EngineError> {
        match completion {
            Completion::RegisterActor(mut actor) => {
                if let Some(existing) = self.db.get_actor(actor_key).await? {
                    actor.created_at = existing.created_at;
                }
                actor.updated_at = now;
                self.db.upsert_actor(&actor).await?;
                Ok(Reply::text(format!("You're all set, {}!", actor.name)))
            }
            Completion::InviteClient {
                to_contact,
                details,
                mode,
                scenario,
            } => {
                let name = details.name.clone().unwrap_or_else(|| to_contact.clone());
                let invitation = self
                    .ledger
                    .create(actor_key, &to_contact, details, mode, now)
                    .await?;
                // The invitation is out; analytics must not fail the flow.
                if let Err(e) = self
                    .db
                    .record_event(
                        "client_invited",
                        actor_key,
                        &json!({
                            "scenario": scenario.to_string(),
                            "completion_mode": mode.as_str(),
                            "token": invitation.token,
                        }),
                        now,
                    )
                    .await
                {
                    tracing::error!(actor_key, token = %invitation.token, "Failed to record client_invited: {e}");
                }
                Ok(Reply::text(format!(
                    "Invitation sent to {name}. I'll let you know when they respond."
                )))
            }
            Completion::LogHabit(log) => {
                self.db.insert_habit_log(&log).await?;
                Ok(Reply::text(format!("Logged {} {}. Nice work!", log.value, log.habit)))
            }
            Completion::Nothing { message } => Ok(Reply::text(message)),
        }
    }

    async fn cancel(&self, running: Option<Task>, now: DateTime<Utc>) -> Result<DispatchResult, EngineError> {
        match running {
            Some(task) => {
                self.tasks.transition(&task, TaskStatus::Stopped, now).await?;
                Ok(DispatchResult::new(
                    DispatchOutcome::Cancelled,
                    Reply::text(format!("Okay, I've cancelled {}.", task.task_type.label())),
                ))
            }
            None => Ok(DispatchResult::new(
                DispatchOutcome::Cancelled,
                Reply::text("There's nothing to cancel."),
            )),
        }
    }

    // ── Idle actor ──────────────────────────────────────────────────

    async fn idle_text(
        &self,
        actor_key: &str,
        role: ActorRole,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<DispatchResult, EngineError> {
        let command = match Command::parse(text) {
            Some(command) => Some(command),
            None => self.intents.propose(actor_key, text).await,
        };
        match command {
            Some(Command::Start(task_type)) => self.begin(actor_key, role, task_type, now).await,
            Some(Command::Help) => Ok(DispatchResult::new(DispatchOutcome::Help, help_reply(role))),
            None => Ok(DispatchResult::new(
                DispatchOutcome::Unrecognized,
                help_reply(role).prefixed("Sorry, I didn't catch that."),
            )),
        }
    }

    /// Start a task on request: role gate, then offer a resumable snapshot.
    async fn begin(
        &self,
        actor_key: &str,
        role: ActorRole,
        task_type: TaskType,
        now: DateTime<Utc>,
    ) -> Result<DispatchResult, EngineError> {
        if role_denial(role, task_type).is_some() {
            return Ok(denied(role, task_type));
        }

        if let Some(snapshot) = self.db.get_abandoned_snapshot(actor_key, task_type).await? {
            if snapshot.actor_role == role
                && snapshot.is_resumable_at(now, to_chrono(self.config.resume_window))
            {
                return Ok(DispatchResult::new(
                    DispatchOutcome::ResumeOffered(task_type),
                    Reply::choice(
                        format!(
                            "You didn't finish {} last time (you were at the {} step). Pick up where you left off?",
                            task_type.label(),
                            snapshot.step.replace('_', " ")
                        ),
                        vec![
                            ChoiceOption::new(ButtonAction::ResumeTask(task_type).to_string(), "Resume"),
                            ChoiceOption::new(ButtonAction::StartFresh(task_type).to_string(), "Start fresh"),
                        ],
                    ),
                ));
            }
            self.db.delete_abandoned_snapshot(actor_key, task_type).await?;
        }

        self.start_task(actor_key, role, StepData::initial(task_type), now)
            .await
    }

    async fn resume(
        &self,
        actor_key: &str,
        role: ActorRole,
        task_type: TaskType,
        running: Option<Task>,
        now: DateTime<Utc>,
    ) -> Result<DispatchResult, EngineError> {
        let snapshot = self
            .db
            .get_abandoned_snapshot(actor_key, task_type)
            .await?
            .filter(|s| {
                s.actor_role == role
                    && s.is_resumable_at(now, to_chrono(self.config.resume_window))
            });
        let Some(snapshot) = snapshot else {
            let mut result = self
                .start_task(actor_key, role, StepData::initial(task_type), now)
                .await?;
            if let Some(first) = result.replies.first_mut() {
                *first = first.clone().prefixed("That saved progress has expired, so let's start again.");
            }
            return Ok(result);
        };

        if let Some(task) = running {
            self.tasks.transition(&task, TaskStatus::Stopped, now).await?;
        }
        let task = self
            .tasks
            .start(actor_key, role, task_type, snapshot.step_data, now)
            .await?;
        self.db.delete_abandoned_snapshot(actor_key, task_type).await?;

        tracing::info!(task_id = %task.id, actor_key, %task_type, step = task.step(), "Task resumed");
        Ok(DispatchResult::new(
            DispatchOutcome::Resumed(task_type),
            flows::prompt(&task.step_data).prefixed("Welcome back!"),
        ))
    }

    async fn start_task(
        &self,
        actor_key: &str,
        role: ActorRole,
        data: StepData,
        now: DateTime<Utc>,
    ) -> Result<DispatchResult, EngineError> {
        let task_type = data.task_type();
        if role_denial(role, task_type).is_some() {
            return Ok(denied(role, task_type));
        }
        let task = self.tasks.start(actor_key, role, task_type, data, now).await?;
        Ok(DispatchResult::new(
            DispatchOutcome::Started(task_type),
            flows::prompt(&task.step_data),
        ))
    }

    // ── Invitations ─────────────────────────────────────────────────

    async fn accept_invitation(
        &self,
        actor_key: &str,
        role: ActorRole,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<DispatchResult, EngineError> {
        let invitation = self.ledger.get(token).await?;
        if invitation.to_contact != actor_key {
            return Err(EngineError::InvalidState(format!(
                "invitation {token} is not addressed to {actor_key}"
            )));
        }

        // A first accept is announced through the notification queue.
        let repeat = invitation.status == InvitationStatus::Accepted;
        let acceptance = self.ledger.accept(token, now).await?;
        let mut replies = Vec::new();
        if repeat {
            let trainer = self
                .db
                .get_actor(&acceptance.inviter_key)
                .await?
                .map_or_else(|| "your trainer".to_string(), |a| a.name);
            replies.push(Reply::text(format!("You're already connected with {trainer}.")));
        }

        if acceptance.needs_profile() {
            // The client's tasks live under the target role whatever role this
            // delivery was resolved to.
            let _target_guard = match role {
                ActorRole::Target => None,
                ActorRole::Initiator => Some(self.locks.lock(actor_key, ActorRole::Target).await),
            };
            let profile_done = self
                .db
                .get_actor(actor_key)
                .await?
                .is_some_and(|a| a.profile_complete);
            let busy = self
                .tasks
                .get_running(actor_key, ActorRole::Target)
                .await?
                .is_some();
            if !profile_done && !busy {
                let data = StepData::Registration(RegistrationData::prefilled(
                    acceptance.details.name.clone(),
                ));
                let task = self
                    .tasks
                    .start(actor_key, ActorRole::Target, TaskType::Registration, data, now)
                    .await?;
                replies.push(flows::prompt(&task.step_data));
            }
        }

        Ok(DispatchResult {
            outcome: DispatchOutcome::InvitationAccepted,
            replies,
        })
    }

    async fn decline_invitation(
        &self,
        actor_key: &str,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<DispatchResult, EngineError> {
        let invitation = self.ledger.get(token).await?;
        if invitation.to_contact != actor_key {
            return Err(EngineError::InvalidState(format!(
                "invitation {token} is not addressed to {actor_key}"
            )));
        }
        self.ledger.decline(token, now).await?;
        Ok(DispatchResult::new(
            DispatchOutcome::InvitationDeclined,
            Reply::text("No problem, I've let them know."),
        ))
    }
}

/// Message for a role that may not run `task_type`, if any.
fn role_denial(role: ActorRole, task_type: TaskType) -> Option<&'static str> {
    match (role, task_type) {
        (ActorRole::Target, TaskType::AddClient) => Some("Only trainers can add clients."),
        (ActorRole::Initiator, TaskType::LogHabit) => Some("Habit logging is for clients."),
        _ => None,
    }
}

fn denied(role: ActorRole, task_type: TaskType) -> DispatchResult {
    DispatchResult::new(
        DispatchOutcome::Denied(task_type),
        Reply::text(role_denial(role, task_type).unwrap_or("That isn't available to you.")),
    )
}

fn help_reply(role: ActorRole) -> Reply {
    let options = match role {
        ActorRole::Initiator => vec![
            ChoiceOption::new(ButtonAction::Start(TaskType::AddClient).to_string(), "Add client"),
            ChoiceOption::new(ButtonAction::Start(TaskType::Registration).to_string(), "Update profile"),
        ],
        ActorRole::Target => vec![
            ChoiceOption::new(ButtonAction::Start(TaskType::LogHabit).to_string(), "Log habit"),
            ChoiceOption::new(ButtonAction::Start(TaskType::Registration).to_string(), "Update profile"),
        ],
    };
    Reply::choice("What would you like to do?", options)
}
