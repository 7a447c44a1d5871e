//! Add-client flow: name → phone → (classify) → branch per scenario → invite.

use serde::{Deserialize, Serialize};

use super::{Completion, Field, FlowContext, StepOutcome, parse_yes_no, yes_no_options};
use crate::channels::{ChoiceOption, Reply};
use crate::dispatcher::ButtonAction;
use crate::error::EngineError;
use crate::invitations::model::{ClientDetails, CompletionMode};
use crate::relationships::model::{ConnectionStatus, Scenario};
use crate::tasks::StepData;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddClientStep {
    #[default]
    Name,
    Phone,
    CompletionMode,
    Email,
    ConfirmInvite,
    ConfirmSecondary,
}

impl AddClientStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Phone => "phone",
            Self::CompletionMode => "completion_mode",
            Self::Email => "email",
            Self::ConfirmInvite => "confirm_invite",
            Self::ConfirmSecondary => "confirm_secondary",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AddClientData {
    pub step: AddClientStep,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    /// Scenario seen when the phone number was entered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenario: Option<Scenario>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_mode: Option<CompletionMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl AddClientData {
    fn invite(&self, mode: CompletionMode) -> Result<StepOutcome, EngineError> {
        let (Some(phone), Some(scenario)) = (self.phone.clone(), self.scenario) else {
            return Err(EngineError::InvalidState(
                "add_client invite without a classified phone number".into(),
            ));
        };
        Ok(StepOutcome::Complete(Completion::InviteClient {
            to_contact: phone,
            details: ClientDetails {
                name: self.name.clone(),
                email: self.email.clone(),
            },
            mode,
            scenario,
        }))
    }

    fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("your client")
    }
}

fn parse_mode(input: &str) -> Option<CompletionMode> {
    match input.trim().to_lowercase().as_str() {
        "1" | "me" | "i will" => Some(CompletionMode::InviterSuppliesData),
        "2" | "client" | "they will" => Some(CompletionMode::InviteeCompletesProfile),
        other => other.parse().ok(),
    }
}

pub async fn handle(
    ctx: &FlowContext<'_>,
    input: &str,
    data: &AddClientData,
) -> Result<StepOutcome, EngineError> {
    let mut next = data.clone();
    match data.step {
        AddClientStep::Name => {
            next.name = Some(ctx.validator.validate(Field::Name, input)?);
            next.step = AddClientStep::Phone;
        }
        AddClientStep::Phone => {
            let phone = ctx.validator.validate(Field::Phone, input)?;
            if phone == ctx.actor_key {
                return Ok(StepOutcome::Reprompt {
                    message: "That's your own number. Please send your client's number.".into(),
                });
            }
            let scenario = ctx.graph.classify(ctx.actor_key, &phone).await?;
            tracing::debug!(
                actor_key = %ctx.actor_key,
                target = %phone,
                %scenario,
                "Classified add_client target"
            );
            // With several trainers the classifier says connected elsewhere
            // even when one of them is this trainer.
            let own_active = scenario == Scenario::ConnectedElsewhere
                && ctx
                    .graph
                    .edge(ctx.actor_key, &phone)
                    .await?
                    .is_some_and(|e| e.connection_status == ConnectionStatus::Active);
            next.phone = Some(phone);
            next.scenario = Some(scenario);
            next.step = match scenario {
                Scenario::New => AddClientStep::CompletionMode,
                Scenario::Available => AddClientStep::ConfirmInvite,
                Scenario::ConnectedElsewhere if !own_active => AddClientStep::ConfirmSecondary,
                Scenario::ConnectedElsewhere | Scenario::AlreadyConnected => {
                    return Ok(StepOutcome::Complete(Completion::Nothing {
                        message: format!("{} is already your client.", data.display_name()),
                    }));
                }
            };
        }
        AddClientStep::CompletionMode => match parse_mode(input) {
            Some(CompletionMode::InviterSuppliesData) => {
                next.completion_mode = Some(CompletionMode::InviterSuppliesData);
                next.step = AddClientStep::Email;
            }
            Some(CompletionMode::InviteeCompletesProfile) => {
                next.completion_mode = Some(CompletionMode::InviteeCompletesProfile);
                return next.invite(CompletionMode::InviteeCompletesProfile);
            }
            None => {
                return Ok(StepOutcome::Reprompt {
                    message: "Please pick one of the options.".into(),
                });
            }
        },
        AddClientStep::Email => {
            next.email = if input.trim().eq_ignore_ascii_case("skip") {
                None
            } else {
                Some(ctx.validator.validate(Field::Email, input)?)
            };
            return next.invite(CompletionMode::InviterSuppliesData);
        }
        AddClientStep::ConfirmInvite | AddClientStep::ConfirmSecondary => {
            return match parse_yes_no(input) {
                // The contact already has a profile; the payload only fills gaps.
                Some(true) => next.invite(CompletionMode::InviterSuppliesData),
                Some(false) => Ok(StepOutcome::Cancel {
                    message: format!("Okay, I won't invite {}.", data.display_name()),
                }),
                None => Ok(StepOutcome::Reprompt {
                    message: "Please tap Yes or No.".into(),
                }),
            };
        }
    }
    Ok(StepOutcome::Advance {
        data: StepData::AddClient(next),
    })
}

pub fn prompt(data: &AddClientData) -> Reply {
    let name = data.display_name();
    match data.step {
        AddClientStep::Name => Reply::text("What's your client's name?"),
        AddClientStep::Phone => Reply::text(format!(
            "What's {name}'s WhatsApp number (with country code)?"
        )),
        AddClientStep::CompletionMode => Reply::choice(
            format!("{name} isn't registered yet. Who should fill in their profile?"),
            vec![
                ChoiceOption::new(
                    ButtonAction::Choice(CompletionMode::InviterSuppliesData.to_string())
                        .to_string(),
                    "I'll add details",
                ),
                ChoiceOption::new(
                    ButtonAction::Choice(CompletionMode::InviteeCompletesProfile.to_string())
                        .to_string(),
                    "Client fills it in",
                ),
            ],
        ),
        AddClientStep::Email => Reply::text(format!(
            "What's {name}'s email address? Reply 'skip' if you don't have it."
        )),
        AddClientStep::ConfirmInvite => Reply::choice(
            format!("{name} already uses the service. Send them an invitation?"),
            yes_no_options("Yes", "No"),
        ),
        AddClientStep::ConfirmSecondary => Reply::choice(
            format!(
                "{name} is already training with another trainer. Invite them as your client too?"
            ),
            yes_no_options("Yes", "No"),
        ),
    }
}
