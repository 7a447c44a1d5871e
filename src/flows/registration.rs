//! Registration flow: name → email → business name (trainers) → confirm.

use serde::{Deserialize, Serialize};

use super::{Completion, Field, FlowContext, StepOutcome, parse_yes_no, yes_no_options};
use crate::actors::{Actor, ActorRole};
use crate::channels::Reply;
use crate::error::EngineError;
use crate::tasks::StepData;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationStep {
    #[default]
    Name,
    Email,
    BusinessName,
    Confirm,
}

impl RegistrationStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Email => "email",
            Self::BusinessName => "business_name",
            Self::Confirm => "confirm",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistrationData {
    pub step: RegistrationStep,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business_name: Option<String>,
}

impl RegistrationData {
    /// Start with a known name (an invited client completing their profile).
    pub fn prefilled(name: Option<String>) -> Self {
        match name {
            Some(name) => Self {
                step: RegistrationStep::Email,
                name: Some(name),
                ..Self::default()
            },
            None => Self::default(),
        }
    }
}

pub fn handle(
    ctx: &FlowContext<'_>,
    input: &str,
    data: &RegistrationData,
) -> Result<StepOutcome, EngineError> {
    let mut next = data.clone();
    match data.step {
        RegistrationStep::Name => {
            next.name = Some(ctx.validator.validate(Field::Name, input)?);
            next.step = RegistrationStep::Email;
        }
        RegistrationStep::Email => {
            next.email = if input.trim().eq_ignore_ascii_case("skip") {
                None
            } else {
                Some(ctx.validator.validate(Field::Email, input)?)
            };
            next.step = match ctx.actor_role {
                ActorRole::Initiator => RegistrationStep::BusinessName,
                ActorRole::Target => RegistrationStep::Confirm,
            };
        }
        RegistrationStep::BusinessName => {
            next.business_name = Some(ctx.validator.validate(Field::BusinessName, input)?);
            next.step = RegistrationStep::Confirm;
        }
        RegistrationStep::Confirm => {
            return Ok(match parse_yes_no(input) {
                Some(true) => {
                    let Some(name) = data.name.clone() else {
                        return Err(EngineError::InvalidState(
                            "registration confirmed without a name".into(),
                        ));
                    };
                    let actor = Actor::new(ctx.actor_key, ctx.actor_role, name)
                        .with_email(data.email.clone())
                        .with_business_name(data.business_name.clone());
                    StepOutcome::Complete(Completion::RegisterActor(actor))
                }
                Some(false) => StepOutcome::Cancel {
                    message: "Registration cancelled. Send 'register' whenever you're ready."
                        .into(),
                },
                None => StepOutcome::Reprompt {
                    message: "Please tap Confirm or Cancel.".into(),
                },
            });
        }
    }
    Ok(StepOutcome::Advance {
        data: StepData::Registration(next),
    })
}

pub fn prompt(data: &RegistrationData) -> Reply {
    match data.step {
        RegistrationStep::Name => Reply::text("Let's get you set up. What's your full name?"),
        RegistrationStep::Email => Reply::text(
            "What's your email address? Reply 'skip' if you'd rather not share it.",
        ),
        RegistrationStep::BusinessName => {
            Reply::text("What's the name of your training business?")
        }
        RegistrationStep::Confirm => {
            let mut summary = format!(
                "Please confirm your details:\nName: {}\nEmail: {}",
                data.name.as_deref().unwrap_or("-"),
                data.email.as_deref().unwrap_or("-"),
            );
            if let Some(business) = &data.business_name {
                summary.push_str(&format!("\nBusiness: {business}"));
            }
            Reply::choice(summary, yes_no_options("Confirm", "Cancel"))
        }
    }
}
