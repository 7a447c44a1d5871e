//! Button ids: a closed `action:target` vocabulary parsed once at the boundary.

use std::str::FromStr;

use crate::tasks::TaskType;

/// Structured action carried by a button tap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ButtonAction {
    AcceptInvitation(String),
    DeclineInvitation(String),
    /// Keep going after a reminder.
    ContinueTask(TaskType),
    /// Drop the running task and start it again from the first step.
    RestartTask(TaskType),
    /// Restore an abandoned snapshot.
    ResumeTask(TaskType),
    /// Discard an abandoned snapshot and start over.
    StartFresh(TaskType),
    Start(TaskType),
    /// An answer to the current step's question.
    Choice(String),
    Cancel,
}

impl FromStr for ButtonAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "cancel" {
            return Ok(Self::Cancel);
        }
        let (action, target) = s
            .split_once(':')
            .ok_or_else(|| format!("button id without action: {s}"))?;
        if target.is_empty() {
            return Err(format!("button id without target: {s}"));
        }
        let task_type = || target.parse::<TaskType>();
        Ok(match action {
            "accept_invitation" => Self::AcceptInvitation(target.to_string()),
            "decline_invitation" => Self::DeclineInvitation(target.to_string()),
            "continue_task" => Self::ContinueTask(task_type()?),
            "restart_task" => Self::RestartTask(task_type()?),
            "resume_task" => Self::ResumeTask(task_type()?),
            "start_fresh" => Self::StartFresh(task_type()?),
            "start" => Self::Start(task_type()?),
            "choice" => Self::Choice(target.to_string()),
            other => return Err(format!("unknown button action: {other}")),
        })
    }
}

impl std::fmt::Display for ButtonAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AcceptInvitation(token) => write!(f, "accept_invitation:{token}"),
            Self::DeclineInvitation(token) => write!(f, "decline_invitation:{token}"),
            Self::ContinueTask(t) => write!(f, "continue_task:{t}"),
            Self::RestartTask(t) => write!(f, "restart_task:{t}"),
            Self::ResumeTask(t) => write!(f, "resume_task:{t}"),
            Self::StartFresh(t) => write!(f, "start_fresh:{t}"),
            Self::Start(t) => write!(f, "start:{t}"),
            Self::Choice(value) => write!(f, "choice:{value}"),
            Self::Cancel => f.write_str("cancel"),
        }
    }
}
