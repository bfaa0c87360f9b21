use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Lifecycle state of a metered job.
///
/// `Created → Submitted → Polling → {Completed | Failed | TimedOut} → CleanedUp`, with
/// `Created → Failed` when the remote system rejects the submission.
#[derive(
    Debug,
    Clone,
    Copy,
    Eq,
    PartialEq,
    EnumIter,
    Deserialize,
    Default,
    Serialize,
    DeriveActiveEnum,
    ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
pub enum JobState {
    #[sea_orm(string_value = "created")]
    #[default]
    Created,
    /// Accepted by the remote system, not yet polled
    #[sea_orm(string_value = "submitted")]
    Submitted,
    #[sea_orm(string_value = "polling")]
    Polling,
    #[sea_orm(string_value = "completed")]
    Completed,
    #[sea_orm(string_value = "failed")]
    Failed,
    #[sea_orm(string_value = "timed_out")]
    TimedOut,
    /// Terminal bookkeeping state: the charge is settled and the input artifacts are gone
    #[sea_orm(string_value = "cleaned_up")]
    CleanedUp,
}

impl JobState {
    /// States a job may still leave through a poll result or a timeout.
    pub const ACTIVE: [JobState; 3] = [JobState::Created, JobState::Submitted, JobState::Polling];

    /// States whose outcome is known but whose resources may not be released yet.
    pub const TERMINAL: [JobState; 3] = [JobState::Completed, JobState::Failed, JobState::TimedOut];

    pub fn is_active(&self) -> bool {
        Self::ACTIVE.contains(self)
    }

    pub fn is_terminal(&self) -> bool {
        Self::TERMINAL.contains(self)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobState::Created => write!(fmt, "created"),
            JobState::Submitted => write!(fmt, "submitted"),
            JobState::Polling => write!(fmt, "polling"),
            JobState::Completed => write!(fmt, "completed"),
            JobState::Failed => write!(fmt, "failed"),
            JobState::TimedOut => write!(fmt, "timed_out"),
            JobState::CleanedUp => write!(fmt, "cleaned_up"),
        }
    }
}
