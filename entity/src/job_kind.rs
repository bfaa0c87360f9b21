use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// The kind of remote processing a metered job requests.
#[derive(
    Debug, Clone, Copy, Eq, PartialEq, EnumIter, Deserialize, Serialize, DeriveActiveEnum, ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
pub enum JobKind {
    #[sea_orm(string_value = "transcription")]
    Transcription,
    #[sea_orm(string_value = "summarization")]
    Summarization,
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobKind::Transcription => write!(fmt, "transcription"),
            JobKind::Summarization => write!(fmt, "summarization"),
        }
    }
}
