//! SeaORM Entity for the jobs table.
//! Tracks one metered remote job from admission until its resources are released.

use crate::charge_state::ChargeState;
use crate::job_kind::JobKind;
use crate::job_state::JobState;
use crate::Id;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[schema(as = entity::jobs::Model)]
#[sea_orm(table_name = "jobs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    #[schema(value_type = uuid::Uuid)]
    pub id: Id,

    #[schema(value_type = uuid::Uuid)]
    pub account_id: Id,

    pub kind: JobKind,

    pub state: JobState,

    /// The terminal state the job resolved into, kept once the job is cleaned up
    pub outcome: Option<JobState>,

    pub charge: ChargeState,

    /// Identifier of the provider the job was submitted to (e.g. "assemblyai")
    pub provider: String,

    /// Path of the transient input artifact, if the job has one
    #[serde(skip_serializing)]
    pub input_ref: Option<String>,

    /// Provider assigned identifier, set once the job is submitted
    pub remote_job_id: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub result: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub error_detail: Option<String>,

    /// Past this instant an unresolved job is timed out
    #[schema(value_type = String, format = DateTime)]
    pub deadline_at: DateTimeWithTimeZone,

    #[schema(value_type = Option<String>, format = DateTime)]
    pub last_polled_at: Option<DateTimeWithTimeZone>,

    #[serde(skip_deserializing)]
    #[schema(value_type = String, format = DateTime)]
    pub created_at: DateTimeWithTimeZone,

    #[serde(skip_deserializing)]
    #[schema(value_type = String, format = DateTime)]
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::quota_records::Entity",
        from = "Column::AccountId",
        to = "super::quota_records::Column::AccountId",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    QuotaRecords,
}

impl Related<super::quota_records::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::QuotaRecords.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
