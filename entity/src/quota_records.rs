//! SeaORM Entity for the quota_records table.
//! One row per account holding its metered usage allowance.

use crate::Id;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[schema(as = entity::quota_records::Model)]
#[sea_orm(table_name = "quota_records")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    #[schema(value_type = uuid::Uuid)]
    pub account_id: Id,

    /// Units the account may still spend, reserved units included
    pub remaining_units: i32,

    /// Units spoken for by jobs that have not resolved yet
    pub reserved_units: i32,

    /// Unlimited accounts are admitted without touching either counter
    pub unlimited: bool,

    /// Bumped by every mutation
    pub version: i64,

    #[serde(skip_deserializing)]
    #[schema(value_type = String, format = DateTime)]
    pub created_at: DateTimeWithTimeZone,

    #[serde(skip_deserializing)]
    #[schema(value_type = String, format = DateTime)]
    pub updated_at: DateTimeWithTimeZone,
}

impl Model {
    /// Units that a new job could still be admitted against.
    pub fn available_units(&self) -> i32 {
        self.remaining_units - self.reserved_units
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::jobs::Entity")]
    Jobs,
}

impl Related<super::jobs::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Jobs.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
