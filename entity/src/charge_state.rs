use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// What a job owes the account's quota record.
///
/// `Reserved` and `Charged` are pending states that get settled exactly once when the
/// job reaches a terminal state: a reservation is either committed or released, an
/// up-front charge is either kept (committed) or refunded.
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
pub enum ChargeState {
    /// The account is unlimited, nothing is owed
    #[sea_orm(string_value = "unmetered")]
    #[default]
    Unmetered,
    #[sea_orm(string_value = "reserved")]
    Reserved,
    /// The unit was spent at admission
    #[sea_orm(string_value = "charged")]
    Charged,
    #[sea_orm(string_value = "committed")]
    Committed,
    #[sea_orm(string_value = "released")]
    Released,
    #[sea_orm(string_value = "refunded")]
    Refunded,
}

impl ChargeState {
    pub const SETTLED: [ChargeState; 4] = [
        ChargeState::Unmetered,
        ChargeState::Committed,
        ChargeState::Released,
        ChargeState::Refunded,
    ];

    pub fn is_settled(&self) -> bool {
        Self::SETTLED.contains(self)
    }
}

impl std::fmt::Display for ChargeState {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChargeState::Unmetered => write!(fmt, "unmetered"),
            ChargeState::Reserved => write!(fmt, "reserved"),
            ChargeState::Charged => write!(fmt, "charged"),
            ChargeState::Committed => write!(fmt, "committed"),
            ChargeState::Released => write!(fmt, "released"),
            ChargeState::Refunded => write!(fmt, "refunded"),
        }
    }
}
