//! Response DTOs combining domain models with the account's balance.

use domain::quota::Balance;
use domain::{jobs, Id};
use serde::Serialize;
use utoipa::ToSchema;

/// An account's allowance
#[derive(Debug, Clone, Copy, Serialize, ToSchema)]
pub struct BalanceResponse {
    pub remaining_units: i32,
    pub unlimited: bool,
}

impl From<Balance> for BalanceResponse {
    fn from(balance: Balance) -> Self {
        Self {
            remaining_units: balance.remaining_units,
            unlimited: balance.unlimited,
        }
    }
}

/// A completed metered job together with the balance left after it
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct JobResultResponse {
    #[schema(value_type = Uuid)]
    pub job_id: Id,
    pub result: String,
    pub remaining_units: i32,
    pub unlimited: bool,
}

impl JobResultResponse {
    pub fn new(job: jobs::Model, balance: Balance) -> Self {
        Self {
            job_id: job.id,
            result: job.result.unwrap_or_default(),
            remaining_units: balance.remaining_units,
            unlimited: balance.unlimited,
        }
    }
}
