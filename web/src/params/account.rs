use domain::Id;
use serde::Deserialize;
use utoipa::ToSchema;

#[derive(Debug, Deserialize, ToSchema)]
pub(crate) struct CreateParams {
    #[schema(value_type = Uuid)]
    pub(crate) account_id: Id,
    /// Initial units; the default free allowance when omitted
    pub(crate) units: Option<i32>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub(crate) struct GrantUnitsParams {
    pub(crate) units: i32,
}
