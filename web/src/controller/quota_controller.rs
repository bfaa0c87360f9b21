use crate::controller::ApiResponse;
use crate::error::ErrorBody;
use crate::extractors::authenticated_account::AuthenticatedAccount;
use crate::response::BalanceResponse;
use crate::{AppState, Error};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

/// GET the caller's remaining units
#[utoipa::path(
    get,
    path = "/quota",
    responses(
        (status = 200, description = "The account's current balance", body = BalanceResponse),
        (status = 401, description = "Missing or invalid bearer token", body = ErrorBody),
        (status = 404, description = "No quota record for the account", body = ErrorBody)
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn read(
    AuthenticatedAccount(account_id): AuthenticatedAccount,
    State(app_state): State<AppState>,
) -> Result<impl IntoResponse, Error> {
    let balance = app_state.ledger.balance(account_id).await?;

    Ok(Json(ApiResponse::new(
        StatusCode::OK.into(),
        BalanceResponse::from(balance),
    )))
}
