use crate::controller::ApiResponse;
use crate::error::ErrorBody;
use crate::extractors::admin_key::AdminKey;
use crate::params::account::{CreateParams, GrantUnitsParams};
use crate::response::BalanceResponse;
use crate::{AppState, Error};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use domain::Id;
use log::*;

/// POST open a quota record for an account
#[utoipa::path(
    post,
    path = "/accounts",
    request_body = CreateParams,
    responses(
        (status = 201, description = "The account was opened", body = BalanceResponse),
        (status = 401, description = "Missing or invalid admin key", body = ErrorBody),
        (status = 409, description = "The account already exists", body = ErrorBody)
    ),
    security(
        ("admin_key" = [])
    )
)]
pub async fn create(
    _admin: AdminKey,
    State(app_state): State<AppState>,
    Json(params): Json<CreateParams>,
) -> Result<impl IntoResponse, Error> {
    debug!("POST open account {}", params.account_id);

    let balance = app_state
        .ledger
        .open_account(params.account_id, params.units)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::new(
            StatusCode::CREATED.into(),
            BalanceResponse::from(balance),
        )),
    ))
}

/// POST add units to an account
#[utoipa::path(
    post,
    path = "/accounts/{id}/units",
    params(
        ("id" = String, Path, description = "Account id")
    ),
    request_body = GrantUnitsParams,
    responses(
        (status = 200, description = "The balance after the grant", body = BalanceResponse),
        (status = 400, description = "Units must be positive", body = ErrorBody),
        (status = 401, description = "Missing or invalid admin key", body = ErrorBody),
        (status = 404, description = "No quota record for the account", body = ErrorBody)
    ),
    security(
        ("admin_key" = [])
    )
)]
pub async fn grant_units(
    _admin: AdminKey,
    State(app_state): State<AppState>,
    Path(id): Path<Id>,
    Json(params): Json<GrantUnitsParams>,
) -> Result<impl IntoResponse, Error> {
    debug!("POST grant {} units to account {id}", params.units);

    let balance = app_state.ledger.grant_units(id, params.units).await?;

    Ok(Json(ApiResponse::new(
        StatusCode::OK.into(),
        BalanceResponse::from(balance),
    )))
}

/// PUT make an account unlimited
#[utoipa::path(
    put,
    path = "/accounts/{id}/unlimited",
    params(
        ("id" = String, Path, description = "Account id")
    ),
    responses(
        (status = 200, description = "The account is unlimited", body = BalanceResponse),
        (status = 401, description = "Missing or invalid admin key", body = ErrorBody),
        (status = 404, description = "No quota record for the account", body = ErrorBody)
    ),
    security(
        ("admin_key" = [])
    )
)]
pub async fn mark_unlimited(
    _admin: AdminKey,
    State(app_state): State<AppState>,
    Path(id): Path<Id>,
) -> Result<impl IntoResponse, Error> {
    info!("PUT mark account {id} unlimited");

    let balance = app_state.ledger.mark_unlimited(id).await?;

    Ok(Json(ApiResponse::new(
        StatusCode::OK.into(),
        BalanceResponse::from(balance),
    )))
}

/// DELETE return an account to metered use
#[utoipa::path(
    delete,
    path = "/accounts/{id}/unlimited",
    params(
        ("id" = String, Path, description = "Account id")
    ),
    responses(
        (status = 200, description = "The account is metered again", body = BalanceResponse),
        (status = 401, description = "Missing or invalid admin key", body = ErrorBody),
        (status = 404, description = "No quota record for the account", body = ErrorBody)
    ),
    security(
        ("admin_key" = [])
    )
)]
pub async fn mark_limited(
    _admin: AdminKey,
    State(app_state): State<AppState>,
    Path(id): Path<Id>,
) -> Result<impl IntoResponse, Error> {
    info!("DELETE unlimited flag of account {id}");

    let balance = app_state.ledger.mark_limited(id).await?;

    Ok(Json(ApiResponse::new(
        StatusCode::OK.into(),
        BalanceResponse::from(balance),
    )))
}
