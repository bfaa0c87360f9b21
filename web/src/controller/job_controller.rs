use crate::controller::ApiResponse;
use crate::error::ErrorBody;
use crate::extractors::authenticated_account::AuthenticatedAccount;
use crate::{AppState, Error};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use domain::{job as JobApi, Id};
use log::*;

/// GET all of the caller's jobs, newest first
#[utoipa::path(
    get,
    path = "/jobs",
    responses(
        (status = 200, description = "The account's jobs and their results", body = [domain::jobs::Model]),
        (status = 401, description = "Missing or invalid bearer token", body = ErrorBody)
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn index(
    AuthenticatedAccount(account_id): AuthenticatedAccount,
    State(app_state): State<AppState>,
) -> Result<impl IntoResponse, Error> {
    debug!("GET jobs of account {account_id}");

    let jobs = JobApi::find_by_account_id(app_state.db_conn_ref(), account_id).await?;

    Ok(Json(ApiResponse::new(StatusCode::OK.into(), jobs)))
}

/// GET one of the caller's jobs
#[utoipa::path(
    get,
    path = "/jobs/{id}",
    params(
        ("id" = String, Path, description = "Job id to retrieve")
    ),
    responses(
        (status = 200, description = "The job and its result", body = domain::jobs::Model),
        (status = 401, description = "Missing or invalid bearer token", body = ErrorBody),
        (status = 404, description = "Job not found", body = ErrorBody)
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn read(
    AuthenticatedAccount(account_id): AuthenticatedAccount,
    State(app_state): State<AppState>,
    Path(id): Path<Id>,
) -> Result<impl IntoResponse, Error> {
    let job = JobApi::find_for_account(app_state.db_conn_ref(), account_id, id).await?;

    Ok(Json(ApiResponse::new(StatusCode::OK.into(), job)))
}
