use crate::controller::{run_metered_job, ApiResponse};
use crate::error::ErrorBody;
use crate::extractors::authenticated_account::AuthenticatedAccount;
use crate::params::summary::SummarizeParams;
use crate::response::JobResultResponse;
use crate::{AppState, Error};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use domain::Payload;
use log::*;

/// POST summarize a lecture transcript
#[utoipa::path(
    post,
    path = "/summarize",
    request_body = SummarizeParams,
    responses(
        (status = 200, description = "The summary and the remaining balance", body = JobResultResponse),
        (status = 400, description = "Empty text", body = ErrorBody),
        (status = 401, description = "Missing or invalid bearer token", body = ErrorBody),
        (status = 403, description = "No remaining units", body = ErrorBody),
        (status = 502, description = "The summarization provider failed", body = ErrorBody),
        (status = 504, description = "The summary did not finish in time", body = ErrorBody)
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn summarize(
    AuthenticatedAccount(account_id): AuthenticatedAccount,
    State(app_state): State<AppState>,
    Json(params): Json<SummarizeParams>,
) -> Result<impl IntoResponse, Error> {
    debug!(
        "POST summarize {} characters in {} for account {account_id}",
        params.text.len(),
        params.language
    );

    if params.text.trim().is_empty() {
        return Ok(ErrorBody::response(
            StatusCode::BAD_REQUEST,
            "bad_request",
            "Text to summarize is required",
        )
        .into_response());
    }

    let payload = Payload::Text {
        text: params.text,
        language: params.language,
    };
    let summarizer = app_state.summarizer.clone();
    let job = run_metered_job(&app_state, account_id, payload, summarizer).await?;

    Ok(Json(ApiResponse::new(StatusCode::OK.into(), job)).into_response())
}
