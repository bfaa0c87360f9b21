use std::error::Error as StdError;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

use domain::error::{
    DomainErrorKind, EntityErrorKind, Error as DomainError, InternalErrorKind, JobErrorKind,
    QuotaErrorKind,
};

extern crate log;
use log::*;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug)]
pub struct Error(DomainError);

impl StdError for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> core::result::Result<(), std::fmt::Error> {
        write!(fmt, "{self:?}")
    }
}

/// Body of every error response.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    pub status_code: u16,
    /// Stable machine readable code, e.g. `no_remaining_units`
    #[schema(value_type = String)]
    pub error: &'static str,
    pub message: String,
}

impl ErrorBody {
    pub(crate) fn response(
        status: StatusCode,
        error: &'static str,
        message: impl Into<String>,
    ) -> (StatusCode, Json<ErrorBody>) {
        (
            status,
            Json(ErrorBody {
                status_code: status.as_u16(),
                error,
                message: message.into(),
            }),
        )
    }
}

// List of possible StatusCode variants https://docs.rs/http/latest/http/status/struct.StatusCode.html#associatedconstant.UNPROCESSABLE_ENTITY
impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, code, message) = match self.0.error_kind {
            DomainErrorKind::Quota(quota_error_kind) => match quota_error_kind {
                QuotaErrorKind::NoRemainingUnits => (
                    StatusCode::FORBIDDEN,
                    "no_remaining_units",
                    "No remaining units; upgrade your subscription to continue".to_owned(),
                ),
                QuotaErrorKind::AccountNotFound => (
                    StatusCode::NOT_FOUND,
                    "account_not_found",
                    "No quota record exists for this account".to_owned(),
                ),
            },
            DomainErrorKind::Job(job_error_kind) => match job_error_kind {
                JobErrorKind::SubmissionFailed(detail) => {
                    (StatusCode::BAD_GATEWAY, "job_submission_failed", detail)
                }
                JobErrorKind::RemoteFailure(detail) => {
                    (StatusCode::BAD_GATEWAY, "job_remote_failure", detail)
                }
                JobErrorKind::TimedOut(detail) => {
                    (StatusCode::GATEWAY_TIMEOUT, "job_timed_out", detail)
                }
                JobErrorKind::Cancelled => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "The job was cancelled".to_owned(),
                ),
            },
            DomainErrorKind::Internal(InternalErrorKind::Entity(entity_error_kind)) => {
                match entity_error_kind {
                    EntityErrorKind::NotFound => {
                        (StatusCode::NOT_FOUND, "not_found", "Not found".to_owned())
                    }
                    EntityErrorKind::Invalid => (
                        StatusCode::BAD_REQUEST,
                        "bad_request",
                        "Invalid request".to_owned(),
                    ),
                    EntityErrorKind::Conflict => (
                        StatusCode::CONFLICT,
                        "conflict",
                        "The record already exists".to_owned(),
                    ),
                    other => {
                        error!("Entity error: {other:?}: {:?}", self.0.source);
                        internal_error()
                    }
                }
            }
            other => {
                error!("Internal error: {other:?}: {:?}", self.0.source);
                internal_error()
            }
        };

        ErrorBody::response(status, code, message).into_response()
    }
}

fn internal_error() -> (StatusCode, &'static str, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal_error",
        "Internal server error".to_owned(),
    )
}

impl<E> From<E> for Error
where
    E: Into<DomainError>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
