pub(crate) mod admin_key;
pub(crate) mod authenticated_account;

use crate::error::ErrorBody;
use axum::http::StatusCode;
use axum::Json;

type RejectionType = (StatusCode, Json<ErrorBody>);
