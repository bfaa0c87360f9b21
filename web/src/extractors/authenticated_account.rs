use crate::error::ErrorBody;
use crate::extractors::RejectionType;
use crate::AppState;
use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
};
use domain::{jwt, Id};
use log::*;

/// The account a request is made on behalf of, taken from its bearer JWT.
pub(crate) struct AuthenticatedAccount(pub Id);

impl FromRequestParts<AppState> for AuthenticatedAccount {
    type Rejection = RejectionType;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(header) = parts.headers.get(AUTHORIZATION) else {
            return Err(ErrorBody::response(
                StatusCode::UNAUTHORIZED,
                "missing_auth_header",
                "Authorization header is required",
            ));
        };

        let token = header
            .to_str()
            .ok()
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| {
                ErrorBody::response(
                    StatusCode::UNAUTHORIZED,
                    "invalid_auth_format",
                    "Authorization header must be of the form 'Bearer <token>'",
                )
            })?;

        let Some(secret) = state.config().jwt_secret() else {
            error!("No JWT secret configured; rejecting authenticated request");
            return Err(ErrorBody::response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "Internal server error",
            ));
        };

        match jwt::decode_account_id(token, &secret) {
            Ok(account_id) => {
                trace!("Authenticated account {account_id}");
                Ok(AuthenticatedAccount(account_id))
            }
            Err(_) => Err(ErrorBody::response(
                StatusCode::UNAUTHORIZED,
                "invalid_token",
                "Invalid or expired token",
            )),
        }
    }
}
