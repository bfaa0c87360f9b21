use crate::error::ErrorBody;
use crate::extractors::RejectionType;
use crate::{AppState, ADMIN_KEY_HEADER};
use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
};
use log::*;

/// Guards the account endpoints used by the subscription collaborator.
pub(crate) struct AdminKey;

impl FromRequestParts<AppState> for AdminKey {
    type Rejection = RejectionType;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(presented) = parts.headers.get(ADMIN_KEY_HEADER) else {
            return Err(ErrorBody::response(
                StatusCode::UNAUTHORIZED,
                "missing_auth_header",
                format!("{ADMIN_KEY_HEADER} header is required"),
            ));
        };

        let Some(expected) = state.config().admin_api_key() else {
            warn!("Admin request rejected: no admin API key is configured");
            return Err(ErrorBody::response(
                StatusCode::UNAUTHORIZED,
                "invalid_token",
                "Invalid admin key",
            ));
        };

        if presented.as_bytes() != expected.as_bytes() {
            warn!("Admin request rejected: key mismatch");
            return Err(ErrorBody::response(
                StatusCode::UNAUTHORIZED,
                "invalid_token",
                "Invalid admin key",
            ));
        }

        Ok(AdminKey)
    }
}
