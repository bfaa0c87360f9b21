//! Provider implementations of [`job_client::JobClient`].
//!
//! Each provider maps its HTTP failures onto [`job_client::Error`] through the helpers
//! below, so the lifecycle sees the same transient/permanent split for every provider.

use job_client::Error;
use log::*;
use reqwest::{Response, StatusCode};

pub mod assembly_ai;
pub mod groq;

pub(crate) fn request_error(err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::Timeout(err.to_string())
    } else if err.is_decode() {
        Error::Deserialization(err.to_string())
    } else if err.is_connect() || err.is_request() {
        Error::Network(err.to_string())
    } else {
        Error::Other(Box::new(err))
    }
}

/// Passes successful responses through and turns every other status into an error.
pub(crate) async fn check_status(provider: &str, response: Response) -> Result<Response, Error> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after_seconds = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(1);
    let body = response.text().await.unwrap_or_default();
    warn!("{provider} answered {status}: {body}");

    let message = format!("{provider} answered {status}: {body}");
    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::Authentication(message),
        StatusCode::NOT_FOUND => Error::NotFound(message),
        StatusCode::TOO_MANY_REQUESTS => Error::RateLimited {
            retry_after_seconds,
        },
        status if status.is_server_error() => Error::Network(message),
        _ => Error::Provider(message),
    })
}
