use crate::response::JobResultResponse;
use crate::{AppState, Error};
use domain::error::{DomainErrorKind, Error as DomainError, InternalErrorKind};
use domain::{Id, JobClient, Payload};
use log::*;
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub(crate) mod account_controller;
pub(crate) mod health_check_controller;
pub(crate) mod job_controller;
pub(crate) mod quota_controller;
pub(crate) mod summary_controller;
pub(crate) mod transcription_controller;

#[derive(Debug, Serialize)]
struct ApiResponse<T: Serialize> {
    status_code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(status_code: u16, data: T) -> Self {
        Self {
            status_code,
            data: Some(data),
        }
    }
}

/// Runs a metered job on its own task and waits for it.
///
/// The job is cancelled when the request goes away, which still settles its charge and
/// reaps its inputs.
async fn run_metered_job(
    app_state: &AppState,
    account_id: Id,
    payload: Payload,
    client: Arc<dyn JobClient>,
) -> Result<JobResultResponse, Error> {
    let cancel = CancellationToken::new();
    let _cancel_on_drop = cancel.clone().drop_guard();

    let lifecycle = app_state.lifecycle.clone();
    let handle =
        tokio::spawn(async move { lifecycle.run(account_id, payload, client, cancel).await });

    let job = handle.await.map_err(|e| {
        error!("Job task for account {account_id} panicked: {e}");
        DomainError {
            source: Some(Box::new(e)),
            error_kind: DomainErrorKind::Internal(InternalErrorKind::Other(
                "job task failed".to_string(),
            )),
        }
    })??;

    let balance = app_state.ledger.balance(account_id).await?;

    Ok(JobResultResponse::new(job, balance))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn test_serialize_api_response_with_some() {
        let response = ApiResponse {
            status_code: StatusCode::OK.into(),
            data: Some(23),
        };
        let serialized = serde_json::to_string(&response).unwrap();

        // Serializing and then deserializing because the string output from serde_json::to_string is
        // non-deterministic as far as the order of the JSON keys. This ensures the test won't be flaky
        let deserialized_value: serde_json::Value = serde_json::from_str(&serialized).unwrap();
        let deserialized_expected_value: serde_json::Value =
            json!({"data": 23, "status_code": 200});
        assert_eq!(deserialized_value, deserialized_expected_value);
    }
}
