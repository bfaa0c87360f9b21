use crate::{controller::health_check_controller, error::ErrorBody, params, response, AppState};
use crate::ADMIN_KEY_HEADER;
use axum::{
    routing::{get, post, put},
    Router,
};

use crate::controller::{
    account_controller, job_controller, quota_controller, summary_controller,
    transcription_controller,
};

use utoipa::{
    openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_rapidoc::RapiDoc;

// This is the global definition of our OpenAPI spec. To be a part
// of the rendered spec, a path and schema must be listed here.
#[derive(OpenApi)]
#[openapi(
        info(
            title = "Scribe Meter API"
        ),
        paths(
            health_check_controller::health_check,
            transcription_controller::transcribe,
            transcription_controller::transcribe_video,
            summary_controller::summarize,
            quota_controller::read,
            job_controller::index,
            job_controller::read,
            account_controller::create,
            account_controller::grant_units,
            account_controller::mark_unlimited,
            account_controller::mark_limited,
        ),
        components(
            schemas(
                domain::jobs::Model,
                ErrorBody,
                params::account::CreateParams,
                params::account::GrantUnitsParams,
                params::summary::SummarizeParams,
                response::BalanceResponse,
                response::JobResultResponse,
            )
        ),
        modifiers(&SecurityAddon),
        tags(
            (name = "scribe_meter", description = "Metered transcription and summarization API")
        )
    )]
struct ApiDoc;

struct SecurityAddon;

// Account endpoints take a bearer JWT; the subscription endpoints take the static admin key.
impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
            components.add_security_scheme(
                "admin_key",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::with_description(
                    ADMIN_KEY_HEADER,
                    "Static key of the subscription service",
                ))),
            );
        }
    }
}

pub fn define_routes(app_state: AppState) -> Router {
    Router::new()
        .merge(health_routes())
        .merge(transcription_routes(app_state.clone()))
        .merge(summary_routes(app_state.clone()))
        .merge(quota_routes(app_state.clone()))
        .merge(job_routes(app_state.clone()))
        .merge(account_routes(app_state))
        .merge(RapiDoc::with_openapi("/api-docs/openapi.json", ApiDoc::openapi()).path("/rapidoc"))
}

fn health_routes() -> Router {
    Router::new().route("/health", get(health_check_controller::health_check))
}

fn transcription_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/transcribe", post(transcription_controller::transcribe))
        .route(
            "/transcribe/video",
            post(transcription_controller::transcribe_video),
        )
        .with_state(app_state)
}

fn summary_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/summarize", post(summary_controller::summarize))
        .with_state(app_state)
}

fn quota_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/quota", get(quota_controller::read))
        .with_state(app_state)
}

fn job_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/jobs", get(job_controller::index))
        .route("/jobs/{id}", get(job_controller::read))
        .with_state(app_state)
}

/// Routes the subscription service uses to manage account allowances
fn account_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/accounts", post(account_controller::create))
        .route("/accounts/{id}/units", post(account_controller::grant_units))
        .route(
            "/accounts/{id}/unlimited",
            put(account_controller::mark_unlimited).delete(account_controller::mark_limited),
        )
        .with_state(app_state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use axum::response::Response;
    use clap::Parser;
    use domain::{jwt, Id, JobClient, PollStatus};
    use futures_util::stream::{self, StreamExt};
    use job_client::MockJobClient;
    use serde_json::{json, Value};
    use service::config::Config;
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    const SECRET: &str = "test-secret";
    const ADMIN_KEY: &str = "test-admin-key";
    const BOUNDARY: &str = "scribe-boundary";

    struct TestApp {
        router: Router,
        staging: tempfile::TempDir,
    }

    fn test_config(staging: &Path) -> Config {
        let mut config = Config::parse_from(["scribe_meter"])
            .set_jwt_secret(SECRET.to_owned())
            .set_admin_api_key(ADMIN_KEY.to_owned())
            .set_staging_dir(staging.to_path_buf());
        config.poll_interval_secs = 0;
        config.default_units = 15;
        config
    }

    fn unused_client() -> Arc<dyn JobClient> {
        let mut client = MockJobClient::new();
        client
            .expect_provider_id()
            .return_const("stub".to_owned());
        Arc::new(client)
    }

    fn completing_client(result: &'static str) -> Arc<dyn JobClient> {
        let mut client = MockJobClient::new();
        client
            .expect_provider_id()
            .return_const("stub".to_owned());
        client
            .expect_submit()
            .times(1)
            .returning(|_| Ok("remote-1".to_owned()));
        client
            .expect_poll()
            .returning(move |_| Ok(PollStatus::completed(result)));
        Arc::new(client)
    }

    async fn test_app(transcriber: Arc<dyn JobClient>, summarizer: Arc<dyn JobClient>) -> TestApp {
        let staging = tempfile::tempdir().unwrap();
        let db = Arc::new(entity_api::testing::connect().await);
        let services = service::AppState::new(test_config(staging.path()), &db);

        TestApp {
            router: define_routes(AppState::new(services, transcriber, summarizer)),
            staging,
        }
    }

    fn token_for(account_id: Id) -> String {
        let token = jwt::encode_token(account_id, SECRET, Duration::from_secs(60)).unwrap();
        format!("Bearer {token}")
    }

    async fn send(app: &TestApp, request: Request<Body>) -> (StatusCode, Value) {
        let response: Response = app.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&body).unwrap_or(Value::Null);
        (status, value)
    }

    async fn open_account(app: &TestApp, account_id: Id, units: Option<i32>) {
        let request = Request::builder()
            .method("POST")
            .uri("/accounts")
            .header(ADMIN_KEY_HEADER, ADMIN_KEY)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                json!({ "account_id": account_id, "units": units }).to_string(),
            ))
            .unwrap();

        let (status, _) = send(app, request).await;
        assert_eq!(status, StatusCode::CREATED);
    }

    fn summarize_request(account_id: Id) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/summarize")
            .header(header::AUTHORIZATION, token_for(account_id))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json!({ "text": "the lecture" }).to_string()))
            .unwrap()
    }

    fn upload_request(uri: &str, account_id: Id, field: &str, file_name: &str) -> Request<Body> {
        let body = format!(
            "--{BOUNDARY}\r\n\
             Content-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\n\
             Content-Type: application/octet-stream\r\n\r\n\
             media bytes\r\n\
             --{BOUNDARY}--\r\n"
        );

        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::AUTHORIZATION, token_for(account_id))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn health_check_responds() {
        let app = test_app(unused_client(), unused_client()).await;
        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();

        let response = app.router.clone().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn requests_without_a_valid_bearer_token_are_rejected() {
        let app = test_app(unused_client(), unused_client()).await;

        let missing = Request::builder().uri("/quota").body(Body::empty()).unwrap();
        let (status, body) = send(&app, missing).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "missing_auth_header");

        let basic = Request::builder()
            .uri("/quota")
            .header(header::AUTHORIZATION, "Basic dXNlcjpwYXNz")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&app, basic).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "invalid_auth_format");

        let forged = Request::builder()
            .uri("/quota")
            .header(header::AUTHORIZATION, "Bearer not.a.token")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&app, forged).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "invalid_token");
    }

    #[tokio::test]
    async fn account_endpoints_require_the_admin_key() {
        let app = test_app(unused_client(), unused_client()).await;
        let request = Request::builder()
            .method("POST")
            .uri("/accounts")
            .header(ADMIN_KEY_HEADER, "wrong")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json!({ "account_id": Id::new_v4() }).to_string()))
            .unwrap();

        let (status, body) = send(&app, request).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "invalid_token");
    }

    #[tokio::test]
    async fn new_accounts_get_the_default_allowance() {
        let app = test_app(unused_client(), unused_client()).await;
        let account_id = Id::new_v4();
        open_account(&app, account_id, None).await;

        let request = Request::builder()
            .uri("/quota")
            .header(header::AUTHORIZATION, token_for(account_id))
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&app, request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"], json!({ "remaining_units": 15, "unlimited": false }));
    }

    #[tokio::test]
    async fn unknown_accounts_are_reported() {
        let app = test_app(unused_client(), unused_client()).await;

        let (status, body) = send(&app, summarize_request(Id::new_v4())).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "account_not_found");
    }

    #[tokio::test]
    async fn summaries_consume_one_unit() {
        let app = test_app(unused_client(), completing_client("S")).await;
        let account_id = Id::new_v4();
        open_account(&app, account_id, Some(2)).await;

        let (status, body) = send(&app, summarize_request(account_id)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["result"], "S");
        assert_eq!(body["data"]["remaining_units"], 1);
        assert_eq!(body["data"]["unlimited"], false);
    }

    #[tokio::test]
    async fn exhausted_accounts_are_denied() {
        let app = test_app(unused_client(), unused_client()).await;
        let account_id = Id::new_v4();
        open_account(&app, account_id, Some(0)).await;

        let (status, body) = send(&app, summarize_request(account_id)).await;

        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "no_remaining_units");
        assert_eq!(body["status_code"], 403);
    }

    #[tokio::test]
    async fn transcriptions_are_staged_run_and_reaped() {
        let app = test_app(completing_client("R"), unused_client()).await;
        let account_id = Id::new_v4();
        open_account(&app, account_id, None).await;

        let (status, body) = send(
            &app,
            upload_request("/transcribe", account_id, "audio", "lecture.mp3"),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["result"], "R");
        assert_eq!(body["data"]["remaining_units"], 14);
        assert_eq!(
            std::fs::read_dir(app.staging.path()).unwrap().count(),
            0,
            "staging directory should be empty"
        );
    }

    #[tokio::test]
    async fn interrupted_uploads_leave_nothing_staged() {
        let app = test_app(unused_client(), unused_client()).await;
        let account_id = Id::new_v4();
        open_account(&app, account_id, None).await;

        let partial = format!(
            "--{BOUNDARY}\r\n\
             Content-Disposition: form-data; name=\"audio\"; filename=\"lecture.mp3\"\r\n\
             Content-Type: application/octet-stream\r\n\r\n\
             {}",
            "a".repeat(8 * 1024)
        );
        let body = stream::iter([Ok::<_, std::io::Error>(partial)]).chain(stream::pending());
        let request = Request::builder()
            .method("POST")
            .uri("/transcribe")
            .header(header::AUTHORIZATION, token_for(account_id))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from_stream(body))
            .unwrap();

        let router = app.router.clone();
        let upload = tokio::spawn(async move { router.oneshot(request).await });

        let staged = || std::fs::read_dir(app.staging.path()).unwrap().count();
        for _ in 0..200 {
            if staged() > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(staged(), 1, "the upload should have started staging");

        upload.abort();
        assert!(upload.await.unwrap_err().is_cancelled());

        assert_eq!(staged(), 0, "staging directory should be empty");
    }

    #[tokio::test]
    async fn the_video_endpoint_ignores_audio_fields() {
        let app = test_app(unused_client(), unused_client()).await;
        let account_id = Id::new_v4();
        open_account(&app, account_id, None).await;

        let (status, body) = send(
            &app,
            upload_request("/transcribe/video", account_id, "audio", "lecture.mp3"),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "bad_request");
        assert_eq!(std::fs::read_dir(app.staging.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn jobs_are_listed_for_their_account_only() {
        let app = test_app(unused_client(), completing_client("S")).await;
        let account_id = Id::new_v4();
        open_account(&app, account_id, None).await;
        let (_, body) = send(&app, summarize_request(account_id)).await;
        let job_id = body["data"]["job_id"].as_str().unwrap().to_owned();

        let index = Request::builder()
            .uri("/jobs")
            .header(header::AUTHORIZATION, token_for(account_id))
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&app, index).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"].as_array().unwrap().len(), 1);
        assert_eq!(body["data"][0]["result"], "S");
        assert_eq!(body["data"][0]["state"], "cleaned_up");

        let stranger = Request::builder()
            .uri(format!("/jobs/{job_id}"))
            .header(header::AUTHORIZATION, token_for(Id::new_v4()))
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&app, stranger).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "not_found");
    }

    #[tokio::test]
    async fn unlimited_accounts_are_not_charged() {
        let app = test_app(unused_client(), completing_client("S")).await;
        let account_id = Id::new_v4();
        open_account(&app, account_id, Some(0)).await;

        let unlimited = Request::builder()
            .method("PUT")
            .uri(format!("/accounts/{account_id}/unlimited"))
            .header(ADMIN_KEY_HEADER, ADMIN_KEY)
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(&app, unlimited).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(&app, summarize_request(account_id)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["remaining_units"], 0);
        assert_eq!(body["data"]["unlimited"], true);
    }
}
