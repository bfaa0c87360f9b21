use crate::controller::{run_metered_job, ApiResponse};
use crate::error::ErrorBody;
use crate::extractors::authenticated_account::AuthenticatedAccount;
use crate::response::JobResultResponse;
use crate::AppState;
use axum::extract::multipart::{Field, Multipart};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use domain::{Id, Payload};
use log::*;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// Which multipart fields an endpoint accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Accept {
    AudioOrVideo,
    VideoOnly,
}

/// POST transcribe an uploaded audio (or video) file
#[utoipa::path(
    post,
    path = "/transcribe",
    request_body(content_type = "multipart/form-data", description = "An `audio` or `video` file field"),
    responses(
        (status = 200, description = "The transcript and the remaining balance", body = JobResultResponse),
        (status = 400, description = "No audio or video file was uploaded", body = ErrorBody),
        (status = 401, description = "Missing or invalid bearer token", body = ErrorBody),
        (status = 403, description = "No remaining units", body = ErrorBody),
        (status = 502, description = "The transcription provider failed", body = ErrorBody),
        (status = 504, description = "The transcription did not finish in time", body = ErrorBody)
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn transcribe(
    AuthenticatedAccount(account_id): AuthenticatedAccount,
    State(app_state): State<AppState>,
    multipart: Multipart,
) -> Response {
    handle_upload(app_state, account_id, multipart, Accept::AudioOrVideo).await
}

/// POST transcribe the audio track of an uploaded video
#[utoipa::path(
    post,
    path = "/transcribe/video",
    request_body(content_type = "multipart/form-data", description = "A `video` file field"),
    responses(
        (status = 200, description = "The transcript and the remaining balance", body = JobResultResponse),
        (status = 400, description = "No video file was uploaded", body = ErrorBody),
        (status = 401, description = "Missing or invalid bearer token", body = ErrorBody),
        (status = 403, description = "No remaining units", body = ErrorBody),
        (status = 502, description = "The transcription provider failed", body = ErrorBody),
        (status = 504, description = "The transcription did not finish in time", body = ErrorBody)
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn transcribe_video(
    AuthenticatedAccount(account_id): AuthenticatedAccount,
    State(app_state): State<AppState>,
    multipart: Multipart,
) -> Response {
    handle_upload(app_state, account_id, multipart, Accept::VideoOnly).await
}

async fn handle_upload(
    app_state: AppState,
    account_id: Id,
    multipart: Multipart,
    accept: Accept,
) -> Response {
    debug!("POST transcription upload from account {account_id}");

    let staging = StagingDir::new(
        app_state
            .config()
            .staging_dir()
            .join(Id::new_v4().to_string()),
    );

    let payload = match stage_upload(multipart, staging.path(), accept).await {
        Ok(Some(payload)) => payload,
        Ok(None) => {
            let expected = match accept {
                Accept::AudioOrVideo => "an 'audio' or 'video' file field",
                Accept::VideoOnly => "a 'video' file field",
            };
            return ErrorBody::response(
                StatusCode::BAD_REQUEST,
                "bad_request",
                format!("Expected {expected}"),
            )
            .into_response();
        }
        Err(message) => {
            return ErrorBody::response(StatusCode::BAD_REQUEST, "bad_request", message)
                .into_response();
        }
    };

    // From here on the job lifecycle reaps the staged files.
    staging.hand_over();

    let transcriber = app_state.transcriber.clone();
    match run_metered_job(&app_state, account_id, payload, transcriber).await {
        Ok(job) => Json(ApiResponse::new(StatusCode::OK.into(), job)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Streams the first accepted file field into `staging_dir`.
async fn stage_upload(
    mut multipart: Multipart,
    staging_dir: &Path,
    accept: Accept,
) -> Result<Option<Payload>, String> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| format!("Malformed multipart body: {e}"))?
    {
        let is_video = match (field.name(), accept) {
            (Some("audio"), Accept::AudioOrVideo) => false,
            (Some("video"), _) => true,
            _ => continue,
        };

        let path = staging_dir.join(staged_file_name(field.file_name(), is_video));
        write_field(field, staging_dir, &path).await?;
        debug!("Staged upload at {}", path.display());

        return Ok(Some(if is_video {
            Payload::Video { path }
        } else {
            Payload::Audio { path }
        }));
    }

    Ok(None)
}

async fn write_field(mut field: Field<'_>, staging_dir: &Path, path: &Path) -> Result<(), String> {
    tokio::fs::create_dir_all(staging_dir).await.map_err(|e| {
        error!("Failed to create staging directory {}: {e}", staging_dir.display());
        "Failed to stage upload".to_owned()
    })?;

    let mut file = tokio::fs::File::create(path).await.map_err(|e| {
        error!("Failed to create staged file {}: {e}", path.display());
        "Failed to stage upload".to_owned()
    })?;

    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| format!("Failed to read upload: {e}"))?
    {
        file.write_all(&chunk).await.map_err(|e| {
            error!("Failed to write staged file {}: {e}", path.display());
            "Failed to stage upload".to_owned()
        })?;
    }

    file.flush()
        .await
        .map_err(|e| format!("Failed to stage upload: {e}"))
}

// Only the extension of the client's file name is kept.
fn staged_file_name(file_name: Option<&str>, is_video: bool) -> PathBuf {
    let extension = file_name
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(str::to_ascii_lowercase)
        .unwrap_or_else(|| if is_video { "mp4" } else { "mp3" }.to_owned());

    PathBuf::from(format!("input.{extension}"))
}

/// A request's staging directory, removed when dropped unless a job took it over.
///
/// A client that disconnects mid-upload drops the handler future, so the partially
/// written upload is removed here rather than by the reaper.
struct StagingDir {
    path: PathBuf,
    handed_over: bool,
}

impl StagingDir {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            handed_over: false,
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn hand_over(mut self) {
        self.handed_over = true;
    }
}

impl Drop for StagingDir {
    fn drop(&mut self) {
        if self.handed_over {
            return;
        }

        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => debug!("Removed staging directory {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                "Failed to remove staging directory {}: {e}",
                self.path.display()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staged_files_keep_only_a_safe_extension() {
        assert_eq!(
            staged_file_name(Some("../../etc/lecture.WAV"), false),
            PathBuf::from("input.wav")
        );
        assert_eq!(
            staged_file_name(Some("talk.m$4"), true),
            PathBuf::from("input.mp4")
        );
        assert_eq!(staged_file_name(None, false), PathBuf::from("input.mp3"));
    }

    #[test]
    fn staging_dir_is_removed_unless_handed_over() {
        let root = tempfile::tempdir().unwrap();

        let dropped = root.path().join("dropped");
        std::fs::create_dir_all(&dropped).unwrap();
        std::fs::write(dropped.join("input.mp3"), b"partial").unwrap();
        drop(StagingDir::new(dropped.clone()));
        assert!(!dropped.exists());

        let kept = root.path().join("kept");
        std::fs::create_dir_all(&kept).unwrap();
        StagingDir::new(kept.clone()).hand_over();
        assert!(kept.exists());

        drop(StagingDir::new(root.path().join("never-created")));
    }
}
