//! AssemblyAI API client for transcription services.
//!
//! A staged file is uploaded to AssemblyAI, a transcript is created for the returned
//! upload URL, and the transcript is then polled by id until it completes or errors.
//! Videos have their audio track extracted with ffmpeg before the upload.

use super::{check_status, request_error};
use crate::error::{DomainErrorKind, Error, InternalErrorKind};
use crate::media;
use async_trait::async_trait;
use job_client::{JobClient, Payload, PollStatus};
use log::*;
use serde::{Deserialize, Serialize};
use service::config::Config;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const PROVIDER_ID: &str = "assemblyai";

/// Response from uploading a file
#[derive(Debug, Deserialize)]
struct UploadResponse {
    upload_url: String,
}

/// Request to create a new transcription
#[derive(Debug, Serialize)]
struct CreateTranscriptRequest<'a> {
    audio_url: &'a str,
}

/// A transcript as AssemblyAI reports it
#[derive(Debug, Deserialize)]
pub struct TranscriptResponse {
    pub id: String,
    pub status: TranscriptStatus,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Transcript processing status
#[derive(Debug, Deserialize, PartialEq, Eq, Clone)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptStatus {
    Queued,
    Processing,
    Completed,
    Error,
}

impl From<TranscriptResponse> for PollStatus {
    fn from(transcript: TranscriptResponse) -> Self {
        match transcript.status {
            TranscriptStatus::Queued => PollStatus::queued(),
            TranscriptStatus::Processing => PollStatus::processing(),
            TranscriptStatus::Completed => PollStatus::completed(transcript.text.unwrap_or_default()),
            TranscriptStatus::Error => PollStatus::failed(
                transcript
                    .error
                    .unwrap_or_else(|| "transcription failed".to_owned()),
            ),
        }
    }
}

/// AssemblyAI API client
pub struct AssemblyAiClient {
    client: reqwest::Client,
    base_url: String,
    ffmpeg_path: PathBuf,
}

impl AssemblyAiClient {
    /// Create a new AssemblyAI client with the given API key and base URL. Every request
    /// fails with a timeout once it takes longer than `timeout`.
    pub fn new(api_key: &str, base_url: &str, timeout: Duration) -> Result<Self, Error> {
        let mut headers = reqwest::header::HeaderMap::new();

        let mut header_value = reqwest::header::HeaderValue::from_str(api_key).map_err(|e| {
            warn!("Failed to create auth header: {:?}", e);
            Error {
                source: Some(Box::new(e)),
                error_kind: DomainErrorKind::Internal(InternalErrorKind::Other(
                    "Invalid API key format".to_string(),
                )),
            }
        })?;
        header_value.set_sensitive(true);
        headers.insert("authorization", header_value);

        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            ffmpeg_path: PathBuf::from("ffmpeg"),
        })
    }

    pub fn with_ffmpeg_path(mut self, ffmpeg_path: impl Into<PathBuf>) -> Self {
        self.ffmpeg_path = ffmpeg_path.into();
        self
    }

    pub fn from_config(config: &Config) -> Result<Self, Error> {
        let api_key = config.assemblyai_api_key().ok_or_else(|| {
            warn!("No AssemblyAI API key configured");
            Error {
                source: None,
                error_kind: DomainErrorKind::Internal(InternalErrorKind::Config),
            }
        })?;

        Ok(Self::new(
            &api_key,
            config.assemblyai_base_url(),
            config.http_request_timeout(),
        )?
        .with_ffmpeg_path(config.ffmpeg_path()))
    }

    /// Upload a local file and return the URL AssemblyAI assigned to it
    pub async fn upload(&self, path: &Path) -> Result<String, job_client::Error> {
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            job_client::Error::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;

        debug!("Uploading {} ({} bytes) to AssemblyAI", path.display(), bytes.len());

        let response = self
            .client
            .post(format!("{}/upload", self.base_url))
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(bytes)
            .send()
            .await
            .map_err(request_error)?;

        let upload: UploadResponse = check_status(PROVIDER_ID, response)
            .await?
            .json()
            .await
            .map_err(request_error)?;

        Ok(upload.upload_url)
    }

    /// Create a new transcription request
    pub async fn create_transcript(
        &self,
        audio_url: &str,
    ) -> Result<TranscriptResponse, job_client::Error> {
        let response = self
            .client
            .post(format!("{}/transcript", self.base_url))
            .json(&CreateTranscriptRequest { audio_url })
            .send()
            .await
            .map_err(request_error)?;

        let transcript: TranscriptResponse = check_status(PROVIDER_ID, response)
            .await?
            .json()
            .await
            .map_err(request_error)?;

        info!("Created AssemblyAI transcript with ID: {}", transcript.id);
        Ok(transcript)
    }

    /// Get the status of a transcript
    pub async fn get_transcript(
        &self,
        transcript_id: &str,
    ) -> Result<TranscriptResponse, job_client::Error> {
        let response = self
            .client
            .get(format!("{}/transcript/{}", self.base_url, transcript_id))
            .send()
            .await
            .map_err(request_error)?;

        check_status(PROVIDER_ID, response)
            .await?
            .json()
            .await
            .map_err(request_error)
    }
}

#[async_trait]
impl JobClient for AssemblyAiClient {
    async fn submit(&self, payload: Payload) -> Result<String, job_client::Error> {
        let audio = match payload {
            Payload::Audio { path } => path,
            Payload::Video { path } => media::extract_audio(&self.ffmpeg_path, &path).await?,
            Payload::Text { .. } => {
                return Err(job_client::Error::Configuration(
                    "AssemblyAI only transcribes audio and video".to_owned(),
                ))
            }
        };

        let audio_url = self.upload(&audio).await?;
        let transcript = self.create_transcript(&audio_url).await?;
        Ok(transcript.id)
    }

    async fn poll(&self, remote_job_id: &str) -> Result<PollStatus, job_client::Error> {
        let transcript = self.get_transcript(remote_job_id).await?;
        trace!(
            "AssemblyAI transcript {remote_job_id} is {:?}",
            transcript.status
        );
        Ok(transcript.into())
    }

    fn provider_id(&self) -> &str {
        PROVIDER_ID
    }
}
