//! Values exchanged with a remote job provider.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Input handed to a provider when a job is submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// A staged audio file to transcribe
    Audio { path: PathBuf },
    /// A staged video file whose audio track is transcribed
    Video { path: PathBuf },
    /// Text to summarize, with the language the summary should be written in
    Text { text: String, language: String },
}

impl Payload {
    /// The transient local artifact this payload refers to, if any.
    pub fn input_ref(&self) -> Option<&Path> {
        match self {
            Payload::Audio { path } | Payload::Video { path } => Some(path.as_path()),
            Payload::Text { .. } => None,
        }
    }
}

/// Status a provider reports for a submitted job.
///
/// Jobs move Queued → Processing → {Completed | Failed}; only the last two are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl RemoteStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RemoteStatus::Completed | RemoteStatus::Failed)
    }
}

/// The answer to one poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollStatus {
    pub status: RemoteStatus,
    /// Present when `status` is `Completed`
    pub result: Option<String>,
    /// Present when `status` is `Failed`
    pub error_detail: Option<String>,
}

impl PollStatus {
    pub fn queued() -> Self {
        Self::pending(RemoteStatus::Queued)
    }

    pub fn processing() -> Self {
        Self::pending(RemoteStatus::Processing)
    }

    pub fn completed(result: impl Into<String>) -> Self {
        Self {
            status: RemoteStatus::Completed,
            result: Some(result.into()),
            error_detail: None,
        }
    }

    pub fn failed(error_detail: impl Into<String>) -> Self {
        Self {
            status: RemoteStatus::Failed,
            result: None,
            error_detail: Some(error_detail.into()),
        }
    }

    fn pending(status: RemoteStatus) -> Self {
        Self {
            status,
            result: None,
            error_detail: None,
        }
    }
}
