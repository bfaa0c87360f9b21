//! Error types for remote job operations.

use std::fmt;

/// Provider-agnostic error raised while submitting or polling a remote job.
///
/// Provider implementations map their native failures onto these variants so the job
/// lifecycle can decide between retrying a poll and failing the job without knowing
/// anything about the transport.
#[derive(Debug)]
pub enum Error {
    /// API key authentication failures. Retrying will not help.
    Authentication(String),

    /// Network connectivity issues, DNS failures, or connection resets.
    /// These errors are typically transient.
    Network(String),

    /// Missing API keys, unreadable inputs or other setup problems.
    Configuration(String),

    /// The provider rejected the request or reported a business failure.
    Provider(String),

    /// A single request exceeded its timeout. Typically transient.
    Timeout(String),

    /// The remote job does not exist (anymore).
    NotFound(String),

    /// Provider rate limit exceeded. Clients must wait before retrying.
    RateLimited { retry_after_seconds: u64 },

    /// The provider answered with a body that does not match the expected shape.
    Deserialization(String),

    /// Catch-all for errors that don't fit other categories.
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Whether a failed poll may succeed if simply tried again later.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Network(_) | Error::Timeout(_) | Error::RateLimited { .. }
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Authentication(msg) => write!(f, "Authentication failed: {}", msg),
            Error::Network(msg) => write!(f, "Network error: {}", msg),
            Error::Configuration(msg) => write!(f, "Invalid configuration: {}", msg),
            Error::Provider(msg) => write!(f, "Provider error: {}", msg),
            Error::Timeout(msg) => write!(f, "Timeout: {}", msg),
            Error::NotFound(msg) => write!(f, "Not found: {}", msg),
            Error::RateLimited {
                retry_after_seconds,
            } => {
                write!(f, "Rate limited: retry after {}s", retry_after_seconds)
            }
            Error::Deserialization(msg) => write!(f, "Deserialization error: {}", msg),
            Error::Other(err) => write!(f, "Other error: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Other(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Deserialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_connectivity_and_throttling_errors_are_transient() {
        assert!(Error::Network("reset".to_owned()).is_transient());
        assert!(Error::Timeout("slow".to_owned()).is_transient());
        assert!(Error::RateLimited {
            retry_after_seconds: 3
        }
        .is_transient());

        assert!(!Error::Authentication("bad key".to_owned()).is_transient());
        assert!(!Error::Provider("rejected".to_owned()).is_transient());
        assert!(!Error::NotFound("gone".to_owned()).is_transient());
    }

    #[test]
    fn json_errors_become_deserialization_errors() {
        let err: Error = serde_json::from_str::<u32>("not json").unwrap_err().into();

        assert!(matches!(err, Error::Deserialization(_)));
    }
}
