//! Remote job client trait.

use crate::types::{Payload, PollStatus};
use crate::Error;
use async_trait::async_trait;

/// Narrow submit/poll interface to a provider that runs a job remotely.
///
/// `submit` must not block on the job completing: it returns as soon as the provider
/// has accepted the work and handed back an identifier. `poll` is then called
/// repeatedly with that identifier until it reports a terminal status.
#[cfg_attr(feature = "mock", mockall::automock)]
#[async_trait]
pub trait JobClient: Send + Sync {
    /// Hand the payload to the provider and return its job identifier.
    async fn submit(&self, payload: Payload) -> std::result::Result<String, Error>;

    /// Ask the provider for the current status of a submitted job.
    ///
    /// An `Err` means the status could not be obtained; whether the caller may try
    /// again is decided by [`Error::is_transient`].
    async fn poll(&self, remote_job_id: &str) -> std::result::Result<PollStatus, Error>;

    /// Release whatever the client still holds for a job the caller gave up on.
    ///
    /// Called once for a submitted job that ends without completing (failed, timed out or
    /// cancelled). Remote providers hold nothing locally, so the default does nothing.
    fn abandon(&self, _remote_job_id: &str) {}

    /// Return unique identifier for this provider (e.g., "assemblyai", "groq").
    ///
    /// Recorded on every job so operators can tell which provider ran it.
    fn provider_id(&self) -> &str;
}
