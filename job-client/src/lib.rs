//! Provider-agnostic client interface for slow remote processing jobs.
//!
//! A remote job is submitted once and then polled until it reports a terminal status.
//! Implementations hide the provider transport (uploads, HTTP endpoints, background
//! tasks) behind [`JobClient`], so the lifecycle that drives a job never depends on
//! which provider runs it.

pub mod error;
pub mod traits;
pub mod types;

// Re-export commonly used types
pub use error::Error;
pub use traits::job_client::JobClient;
pub use types::{Payload, PollStatus, RemoteStatus};

#[cfg(feature = "mock")]
pub use traits::job_client::MockJobClient;
