//! Metering, job lifecycle and provider integrations.
//!
//! Items from `entity_api` are re-exported here so that consumers of the `domain` crate do
//! not need to depend on `entity_api` directly, and the provider-agnostic job client
//! interface is re-exported so `web` can hold providers behind `Arc<dyn JobClient>`.

// Re-exports from `entity` crate via `entity_api`
pub use entity_api::{charge_state, job_kind, job_state, jobs, quota_records, Id};

pub use job_client::{JobClient, Payload, PollStatus, RemoteStatus};

pub mod error;
pub mod job;
pub mod jwt;
pub mod media;
pub mod quota;
pub mod reaper;
pub mod sweeper;

pub mod gateway;
