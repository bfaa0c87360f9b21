//! Deletes the transient artifacts a job was given once the job is over.
//!
//! Every request stages its uploads in its own directory under the staging root, so
//! cleaning a job means deleting its input file and then that directory, which takes
//! any sibling artifact (e.g. audio extracted from a video) with it.

use crate::error::Error;
use crate::{job_state::JobState, Id};
use entity_api::job;
use log::*;
use sea_orm::DatabaseConnection;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Clone)]
pub struct Reaper {
    db: Arc<DatabaseConnection>,
    staging_root: PathBuf,
}

impl Reaper {
    pub fn new(db: Arc<DatabaseConnection>, staging_root: impl Into<PathBuf>) -> Self {
        Self {
            db,
            staging_root: staging_root.into(),
        }
    }

    pub fn staging_root(&self) -> &Path {
        &self.staging_root
    }

    /// Releases a terminal job's artifacts and marks it `CleanedUp`.
    ///
    /// Returns `true` only for the call that performed the transition; repeated calls,
    /// jobs that are still running and jobs whose charge is not settled are no-ops.
    /// A failed deletion is logged and leaves the job terminal so the sweeper retries it.
    pub async fn cleanup(&self, job_id: Id) -> Result<bool, Error> {
        let job = job::find_by_id(self.db.as_ref(), job_id).await?;

        if job.state == JobState::CleanedUp {
            trace!("Job {job_id} is already cleaned up");
            return Ok(false);
        }

        if !job.state.is_terminal() {
            warn!(
                "Refusing to clean up job {job_id} while it is still {}",
                job.state
            );
            return Ok(false);
        }

        if !job.charge.is_settled() {
            debug!(
                "Deferring cleanup of job {job_id} until its {} charge is settled",
                job.charge
            );
            return Ok(false);
        }

        if let Some(input_ref) = job.input_ref.as_deref() {
            if let Err(err) = self.remove_artifacts(Path::new(input_ref)).await {
                warn!("Failed to delete artifacts of job {job_id} at {input_ref}: {err}");
                return Ok(false);
            }
        }

        let cleaned_up = job::mark_cleaned_up(self.db.as_ref(), job_id).await?;
        if cleaned_up {
            info!("Cleaned up job {job_id}");
        }

        Ok(cleaned_up)
    }

    /// Deletes an artifact whose request was turned away before a job existed.
    pub async fn remove_input(&self, input_ref: Option<&Path>) {
        let Some(path) = input_ref else {
            return;
        };

        match self.remove_artifacts(path).await {
            Ok(()) => debug!("Removed input {}", path.display()),
            Err(err) => warn!("Failed to remove input {}: {err}", path.display()),
        }
    }

    async fn remove_artifacts(&self, input: &Path) -> io::Result<()> {
        ignore_not_found(tokio::fs::remove_file(input).await)?;

        // Only the per-request directory goes, never the staging root itself or
        // anything outside of it.
        if let Some(staging_dir) = input.parent() {
            if staging_dir != self.staging_root && staging_dir.starts_with(&self.staging_root) {
                ignore_not_found(tokio::fs::remove_dir_all(staging_dir).await)?;
            }
        }

        Ok(())
    }
}

fn ignore_not_found(result: io::Result<()>) -> io::Result<()> {
    match result {
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
