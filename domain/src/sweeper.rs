//! Background sweep that takes over jobs whose request task went away.
//!
//! A crash, a panic or a lost database connection can leave a job active past its
//! deadline, or terminal with its charge unsettled or its inputs still on disk. The
//! sweeper finds both kinds of stragglers and pushes them through the same
//! conditional transitions the lifecycle uses, so racing a live request is harmless.

use crate::error::Error;
use crate::quota::QuotaLedger;
use crate::reaper::Reaper;
use crate::{job_state::JobState, jobs};
use entity_api::job;
use log::*;
use sea_orm::DatabaseConnection;
use service::config::Config;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub timed_out: usize,
    pub cleaned_up: usize,
}

#[derive(Clone)]
pub struct Sweeper {
    db: Arc<DatabaseConnection>,
    ledger: QuotaLedger,
    reaper: Reaper,
    interval: Duration,
    grace: Duration,
}

impl Sweeper {
    pub fn new(
        db: Arc<DatabaseConnection>,
        ledger: QuotaLedger,
        reaper: Reaper,
        interval: Duration,
        grace: Duration,
    ) -> Self {
        Self {
            db,
            ledger,
            reaper,
            interval,
            grace,
        }
    }

    pub fn from_config(
        db: Arc<DatabaseConnection>,
        ledger: QuotaLedger,
        reaper: Reaper,
        config: &Config,
    ) -> Self {
        Self::new(
            db,
            ledger,
            reaper,
            config.sweep_interval(),
            config.sweep_grace(),
        )
    }

    /// Runs one pass over abandoned jobs.
    pub async fn sweep_once(&self) -> Result<SweepReport, Error> {
        let grace = chrono::Duration::from_std(self.grace)
            .map_err(|err| Error::internal(format!("sweep grace out of range: {err}")))?;
        let cutoff = (chrono::Utc::now() - grace).into();

        let mut report = SweepReport::default();

        for expired in job::find_expired(self.db.as_ref(), cutoff).await? {
            let resolved = job::resolve(
                self.db.as_ref(),
                expired.id,
                JobState::TimedOut,
                None,
                Some("abandoned before resolution".to_owned()),
            )
            .await?;

            if resolved {
                warn!(
                    "Timed out job {} abandoned since its deadline {}",
                    expired.id, expired.deadline_at
                );
                report.timed_out += 1;
            }

            let current = job::find_by_id(self.db.as_ref(), expired.id).await?;
            if self.settle_and_clean(&current).await {
                report.cleaned_up += 1;
            }
        }

        for unreaped in job::find_unreaped(self.db.as_ref(), cutoff).await? {
            if self.settle_and_clean(&unreaped).await {
                report.cleaned_up += 1;
            }
        }

        if report != SweepReport::default() {
            info!(
                "Sweep timed out {} and cleaned up {} job(s)",
                report.timed_out, report.cleaned_up
            );
        }

        Ok(report)
    }

    /// Sweeps every `interval` until `shutdown` is cancelled.
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        debug!("Sweeper shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(err) = self.sweep_once().await {
                            error!("Sweep failed: {err}");
                        }
                    }
                }
            }
        })
    }

    // Failures are logged; the job stays a candidate for the next sweep.
    async fn settle_and_clean(&self, job_model: &jobs::Model) -> bool {
        if job_model.state == JobState::CleanedUp {
            return false;
        }

        if let Err(err) = self.ledger.settle(job_model).await {
            warn!("Sweeper failed to settle job {}: {err}", job_model.id);
            return false;
        }

        match self.reaper.cleanup(job_model.id).await {
            Ok(cleaned_up) => cleaned_up,
            Err(err) => {
                warn!("Sweeper failed to clean up job {}: {err}", job_model.id);
                false
            }
        }
    }
}
