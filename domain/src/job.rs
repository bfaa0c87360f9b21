//! The job lifecycle: admission, submission, polling and the single `finish` step.
//!
//! A job moves `Created → Submitted → Polling → {Completed | Failed | TimedOut}` and
//! then `→ CleanedUp`; a failed submission goes straight from `Created` to `Failed`.
//! Whatever path `drive` takes, it only ever produces a [`Resolution`]; recording the
//! terminal state, settling the charge and reaping the inputs all happen in
//! [`JobLifecycle::finish`], so an early return cannot skip any of them.

use crate::error::{EntityErrorKind, Error, InternalErrorKind, JobErrorKind};
use crate::quota::{Admission, QuotaLedger};
use crate::reaper::Reaper;
use crate::{job_kind::JobKind, job_state::JobState, jobs, Id};
use entity_api::job;
use job_client::{JobClient, Payload, RemoteStatus};
use log::*;
use sea_orm::{DatabaseConnection, TransactionTrait};
use service::config::Config;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep_until, timeout_at, Instant};
use tokio_util::sync::CancellationToken;

pub use entity_api::job::find_by_account_id;

/// Timing of the poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub poll_interval: Duration,
    /// Time after submission past which an unresolved job is timed out
    pub max_wait: Duration,
    pub max_transient_errors: u32,
    pub max_backoff: Duration,
}

impl PollPolicy {
    /// Wait before the next poll after `consecutive_errors` transient failures in a row.
    fn backoff(&self, consecutive_errors: u32) -> Duration {
        let exponent = consecutive_errors.saturating_sub(1).min(16);
        self.poll_interval
            .saturating_mul(1u32 << exponent)
            .min(self.max_backoff.max(self.poll_interval))
    }

    /// Wait before retrying a transient poll error, never shorter than the provider asked for.
    fn retry_wait(&self, consecutive_errors: u32, err: &job_client::Error) -> Duration {
        let backoff = self.backoff(consecutive_errors);
        match err {
            job_client::Error::RateLimited {
                retry_after_seconds,
            } => backoff.max(Duration::from_secs(*retry_after_seconds)),
            _ => backoff,
        }
    }
}

impl From<&Config> for PollPolicy {
    fn from(config: &Config) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            max_wait: config.max_wait(),
            max_transient_errors: config.max_transient_poll_errors,
            max_backoff: config.max_poll_backoff(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCause {
    /// The provider refused the job
    Submission,
    /// The provider reported the job failed, or its status could not be read
    Remote,
    /// The caller went away
    Cancelled,
    /// Bookkeeping failed on our side
    Internal,
}

/// How a job left the active states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Completed(String),
    Failed { cause: FailureCause, detail: String },
    TimedOut(String),
}

impl Resolution {
    fn failed(cause: FailureCause, detail: impl Into<String>) -> Self {
        Resolution::Failed {
            cause,
            detail: detail.into(),
        }
    }

    fn cancelled() -> Self {
        Self::failed(FailureCause::Cancelled, "cancelled by caller")
    }

    fn state(&self) -> JobState {
        match self {
            Resolution::Completed(_) => JobState::Completed,
            Resolution::Failed { .. } => JobState::Failed,
            Resolution::TimedOut(_) => JobState::TimedOut,
        }
    }
}

#[derive(Clone)]
pub struct JobLifecycle {
    db: Arc<DatabaseConnection>,
    ledger: QuotaLedger,
    reaper: Reaper,
    policy: PollPolicy,
}

impl JobLifecycle {
    pub fn new(
        db: Arc<DatabaseConnection>,
        ledger: QuotaLedger,
        reaper: Reaper,
        policy: PollPolicy,
    ) -> Self {
        Self {
            db,
            ledger,
            reaper,
            policy,
        }
    }

    pub fn ledger(&self) -> &QuotaLedger {
        &self.ledger
    }

    pub fn reaper(&self) -> &Reaper {
        &self.reaper
    }

    /// Runs one metered job to completion on behalf of `account_id`.
    ///
    /// Returns the finished job when it completed. Every other outcome is an error, and
    /// by the time it is returned the charge has been settled and the inputs reaped. A
    /// denied admission creates no job and deletes the payload's staged input.
    pub async fn run(
        &self,
        account_id: Id,
        payload: Payload,
        client: Arc<dyn JobClient>,
        cancel: CancellationToken,
    ) -> Result<jobs::Model, Error> {
        let job = match self.admit(account_id, &payload, client.provider_id()).await {
            Ok(job) => job,
            Err(err) => {
                self.reaper.remove_input(payload.input_ref()).await;
                return Err(err);
            }
        };

        let deadline = Instant::now() + self.policy.max_wait;
        let resolution = self
            .drive(&job, payload, client.as_ref(), deadline, &cancel)
            .await;

        self.finish(job.id, resolution).await
    }

    // Admission and the job row commit together or not at all.
    async fn admit(
        &self,
        account_id: Id,
        payload: &Payload,
        provider: &str,
    ) -> Result<jobs::Model, Error> {
        let txn = self.db.begin().await?;

        let reservation = match self.ledger.try_consume_in(&txn, account_id).await? {
            Admission::Granted(reservation) => reservation,
            Admission::Denied(reason) => {
                txn.rollback().await?;
                info!("Denied job for account {account_id}: {}", reason.as_code());
                return Err(reason.into());
            }
        };

        let now = chrono::Utc::now();
        let max_wait = chrono::Duration::from_std(self.policy.max_wait)
            .map_err(|err| Error::internal(format!("max wait out of range: {err}")))?;

        let job = job::create(
            &txn,
            jobs::Model {
                id: Id::new_v4(),
                account_id,
                kind: kind_of(payload),
                state: JobState::Created,
                outcome: None,
                charge: reservation.charge_state(),
                provider: provider.to_owned(),
                input_ref: payload
                    .input_ref()
                    .map(|path| path.to_string_lossy().into_owned()),
                remote_job_id: None,
                result: None,
                error_detail: None,
                deadline_at: (now + max_wait).into(),
                last_polled_at: None,
                created_at: now.into(),
                updated_at: now.into(),
            },
        )
        .await?;

        txn.commit().await?;

        info!(
            "Admitted {} job {} for account {account_id} via {provider} ({})",
            job.kind, job.id, job.charge
        );
        Ok(job)
    }

    async fn drive(
        &self,
        job: &jobs::Model,
        payload: Payload,
        client: &dyn JobClient,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Resolution {
        let submitted = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Resolution::cancelled(),
            submitted = timeout_at(deadline, client.submit(payload)) => submitted,
        };

        let remote_job_id = match submitted {
            Ok(Ok(remote_job_id)) => remote_job_id,
            Ok(Err(err)) => {
                warn!("Submission of job {} failed: {err}", job.id);
                return Resolution::failed(FailureCause::Submission, err.to_string());
            }
            Err(_) => {
                warn!("Submission of job {} did not finish in time", job.id);
                return Resolution::failed(
                    FailureCause::Submission,
                    "submission did not finish in time",
                );
            }
        };

        let resolution = self
            .track(job, &remote_job_id, client, deadline, cancel)
            .await;

        if !matches!(resolution, Resolution::Completed(_)) {
            debug!("Abandoning remote job {remote_job_id} of job {}", job.id);
            client.abandon(&remote_job_id);
        }

        resolution
    }

    // Polls a submitted job until it resolves.
    async fn track(
        &self,
        job: &jobs::Model,
        remote_job_id: &str,
        client: &dyn JobClient,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Resolution {
        match job::mark_submitted(self.db.as_ref(), job.id, remote_job_id).await {
            Ok(true) => debug!("Job {} submitted as {remote_job_id}", job.id),
            Ok(false) => {
                return Resolution::failed(FailureCause::Internal, "job was resolved elsewhere")
            }
            Err(err) => {
                error!("Failed to record submission of job {}: {err}", job.id);
                return Resolution::failed(FailureCause::Internal, err.to_string());
            }
        }

        let mut consecutive_errors = 0;
        let mut wait = self.policy.poll_interval;

        loop {
            let wake_at = (Instant::now() + wait).min(deadline);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Resolution::cancelled(),
                _ = sleep_until(wake_at) => {}
            }

            if Instant::now() >= deadline {
                return Resolution::TimedOut(format!(
                    "no result within {}s",
                    self.policy.max_wait.as_secs()
                ));
            }

            let polled = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Resolution::cancelled(),
                polled = timeout_at(deadline, client.poll(remote_job_id)) => polled,
            };

            match job::mark_polled(self.db.as_ref(), job.id).await {
                Ok(true) => {}
                Ok(false) => {
                    return Resolution::failed(FailureCause::Internal, "job was resolved elsewhere")
                }
                Err(err) => warn!("Failed to record poll of job {}: {err}", job.id),
            }

            let status = match polled {
                Ok(Ok(status)) => status,
                Ok(Err(err)) if err.is_transient() => {
                    consecutive_errors += 1;
                    if consecutive_errors >= self.policy.max_transient_errors {
                        return Resolution::TimedOut(format!(
                            "gave up after {consecutive_errors} consecutive transient poll errors: {err}"
                        ));
                    }
                    wait = self.policy.retry_wait(consecutive_errors, &err);
                    warn!(
                        "Transient poll error {consecutive_errors} for job {}: {err}; retrying in {wait:?}",
                        job.id
                    );
                    continue;
                }
                Ok(Err(err)) => {
                    warn!("Polling job {} failed: {err}", job.id);
                    return Resolution::failed(FailureCause::Remote, err.to_string());
                }
                Err(_) => {
                    return Resolution::TimedOut(format!(
                        "no result within {}s",
                        self.policy.max_wait.as_secs()
                    ))
                }
            };

            consecutive_errors = 0;
            wait = self.policy.poll_interval;

            match status.status {
                RemoteStatus::Queued | RemoteStatus::Processing => {
                    trace!("Job {} is {:?}", job.id, status.status);
                }
                RemoteStatus::Completed => {
                    return Resolution::Completed(status.result.unwrap_or_default());
                }
                RemoteStatus::Failed => {
                    return Resolution::failed(
                        FailureCause::Remote,
                        status
                            .error_detail
                            .unwrap_or_else(|| "remote job failed".to_owned()),
                    );
                }
            }
        }
    }

    /// Records the terminal state, settles the charge and reaps the inputs, in that order.
    async fn finish(&self, job_id: Id, resolution: Resolution) -> Result<jobs::Model, Error> {
        let state = resolution.state();
        let (result, error_detail) = match &resolution {
            Resolution::Completed(text) => (Some(text.clone()), None),
            Resolution::Failed { detail, .. } | Resolution::TimedOut(detail) => {
                (None, Some(detail.clone()))
            }
        };

        let recorded =
            match job::resolve(self.db.as_ref(), job_id, state, result, error_detail).await {
                Ok(recorded) => recorded,
                Err(err) => {
                    // The job stays active; the sweeper times it out once its deadline passes.
                    error!("Failed to record job {job_id} as {state}: {err}");
                    return Err(err.into());
                }
            };

        if recorded {
            info!("Job {job_id} resolved as {state}");
        } else {
            info!("Job {job_id} was resolved elsewhere before it could be recorded as {state}");
        }

        let resolved = job::find_by_id(self.db.as_ref(), job_id).await?;

        if let Err(err) = self.ledger.settle(&resolved).await {
            warn!("Failed to settle job {job_id}; the sweeper will retry: {err}");
        }

        if let Err(err) = self.reaper.cleanup(job_id).await {
            warn!("Failed to clean up job {job_id}; the sweeper will retry: {err}");
        }

        let finished = job::find_by_id(self.db.as_ref(), job_id).await?;

        if recorded {
            outcome_of(resolution, finished)
        } else {
            outcome_of_model(finished)
        }
    }
}

/// Looks up one of the account's jobs. Jobs of other accounts are reported as missing.
pub async fn find_for_account(
    db: &DatabaseConnection,
    account_id: Id,
    job_id: Id,
) -> Result<jobs::Model, Error> {
    let job = job::find_by_id(db, job_id).await?;

    if job.account_id != account_id {
        return Err(Error {
            source: None,
            error_kind: crate::error::DomainErrorKind::Internal(InternalErrorKind::Entity(
                EntityErrorKind::NotFound,
            )),
        });
    }

    Ok(job)
}

fn kind_of(payload: &Payload) -> JobKind {
    match payload {
        Payload::Audio { .. } | Payload::Video { .. } => JobKind::Transcription,
        Payload::Text { .. } => JobKind::Summarization,
    }
}

fn outcome_of(resolution: Resolution, finished: jobs::Model) -> Result<jobs::Model, Error> {
    match resolution {
        Resolution::Completed(_) => Ok(finished),
        Resolution::Failed {
            cause: FailureCause::Submission,
            detail,
        } => Err(Error::job(JobErrorKind::SubmissionFailed(detail))),
        Resolution::Failed {
            cause: FailureCause::Remote,
            detail,
        } => Err(Error::job(JobErrorKind::RemoteFailure(detail))),
        Resolution::Failed {
            cause: FailureCause::Cancelled,
            ..
        } => Err(Error::job(JobErrorKind::Cancelled)),
        Resolution::Failed {
            cause: FailureCause::Internal,
            detail,
        } => Err(Error::internal(detail)),
        Resolution::TimedOut(detail) => Err(Error::job(JobErrorKind::TimedOut(detail))),
    }
}

fn outcome_of_model(finished: jobs::Model) -> Result<jobs::Model, Error> {
    let detail = finished.error_detail.clone().unwrap_or_default();

    match finished.outcome {
        Some(JobState::Completed) => Ok(finished),
        Some(JobState::Failed) => Err(Error::job(JobErrorKind::RemoteFailure(detail))),
        Some(JobState::TimedOut) => Err(Error::job(JobErrorKind::TimedOut(detail))),
        _ => Err(Error::internal(format!(
            "job {} has no terminal outcome",
            finished.id
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::charge_state::ChargeState;
    use crate::error::{DomainErrorKind, QuotaErrorKind};
    use entity_api::{quota_record, testing};
    use job_client::{MockJobClient, PollStatus};
    use service::config::ChargePolicy;
    use std::collections::VecDeque;
    use std::path::PathBuf;

    struct Harness {
        lifecycle: JobLifecycle,
        db: Arc<DatabaseConnection>,
        _staging: tempfile::TempDir,
    }

    fn fast_policy() -> PollPolicy {
        PollPolicy {
            poll_interval: Duration::from_millis(5),
            max_wait: Duration::from_secs(5),
            max_transient_errors: 3,
            max_backoff: Duration::from_millis(20),
        }
    }

    async fn harness(charge_policy: ChargePolicy, policy: PollPolicy) -> Harness {
        let staging = tempfile::tempdir().unwrap();
        let db = Arc::new(testing::connect().await);
        let ledger = QuotaLedger::new(Arc::clone(&db), charge_policy, 15);
        let reaper = Reaper::new(Arc::clone(&db), staging.path());

        Harness {
            lifecycle: JobLifecycle::new(Arc::clone(&db), ledger, reaper, policy),
            db,
            _staging: staging,
        }
    }

    impl Harness {
        async fn open_account(&self, units: i32) -> Id {
            let account_id = Id::new_v4();
            self.lifecycle
                .ledger()
                .open_account(account_id, Some(units))
                .await
                .unwrap();
            account_id
        }

        async fn stage_audio(&self) -> PathBuf {
            let dir = self
                .lifecycle
                .reaper()
                .staging_root()
                .join(Id::new_v4().to_string());
            tokio::fs::create_dir_all(&dir).await.unwrap();
            let path = dir.join("lecture.mp3");
            tokio::fs::write(&path, b"audio").await.unwrap();
            path
        }

        async fn record(&self, account_id: Id) -> entity_api::quota_records::Model {
            quota_record::find_by_account_id(self.db.as_ref(), account_id)
                .await
                .unwrap()
                .unwrap()
        }

        async fn only_job(&self, account_id: Id) -> jobs::Model {
            let jobs = find_by_account_id(self.db.as_ref(), account_id)
                .await
                .unwrap();
            assert_eq!(jobs.len(), 1);
            jobs.into_iter().next().unwrap()
        }
    }

    fn client_with_polls(polls: Vec<Result<PollStatus, job_client::Error>>) -> Arc<dyn JobClient> {
        let mut client = MockJobClient::new();
        client.expect_provider_id().return_const("stub".to_owned());
        client
            .expect_submit()
            .times(1)
            .returning(|_| Ok("remote-1".to_owned()));

        let mut polls = VecDeque::from(polls);
        client
            .expect_poll()
            .returning(move |_| polls.pop_front().unwrap_or_else(|| Ok(PollStatus::processing())));
        client.expect_abandon().return_const(());

        Arc::new(client)
    }

    struct StalledSubmit;

    #[async_trait::async_trait]
    impl JobClient for StalledSubmit {
        async fn submit(&self, _payload: Payload) -> Result<String, job_client::Error> {
            std::future::pending().await
        }

        async fn poll(&self, _remote_job_id: &str) -> Result<PollStatus, job_client::Error> {
            panic!("an unsubmitted job must not be polled")
        }

        fn provider_id(&self) -> &str {
            "stub"
        }
    }

    fn audio(path: &std::path::Path) -> Payload {
        Payload::Audio {
            path: path.to_path_buf(),
        }
    }

    #[tokio::test]
    async fn completed_job_commits_one_unit_and_reaps_the_input() {
        let harness = harness(ChargePolicy::CommitOnSuccess, fast_policy()).await;
        let account_id = harness.open_account(5).await;
        let input = harness.stage_audio().await;
        let client = client_with_polls(vec![
            Ok(PollStatus::processing()),
            Ok(PollStatus::processing()),
            Ok(PollStatus::completed("R")),
        ]);

        let job = harness
            .lifecycle
            .run(account_id, audio(&input), client, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(job.state, JobState::CleanedUp);
        assert_eq!(job.outcome, Some(JobState::Completed));
        assert_eq!(job.result.as_deref(), Some("R"));
        assert_eq!(job.charge, ChargeState::Committed);
        assert_eq!(job.remote_job_id.as_deref(), Some("remote-1"));
        assert!(job.last_polled_at.is_some());
        assert!(!input.exists());

        let record = harness.record(account_id).await;
        assert_eq!(record.remaining_units, 4);
        assert_eq!(record.reserved_units, 0);
    }

    #[tokio::test]
    async fn job_that_never_finishes_times_out_and_is_released() {
        let policy = PollPolicy {
            max_wait: Duration::from_millis(60),
            ..fast_policy()
        };
        let harness = harness(ChargePolicy::CommitOnSuccess, policy).await;
        let account_id = harness.open_account(1).await;
        let input = harness.stage_audio().await;
        let client = client_with_polls(vec![]);

        let err = harness
            .lifecycle
            .run(account_id, audio(&input), client, CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err.error_kind,
            DomainErrorKind::Job(JobErrorKind::TimedOut(_))
        ));

        let job = harness.only_job(account_id).await;
        assert_eq!(job.state, JobState::CleanedUp);
        assert_eq!(job.outcome, Some(JobState::TimedOut));
        assert_eq!(job.charge, ChargeState::Released);
        assert!(!input.exists());

        let record = harness.record(account_id).await;
        assert_eq!(record.remaining_units, 1);
        assert_eq!(record.reserved_units, 0);
    }

    #[tokio::test]
    async fn submission_failure_never_polls_and_still_cleans_up() {
        let harness = harness(ChargePolicy::CommitOnSuccess, fast_policy()).await;
        let account_id = harness.open_account(2).await;
        let input = harness.stage_audio().await;

        let mut client = MockJobClient::new();
        client.expect_provider_id().return_const("stub".to_owned());
        client
            .expect_submit()
            .times(1)
            .returning(|_| Err(job_client::Error::Provider("rejected".to_owned())));
        client.expect_poll().never();
        client.expect_abandon().never();

        let err = harness
            .lifecycle
            .run(
                account_id,
                audio(&input),
                Arc::new(client),
                CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err.error_kind,
            DomainErrorKind::Job(JobErrorKind::SubmissionFailed(_))
        ));

        let job = harness.only_job(account_id).await;
        assert_eq!(job.state, JobState::CleanedUp);
        assert_eq!(job.outcome, Some(JobState::Failed));
        assert_eq!(job.remote_job_id, None);
        assert!(!input.exists());
        assert_eq!(harness.record(account_id).await.remaining_units, 2);
    }

    #[tokio::test]
    async fn denied_request_creates_no_job_and_removes_the_input() {
        let harness = harness(ChargePolicy::CommitOnSuccess, fast_policy()).await;
        let account_id = harness.open_account(0).await;
        let input = harness.stage_audio().await;

        let mut client = MockJobClient::new();
        client.expect_provider_id().return_const("stub".to_owned());
        client.expect_submit().never();

        let err = harness
            .lifecycle
            .run(
                account_id,
                audio(&input),
                Arc::new(client),
                CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert_eq!(
            err.error_kind,
            DomainErrorKind::Quota(QuotaErrorKind::NoRemainingUnits)
        );
        assert!(find_by_account_id(harness.db.as_ref(), account_id)
            .await
            .unwrap()
            .is_empty());
        assert!(!input.exists());
    }

    #[tokio::test]
    async fn remote_failure_releases_the_reservation() {
        let harness = harness(ChargePolicy::CommitOnSuccess, fast_policy()).await;
        let account_id = harness.open_account(1).await;
        let client = client_with_polls(vec![Ok(PollStatus::failed("unsupported codec"))]);

        let err = harness
            .lifecycle
            .run(
                account_id,
                Payload::Text {
                    text: "notes".to_owned(),
                    language: "en".to_owned(),
                },
                client,
                CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert_eq!(
            err.error_kind,
            DomainErrorKind::Job(JobErrorKind::RemoteFailure("unsupported codec".to_owned()))
        );

        let job = harness.only_job(account_id).await;
        assert_eq!(job.kind, JobKind::Summarization);
        assert_eq!(job.error_detail.as_deref(), Some("unsupported codec"));
        assert_eq!(harness.record(account_id).await.available_units(), 1);
    }

    #[tokio::test]
    async fn decrement_on_admission_refunds_a_failed_job() {
        let harness = harness(ChargePolicy::DecrementOnAdmission, fast_policy()).await;
        let account_id = harness.open_account(3).await;
        let input = harness.stage_audio().await;
        let client = client_with_polls(vec![Ok(PollStatus::failed("boom"))]);

        harness
            .lifecycle
            .run(account_id, audio(&input), client, CancellationToken::new())
            .await
            .unwrap_err();

        let job = harness.only_job(account_id).await;
        assert_eq!(job.charge, ChargeState::Refunded);
        assert_eq!(harness.record(account_id).await.remaining_units, 3);
    }

    #[tokio::test]
    async fn transient_poll_errors_are_retried() {
        let harness = harness(ChargePolicy::CommitOnSuccess, fast_policy()).await;
        let account_id = harness.open_account(1).await;
        let client = client_with_polls(vec![
            Err(job_client::Error::Network("reset".to_owned())),
            Err(job_client::Error::RateLimited {
                retry_after_seconds: 0,
            }),
            Ok(PollStatus::completed("done")),
        ]);

        let job = harness
            .lifecycle
            .run(
                account_id,
                Payload::Text {
                    text: "notes".to_owned(),
                    language: "en".to_owned(),
                },
                client,
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(job.result.as_deref(), Some("done"));
        assert_eq!(harness.record(account_id).await.remaining_units, 0);
    }

    #[tokio::test]
    async fn too_many_transient_poll_errors_time_the_job_out() {
        let harness = harness(ChargePolicy::CommitOnSuccess, fast_policy()).await;
        let account_id = harness.open_account(1).await;
        let client = client_with_polls(
            (0..3)
                .map(|_| Err(job_client::Error::Timeout("slow".to_owned())))
                .collect(),
        );

        let err = harness
            .lifecycle
            .run(
                account_id,
                Payload::Text {
                    text: "notes".to_owned(),
                    language: "en".to_owned(),
                },
                client,
                CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err.error_kind,
            DomainErrorKind::Job(JobErrorKind::TimedOut(_))
        ));
        assert_eq!(harness.record(account_id).await.available_units(), 1);
    }

    #[tokio::test]
    async fn non_transient_poll_error_fails_the_job() {
        let harness = harness(ChargePolicy::CommitOnSuccess, fast_policy()).await;
        let account_id = harness.open_account(1).await;
        let client = client_with_polls(vec![Err(job_client::Error::NotFound(
            "remote-1".to_owned(),
        ))]);

        let err = harness
            .lifecycle
            .run(
                account_id,
                Payload::Text {
                    text: "notes".to_owned(),
                    language: "en".to_owned(),
                },
                client,
                CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err.error_kind,
            DomainErrorKind::Job(JobErrorKind::RemoteFailure(_))
        ));
        assert_eq!(harness.only_job(account_id).await.outcome, Some(JobState::Failed));
    }

    #[tokio::test]
    async fn completed_without_text_yields_an_empty_result() {
        let harness = harness(ChargePolicy::CommitOnSuccess, fast_policy()).await;
        let account_id = harness.open_account(1).await;
        let client = client_with_polls(vec![Ok(PollStatus {
            status: RemoteStatus::Completed,
            result: None,
            error_detail: None,
        })]);

        let job = harness
            .lifecycle
            .run(
                account_id,
                Payload::Text {
                    text: "notes".to_owned(),
                    language: "en".to_owned(),
                },
                client,
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(job.result.as_deref(), Some(""));
    }

    #[tokio::test]
    async fn cancellation_fails_the_job_and_releases_everything() {
        let harness = harness(ChargePolicy::CommitOnSuccess, fast_policy()).await;
        let account_id = harness.open_account(1).await;
        let input = harness.stage_audio().await;
        let client = client_with_polls(vec![]);
        let cancel = CancellationToken::new();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            canceller.cancel();
        });

        let err = harness
            .lifecycle
            .run(account_id, audio(&input), client, cancel)
            .await
            .unwrap_err();

        assert_eq!(err.error_kind, DomainErrorKind::Job(JobErrorKind::Cancelled));

        let job = harness.only_job(account_id).await;
        assert_eq!(job.state, JobState::CleanedUp);
        assert_eq!(job.error_detail.as_deref(), Some("cancelled by caller"));
        assert_eq!(job.charge, ChargeState::Released);
        assert!(!input.exists());
        assert_eq!(harness.record(account_id).await.available_units(), 1);
    }

    #[tokio::test]
    async fn unfinished_remote_jobs_are_abandoned_once() {
        let harness = harness(ChargePolicy::CommitOnSuccess, fast_policy()).await;
        let account_id = harness.open_account(1).await;
        let abandoned = Arc::new(std::sync::Mutex::new(Vec::new()));

        let mut client = MockJobClient::new();
        client.expect_provider_id().return_const("stub".to_owned());
        client
            .expect_submit()
            .times(1)
            .returning(|_| Ok("remote-1".to_owned()));
        client
            .expect_poll()
            .returning(|_| Ok(PollStatus::processing()));
        let seen = Arc::clone(&abandoned);
        client
            .expect_abandon()
            .returning(move |remote_job_id| seen.lock().unwrap().push(remote_job_id.to_owned()));

        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            canceller.cancel();
        });

        harness
            .lifecycle
            .run(
                account_id,
                Payload::Text {
                    text: "notes".to_owned(),
                    language: "en".to_owned(),
                },
                Arc::new(client),
                cancel,
            )
            .await
            .unwrap_err();

        assert_eq!(*abandoned.lock().unwrap(), vec!["remote-1".to_owned()]);
    }

    #[tokio::test]
    async fn submission_outliving_the_deadline_fails_the_job() {
        let policy = PollPolicy {
            max_wait: Duration::from_millis(40),
            ..fast_policy()
        };
        let harness = harness(ChargePolicy::CommitOnSuccess, policy).await;
        let account_id = harness.open_account(1).await;
        let input = harness.stage_audio().await;

        let err = harness
            .lifecycle
            .run(
                account_id,
                audio(&input),
                Arc::new(StalledSubmit),
                CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert_eq!(
            err.error_kind,
            DomainErrorKind::Job(JobErrorKind::SubmissionFailed(
                "submission did not finish in time".to_owned()
            ))
        );

        let job = harness.only_job(account_id).await;
        assert_eq!(job.outcome, Some(JobState::Failed));
        assert_eq!(job.remote_job_id, None);
        assert_eq!(job.charge, ChargeState::Released);
        assert!(!input.exists());
    }

    #[tokio::test]
    async fn unlimited_accounts_run_unmetered() {
        let harness = harness(ChargePolicy::CommitOnSuccess, fast_policy()).await;
        let account_id = harness.open_account(0).await;
        harness
            .lifecycle
            .ledger()
            .mark_unlimited(account_id)
            .await
            .unwrap();
        let client = client_with_polls(vec![Ok(PollStatus::completed("R"))]);

        let job = harness
            .lifecycle
            .run(
                account_id,
                Payload::Text {
                    text: "notes".to_owned(),
                    language: "en".to_owned(),
                },
                client,
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(job.charge, ChargeState::Unmetered);
        let record = harness.record(account_id).await;
        assert_eq!(record.remaining_units, 0);
        assert_eq!(record.reserved_units, 0);
    }

    #[tokio::test]
    async fn jobs_of_other_accounts_are_not_found() {
        let harness = harness(ChargePolicy::CommitOnSuccess, fast_policy()).await;
        let account_id = harness.open_account(1).await;
        let client = client_with_polls(vec![Ok(PollStatus::completed("R"))]);
        let job = harness
            .lifecycle
            .run(
                account_id,
                Payload::Text {
                    text: "notes".to_owned(),
                    language: "en".to_owned(),
                },
                client,
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(find_for_account(harness.db.as_ref(), account_id, job.id)
            .await
            .is_ok());
        let err = find_for_account(harness.db.as_ref(), Id::new_v4(), job.id)
            .await
            .unwrap_err();
        assert_eq!(
            err.error_kind,
            DomainErrorKind::Internal(InternalErrorKind::Entity(EntityErrorKind::NotFound))
        );
    }

    #[test]
    fn backoff_doubles_up_to_the_cap() {
        let policy = PollPolicy {
            poll_interval: Duration::from_secs(5),
            max_wait: Duration::from_secs(1800),
            max_transient_errors: 5,
            max_backoff: Duration::from_secs(60),
        };

        assert_eq!(policy.backoff(1), Duration::from_secs(5));
        assert_eq!(policy.backoff(2), Duration::from_secs(10));
        assert_eq!(policy.backoff(4), Duration::from_secs(40));
        assert_eq!(policy.backoff(5), Duration::from_secs(60));
        assert_eq!(policy.backoff(40), Duration::from_secs(60));
    }

    #[test]
    fn rate_limited_polls_wait_at_least_the_retry_after() {
        let policy = PollPolicy {
            poll_interval: Duration::from_secs(5),
            max_wait: Duration::from_secs(1800),
            max_transient_errors: 5,
            max_backoff: Duration::from_secs(60),
        };
        let rate_limited = |retry_after_seconds| job_client::Error::RateLimited {
            retry_after_seconds,
        };

        assert_eq!(
            policy.retry_wait(1, &rate_limited(30)),
            Duration::from_secs(30)
        );
        assert_eq!(
            policy.retry_wait(3, &rate_limited(1)),
            Duration::from_secs(20)
        );
        assert_eq!(
            policy.retry_wait(1, &job_client::Error::Network("reset".to_owned())),
            Duration::from_secs(5)
        );
    }
}
