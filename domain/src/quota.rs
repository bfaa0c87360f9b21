//! The quota ledger: atomic admission control over per-account unit counters.
//!
//! Admission is a single conditional update evaluated by the database, so concurrent
//! requests for the same account serialize on the row and can never over-grant.
//! Settlement of a job's charge is a compare-and-set on the job row plus the matching
//! counter update inside one transaction, so it happens exactly once no matter how
//! many resolvers (request task, sweeper) race for it.

use crate::error::{DomainErrorKind, EntityErrorKind, Error, InternalErrorKind};
use crate::{charge_state::ChargeState, job_state::JobState, jobs, quota_records, Id};
use entity_api::{job, quota_record};
use log::*;
use sea_orm::{ConnectionTrait, DatabaseConnection, TransactionTrait};
use serde::Serialize;
use service::config::{ChargePolicy, Config};
use std::sync::Arc;

/// What a granted admission owes the account until the job settles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    /// One unit is set aside and will be committed or released
    Reserved,
    /// One unit was spent up front and may be refunded
    Charged,
    /// The account is unlimited
    Unmetered,
}

impl Reservation {
    pub fn charge_state(&self) -> ChargeState {
        match self {
            Reservation::Reserved => ChargeState::Reserved,
            Reservation::Charged => ChargeState::Charged,
            Reservation::Unmetered => ChargeState::Unmetered,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenialReason {
    NoRemainingUnits,
    AccountNotFound,
}

impl DenialReason {
    pub fn as_code(&self) -> &'static str {
        match self {
            DenialReason::NoRemainingUnits => "no_remaining_units",
            DenialReason::AccountNotFound => "account_not_found",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Granted(Reservation),
    Denied(DenialReason),
}

/// An account's current allowance as seen by its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Balance {
    /// Units still available to new jobs (remaining minus reserved)
    pub remaining_units: i32,
    pub unlimited: bool,
}

impl From<&quota_records::Model> for Balance {
    fn from(record: &quota_records::Model) -> Self {
        Self {
            remaining_units: record.available_units(),
            unlimited: record.unlimited,
        }
    }
}

#[derive(Clone)]
pub struct QuotaLedger {
    db: Arc<DatabaseConnection>,
    policy: ChargePolicy,
    default_units: i32,
}

impl QuotaLedger {
    pub fn new(db: Arc<DatabaseConnection>, policy: ChargePolicy, default_units: i32) -> Self {
        Self {
            db,
            policy,
            default_units,
        }
    }

    pub fn from_config(db: Arc<DatabaseConnection>, config: &Config) -> Self {
        Self::new(db, config.charge_policy, config.default_units)
    }

    pub fn policy(&self) -> ChargePolicy {
        self.policy
    }

    /// Grants or denies one unit of work for the account.
    pub async fn try_consume(&self, account_id: Id) -> Result<Admission, Error> {
        self.try_consume_in(self.db.as_ref(), account_id).await
    }

    /// Same as [`QuotaLedger::try_consume`], on a caller-provided connection or transaction.
    pub async fn try_consume_in<C: ConnectionTrait>(
        &self,
        conn: &C,
        account_id: Id,
    ) -> Result<Admission, Error> {
        let (applied, reservation) = match self.policy {
            ChargePolicy::CommitOnSuccess => (
                quota_record::try_reserve(conn, account_id).await?,
                Reservation::Reserved,
            ),
            ChargePolicy::DecrementOnAdmission => (
                quota_record::try_decrement(conn, account_id).await?,
                Reservation::Charged,
            ),
        };

        if applied {
            debug!("Admitted account {account_id} ({reservation:?})");
            return Ok(Admission::Granted(reservation));
        }

        // The conditional update matched nothing; read the record only to say why.
        let admission = match quota_record::find_by_account_id(conn, account_id).await? {
            Some(record) if record.unlimited => Admission::Granted(Reservation::Unmetered),
            Some(_) => Admission::Denied(DenialReason::NoRemainingUnits),
            None => Admission::Denied(DenialReason::AccountNotFound),
        };

        debug!("Admission for account {account_id}: {admission:?}");
        Ok(admission)
    }

    /// Spends a reserved unit.
    pub async fn commit(&self, account_id: Id) -> Result<bool, Error> {
        Ok(quota_record::commit_reserved(self.db.as_ref(), account_id).await?)
    }

    /// Drops a reservation without spending it.
    pub async fn release(&self, account_id: Id) -> Result<bool, Error> {
        Ok(quota_record::release_reserved(self.db.as_ref(), account_id).await?)
    }

    /// Restores a unit spent at admission.
    pub async fn refund(&self, account_id: Id) -> Result<bool, Error> {
        Ok(quota_record::refund(self.db.as_ref(), account_id).await?)
    }

    pub async fn mark_unlimited(&self, account_id: Id) -> Result<Balance, Error> {
        self.set_unlimited(account_id, true).await
    }

    pub async fn mark_limited(&self, account_id: Id) -> Result<Balance, Error> {
        self.set_unlimited(account_id, false).await
    }

    /// Opens the account's quota record with `units`, or the default free allowance.
    pub async fn open_account(&self, account_id: Id, units: Option<i32>) -> Result<Balance, Error> {
        let units = units.unwrap_or(self.default_units);
        let record = quota_record::create(self.db.as_ref(), account_id, units).await?;

        info!("Opened account {account_id} with {units} units");
        Ok(Balance::from(&record))
    }

    pub async fn grant_units(&self, account_id: Id, units: i32) -> Result<Balance, Error> {
        if units <= 0 {
            return Err(Error {
                source: None,
                error_kind: DomainErrorKind::Internal(InternalErrorKind::Entity(
                    EntityErrorKind::Invalid,
                )),
            });
        }

        if !quota_record::add_units(self.db.as_ref(), account_id, units).await? {
            return Err(DenialReason::AccountNotFound.into());
        }

        info!("Granted {units} units to account {account_id}");
        self.balance(account_id).await
    }

    pub async fn balance(&self, account_id: Id) -> Result<Balance, Error> {
        match quota_record::find_by_account_id(self.db.as_ref(), account_id).await? {
            Some(record) => Ok(Balance::from(&record)),
            None => Err(DenialReason::AccountNotFound.into()),
        }
    }

    /// Finalizes a job's charge according to its terminal state.
    ///
    /// Returns the job's charge state afterwards. Jobs that are not terminal yet, or
    /// whose charge is already settled, are left alone.
    pub async fn settle(&self, job_model: &jobs::Model) -> Result<ChargeState, Error> {
        let txn = self.db.begin().await?;

        // Re-read inside the transaction; the caller's copy may be stale.
        let current = job::find_by_id(&txn, job_model.id).await?;
        let outcome = current.outcome.unwrap_or(current.state);

        let target = match (outcome, current.charge) {
            (_, charge) if charge.is_settled() => return Ok(charge),
            (JobState::Completed, _) => ChargeState::Committed,
            (JobState::Failed | JobState::TimedOut, ChargeState::Reserved) => {
                ChargeState::Released
            }
            (JobState::Failed | JobState::TimedOut, ChargeState::Charged) => {
                ChargeState::Refunded
            }
            (state, charge) => {
                debug!("Job {} is {state} with charge {charge}; nothing to settle", current.id);
                return Ok(charge);
            }
        };

        if !job::update_charge(&txn, current.id, current.charge, target).await? {
            // Another resolver settled it between our read and the update.
            txn.rollback().await?;
            return Ok(job::find_by_id(self.db.as_ref(), current.id).await?.charge);
        }

        let counter_applied = match (current.charge, target) {
            (ChargeState::Reserved, ChargeState::Committed) => {
                quota_record::commit_reserved(&txn, current.account_id).await?
            }
            (ChargeState::Reserved, ChargeState::Released) => {
                quota_record::release_reserved(&txn, current.account_id).await?
            }
            (ChargeState::Charged, ChargeState::Refunded) => {
                quota_record::refund(&txn, current.account_id).await?
            }
            // The unit was already spent at admission.
            _ => true,
        };

        if !counter_applied {
            warn!(
                "Quota record of account {} did not accept settlement {} -> {target} of job {}",
                current.account_id, current.charge, current.id
            );
        }

        txn.commit().await?;

        info!(
            "Settled job {} of account {}: {} -> {target}",
            current.id, current.account_id, current.charge
        );
        Ok(target)
    }

    async fn set_unlimited(&self, account_id: Id, unlimited: bool) -> Result<Balance, Error> {
        match quota_record::set_unlimited(self.db.as_ref(), account_id, unlimited).await {
            Ok(record) => Ok(Balance::from(&record)),
            Err(err) if err.error_kind == entity_api::error::EntityApiErrorKind::RecordNotFound => {
                Err(DenialReason::AccountNotFound.into())
            }
            Err(err) => Err(err.into()),
        }
    }
}
