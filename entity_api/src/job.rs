//! Store operations for the jobs table.
//!
//! State changes are compare-and-set updates: each names the states it may move a job
//! out of and reports whether it won. A caller that loses has raced with another
//! resolver (the request task, the sweeper) and should reload the row.

use super::error::{EntityApiErrorKind, Error};
use entity::charge_state::ChargeState;
use entity::job_state::JobState;
use entity::jobs::{ActiveModel, Column, Entity, Model};
use entity::Id;
use log::*;
use sea_orm::{
    entity::prelude::*, sea_query::Expr, ActiveValue::Set, ConnectionTrait, QueryOrder,
    UpdateMany, Value,
};

/// Inserts a new job in the `Created` state.
///
/// Only the identity fields of `job_model` are used (id, account, kind, charge, provider,
/// input and deadline); the lifecycle fields always start empty.
pub async fn create<C: ConnectionTrait>(db: &C, job_model: Model) -> Result<Model, Error> {
    debug!(
        "Creating {} job {} for account {}",
        job_model.kind, job_model.id, job_model.account_id
    );

    let now = chrono::Utc::now();

    let active_model = ActiveModel {
        id: Set(job_model.id),
        account_id: Set(job_model.account_id),
        kind: Set(job_model.kind),
        state: Set(JobState::Created),
        outcome: Set(None),
        charge: Set(job_model.charge),
        provider: Set(job_model.provider),
        input_ref: Set(job_model.input_ref),
        remote_job_id: Set(None),
        result: Set(None),
        error_detail: Set(None),
        deadline_at: Set(job_model.deadline_at),
        last_polled_at: Set(None),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    };

    Ok(active_model.insert(db).await?)
}

pub async fn find_by_id<C: ConnectionTrait>(db: &C, id: Id) -> Result<Model, Error> {
    Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(Error::not_found)
}

/// Lists an account's jobs, newest first.
pub async fn find_by_account_id<C: ConnectionTrait>(
    db: &C,
    account_id: Id,
) -> Result<Vec<Model>, Error> {
    Ok(Entity::find()
        .filter(Column::AccountId.eq(account_id))
        .order_by_desc(Column::CreatedAt)
        .all(db)
        .await?)
}

/// `Created → Submitted`, recording the provider's job id.
pub async fn mark_submitted<C: ConnectionTrait>(
    db: &C,
    id: Id,
    remote_job_id: &str,
) -> Result<bool, Error> {
    let update = Entity::update_many()
        .set(ActiveModel {
            state: Set(JobState::Submitted),
            remote_job_id: Set(Some(remote_job_id.to_owned())),
            ..Default::default()
        })
        .filter(Column::Id.eq(id))
        .filter(Column::State.eq(JobState::Created));

    apply(db, update).await
}

/// `Submitted | Polling → Polling`, stamping the time of the poll.
pub async fn mark_polled<C: ConnectionTrait>(db: &C, id: Id) -> Result<bool, Error> {
    let now: DateTimeWithTimeZone = chrono::Utc::now().into();

    let update = Entity::update_many()
        .set(ActiveModel {
            state: Set(JobState::Polling),
            last_polled_at: Set(Some(now)),
            ..Default::default()
        })
        .filter(Column::Id.eq(id))
        .filter(Column::State.is_in([JobState::Submitted, JobState::Polling]));

    apply(db, update).await
}

/// Moves an active job into a terminal state. Only the first resolver wins.
pub async fn resolve<C: ConnectionTrait>(
    db: &C,
    id: Id,
    state: JobState,
    result: Option<String>,
    error_detail: Option<String>,
) -> Result<bool, Error> {
    if !state.is_terminal() {
        warn!("Refusing to resolve job {id} into non-terminal state {state}");
        return Err(Error {
            source: None,
            error_kind: EntityApiErrorKind::RecordNotUpdated,
        });
    }

    let update = Entity::update_many()
        .set(ActiveModel {
            state: Set(state),
            outcome: Set(Some(state)),
            result: Set(result),
            error_detail: Set(error_detail),
            ..Default::default()
        })
        .filter(Column::Id.eq(id))
        .filter(Column::State.is_in(JobState::ACTIVE));

    apply(db, update).await
}

/// Compare-and-set on the job's charge column.
pub async fn update_charge<C: ConnectionTrait>(
    db: &C,
    id: Id,
    from: ChargeState,
    to: ChargeState,
) -> Result<bool, Error> {
    let update = Entity::update_many()
        .set(ActiveModel {
            charge: Set(to),
            ..Default::default()
        })
        .filter(Column::Id.eq(id))
        .filter(Column::Charge.eq(from));

    apply(db, update).await
}

/// `terminal → CleanedUp`, allowed only once the charge has been settled.
pub async fn mark_cleaned_up<C: ConnectionTrait>(db: &C, id: Id) -> Result<bool, Error> {
    let update = Entity::update_many()
        .set(ActiveModel {
            state: Set(JobState::CleanedUp),
            input_ref: Set(None),
            ..Default::default()
        })
        .filter(Column::Id.eq(id))
        .filter(Column::State.is_in(JobState::TERMINAL))
        .filter(Column::Charge.is_in(ChargeState::SETTLED));

    apply(db, update).await
}

/// Active jobs whose deadline passed before `cutoff`.
pub async fn find_expired<C: ConnectionTrait>(
    db: &C,
    cutoff: DateTimeWithTimeZone,
) -> Result<Vec<Model>, Error> {
    Ok(Entity::find()
        .filter(Column::State.is_in(JobState::ACTIVE))
        .filter(Column::DeadlineAt.lt(cutoff))
        .order_by_asc(Column::DeadlineAt)
        .all(db)
        .await?)
}

/// Terminal jobs that have not been cleaned up and were last touched before `cutoff`.
pub async fn find_unreaped<C: ConnectionTrait>(
    db: &C,
    cutoff: DateTimeWithTimeZone,
) -> Result<Vec<Model>, Error> {
    Ok(Entity::find()
        .filter(Column::State.is_in(JobState::TERMINAL))
        .filter(Column::UpdatedAt.lt(cutoff))
        .order_by_asc(Column::UpdatedAt)
        .all(db)
        .await?)
}

async fn apply<C: ConnectionTrait>(db: &C, update: UpdateMany<Entity>) -> Result<bool, Error> {
    let now: DateTimeWithTimeZone = chrono::Utc::now().into();

    let result = update
        .col_expr(Column::UpdatedAt, Expr::value(Value::from(now)))
        .exec(db)
        .await?;

    Ok(result.rows_affected == 1)
}
