//! Store operations for the quota_records table.
//!
//! Every mutation here is a single conditional UPDATE evaluated by the database. The
//! condition and the arithmetic travel together in one statement, so two concurrent
//! callers can never both observe an available unit and both take it. Each operation
//! reports whether it applied (`rows_affected == 1`) instead of reading the row first.

use super::error::{EntityApiErrorKind, Error};
use entity::quota_records::{ActiveModel, Column, Entity, Model};
use entity::Id;
use log::*;
use sea_orm::{
    entity::prelude::*, sea_query::Expr, ActiveValue::Set, ConnectionTrait, UpdateMany, Value,
};

/// Opens a quota record for an account with the given number of units.
pub async fn create<C: ConnectionTrait>(db: &C, account_id: Id, units: i32) -> Result<Model, Error> {
    debug!("Opening quota record for account {account_id} with {units} units");

    let now = chrono::Utc::now();

    let active_model = ActiveModel {
        account_id: Set(account_id),
        remaining_units: Set(units.max(0)),
        reserved_units: Set(0),
        unlimited: Set(false),
        version: Set(0),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    };

    Ok(active_model.insert(db).await?)
}

pub async fn find_by_account_id<C: ConnectionTrait>(
    db: &C,
    account_id: Id,
) -> Result<Option<Model>, Error> {
    Ok(Entity::find_by_id(account_id).one(db).await?)
}

/// Reserves one unit if the account is limited and has an unreserved unit left.
pub async fn try_reserve<C: ConnectionTrait>(db: &C, account_id: Id) -> Result<bool, Error> {
    let update = Entity::update_many()
        .col_expr(
            Column::ReservedUnits,
            Expr::col(Column::ReservedUnits).add(1),
        )
        .filter(Column::AccountId.eq(account_id))
        .filter(Column::Unlimited.eq(false))
        .filter(Expr::col(Column::RemainingUnits).gt(Expr::col(Column::ReservedUnits)));

    apply(db, update).await
}

/// Spends one unit immediately if the account is limited and has an unreserved unit left.
pub async fn try_decrement<C: ConnectionTrait>(db: &C, account_id: Id) -> Result<bool, Error> {
    let update = Entity::update_many()
        .col_expr(
            Column::RemainingUnits,
            Expr::col(Column::RemainingUnits).sub(1),
        )
        .filter(Column::AccountId.eq(account_id))
        .filter(Column::Unlimited.eq(false))
        .filter(Expr::col(Column::RemainingUnits).gt(Expr::col(Column::ReservedUnits)));

    apply(db, update).await
}

/// Turns one outstanding reservation into a spent unit.
pub async fn commit_reserved<C: ConnectionTrait>(db: &C, account_id: Id) -> Result<bool, Error> {
    let update = Entity::update_many()
        .col_expr(
            Column::RemainingUnits,
            Expr::col(Column::RemainingUnits).sub(1),
        )
        .col_expr(
            Column::ReservedUnits,
            Expr::col(Column::ReservedUnits).sub(1),
        )
        .filter(Column::AccountId.eq(account_id))
        .filter(Column::ReservedUnits.gt(0))
        .filter(Column::RemainingUnits.gt(0));

    apply(db, update).await
}

/// Drops one outstanding reservation without spending it.
pub async fn release_reserved<C: ConnectionTrait>(db: &C, account_id: Id) -> Result<bool, Error> {
    let update = Entity::update_many()
        .col_expr(
            Column::ReservedUnits,
            Expr::col(Column::ReservedUnits).sub(1),
        )
        .filter(Column::AccountId.eq(account_id))
        .filter(Column::ReservedUnits.gt(0));

    apply(db, update).await
}

/// Gives back one unit that was spent at admission. Unlimited accounts are left untouched.
pub async fn refund<C: ConnectionTrait>(db: &C, account_id: Id) -> Result<bool, Error> {
    let update = Entity::update_many()
        .col_expr(
            Column::RemainingUnits,
            Expr::col(Column::RemainingUnits).add(1),
        )
        .filter(Column::AccountId.eq(account_id))
        .filter(Column::Unlimited.eq(false));

    apply(db, update).await
}

/// Adds units to an account, e.g. when a subscription is purchased.
pub async fn add_units<C: ConnectionTrait>(
    db: &C,
    account_id: Id,
    units: i32,
) -> Result<bool, Error> {
    if units <= 0 {
        return Ok(false);
    }

    let update = Entity::update_many()
        .col_expr(
            Column::RemainingUnits,
            Expr::col(Column::RemainingUnits).add(units),
        )
        .filter(Column::AccountId.eq(account_id));

    apply(db, update).await
}

pub async fn set_unlimited<C: ConnectionTrait>(
    db: &C,
    account_id: Id,
    unlimited: bool,
) -> Result<Model, Error> {
    debug!("Setting unlimited={unlimited} for account {account_id}");

    let update = Entity::update_many()
        .set(ActiveModel {
            unlimited: Set(unlimited),
            ..Default::default()
        })
        .filter(Column::AccountId.eq(account_id));

    if !apply(db, update).await? {
        return Err(Error {
            source: None,
            error_kind: EntityApiErrorKind::RecordNotFound,
        });
    }

    find_by_account_id(db, account_id)
        .await?
        .ok_or_else(Error::not_found)
}

// Bumps the version token and timestamp alongside the caller's change, then executes.
async fn apply<C: ConnectionTrait>(db: &C, update: UpdateMany<Entity>) -> Result<bool, Error> {
    let now: DateTimeWithTimeZone = chrono::Utc::now().into();

    let result = update
        .col_expr(Column::Version, Expr::col(Column::Version).add(1))
        .col_expr(Column::UpdatedAt, Expr::value(Value::from(now)))
        .exec(db)
        .await?;

    Ok(result.rows_affected == 1)
}
