use log::*;
use sea_orm::DatabaseConnection;

pub use entity::{charge_state, job_kind, job_state, jobs, quota_records, Id};

pub mod error;
pub mod job;
pub mod quota_record;

#[cfg(any(test, feature = "test-db"))]
pub mod testing;

/// Opens a set of demo accounts for local development: one metered account holding
/// `default_units` and one unlimited account.
pub async fn seed_database(
    db: &DatabaseConnection,
    default_units: i32,
) -> Result<Vec<quota_records::Model>, error::Error> {
    let metered = quota_record::create(db, Id::new_v4(), default_units).await?;
    info!(
        "Seeded metered account {} with {} units",
        metered.account_id, metered.remaining_units
    );

    let unlimited = quota_record::create(db, Id::new_v4(), 0).await?;
    let unlimited = quota_record::set_unlimited(db, unlimited.account_id, true).await?;
    info!("Seeded unlimited account {}", unlimited.account_id);

    Ok(vec![metered, unlimited])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn seed_database_opens_a_metered_and_an_unlimited_account() -> Result<(), error::Error> {
        let db = testing::connect().await;

        let accounts = seed_database(&db, 15).await?;

        assert_eq!(accounts.len(), 2);
        assert_eq!(accounts[0].remaining_units, 15);
        assert!(!accounts[0].unlimited);
        assert!(accounts[1].unlimited);

        Ok(())
    }
}
