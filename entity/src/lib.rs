use uuid::Uuid;

pub mod charge_state;
pub mod job_kind;
pub mod job_state;
pub mod jobs;
pub mod quota_records;

/// A type alias that represents any Entity's internal id field data type.
/// Aliased so that it's easy to change the underlying type if necessary.
pub type Id = Uuid;
