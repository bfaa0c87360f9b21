use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();

        db.execute_unprepared("CREATE SCHEMA IF NOT EXISTS scribe_meter;")
            .await?;

        db.execute_unprepared("SET search_path TO scribe_meter, public;")
            .await?;

        // The counter invariants are enforced by the database as well as by the
        // conditional updates in entity_api::quota_record.
        db.execute_unprepared(
            r#"
            CREATE TABLE IF NOT EXISTS scribe_meter.quota_records (
                account_id      UUID PRIMARY KEY,
                remaining_units INTEGER NOT NULL DEFAULT 0,
                reserved_units  INTEGER NOT NULL DEFAULT 0,
                unlimited       BOOLEAN NOT NULL DEFAULT FALSE,
                version         BIGINT NOT NULL DEFAULT 0,
                created_at      TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at      TIMESTAMPTZ NOT NULL DEFAULT now(),
                CONSTRAINT quota_records_remaining_non_negative
                    CHECK (remaining_units >= 0),
                CONSTRAINT quota_records_reserved_within_remaining
                    CHECK (reserved_units >= 0 AND reserved_units <= remaining_units)
            );
            "#,
        )
        .await?;

        db.execute_unprepared(
            r#"
            CREATE TABLE IF NOT EXISTS scribe_meter.jobs (
                id             UUID PRIMARY KEY,
                account_id     UUID NOT NULL
                    REFERENCES scribe_meter.quota_records (account_id) ON DELETE CASCADE,
                kind           VARCHAR(16) NOT NULL,
                state          VARCHAR(16) NOT NULL DEFAULT 'created',
                outcome        VARCHAR(16),
                charge         VARCHAR(16) NOT NULL DEFAULT 'unmetered',
                provider       VARCHAR(64) NOT NULL,
                input_ref      VARCHAR(1024),
                remote_job_id  VARCHAR(255),
                result         TEXT,
                error_detail   TEXT,
                deadline_at    TIMESTAMPTZ NOT NULL,
                last_polled_at TIMESTAMPTZ,
                created_at     TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at     TIMESTAMPTZ NOT NULL DEFAULT now(),
                CONSTRAINT jobs_kind_known
                    CHECK (kind IN ('transcription', 'summarization')),
                CONSTRAINT jobs_state_known
                    CHECK (state IN ('created', 'submitted', 'polling', 'completed',
                                     'failed', 'timed_out', 'cleaned_up')),
                CONSTRAINT jobs_outcome_terminal
                    CHECK (outcome IS NULL OR outcome IN ('completed', 'failed', 'timed_out')),
                CONSTRAINT jobs_charge_known
                    CHECK (charge IN ('unmetered', 'reserved', 'charged', 'committed',
                                      'released', 'refunded')),
                CONSTRAINT jobs_cleaned_up_only_when_settled
                    CHECK (state <> 'cleaned_up' OR charge NOT IN ('reserved', 'charged'))
            );
            "#,
        )
        .await?;

        // Account job listings
        db.execute_unprepared(
            "CREATE INDEX IF NOT EXISTS jobs_account_id_created_at_idx \
             ON scribe_meter.jobs (account_id, created_at DESC);",
        )
        .await?;

        // Sweeper scans
        db.execute_unprepared(
            "CREATE INDEX IF NOT EXISTS jobs_state_deadline_at_idx \
             ON scribe_meter.jobs (state, deadline_at);",
        )
        .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();

        db.execute_unprepared("DROP TABLE IF EXISTS scribe_meter.jobs;")
            .await?;

        db.execute_unprepared("DROP TABLE IF EXISTS scribe_meter.quota_records;")
            .await?;

        db.execute_unprepared("DROP SCHEMA IF EXISTS scribe_meter CASCADE;")
            .await?;

        Ok(())
    }
}
