//! In-memory SQLite connections with the job and quota tables applied.
//!
//! Each call opens a fresh database. The pool is pinned to a single connection because
//! every SQLite in-memory connection is its own database.

use entity::{jobs, quota_records};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbBackend, Schema};

pub async fn connect() -> DatabaseConnection {
    let mut options = ConnectOptions::new("sqlite::memory:");
    options
        .max_connections(1)
        .min_connections(1)
        .sqlx_logging(false);

    let db = Database::connect(options)
        .await
        .expect("in-memory SQLite should open");

    let schema = Schema::new(DbBackend::Sqlite);
    let statements = [
        schema.create_table_from_entity(quota_records::Entity),
        schema.create_table_from_entity(jobs::Entity),
    ];

    for statement in statements.iter() {
        db.execute(db.get_database_backend().build(statement))
            .await
            .expect("schema should apply to a fresh database");
    }

    db
}
