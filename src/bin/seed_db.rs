use log::{error, info};
use service::{config::Config, logging::Logger};
use std::sync::Arc;
use std::time::Duration;

// Tokens printed for the seeded accounts stay valid for a week.
const TOKEN_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[tokio::main]
async fn main() {
    let config = Config::new();
    Logger::init_logger(&config as &Config);

    info!("Seeding database [{}]...", config.database_url());

    let db = match service::init_database(&config).await {
        Ok(db) => Arc::new(db),
        Err(e) => {
            error!("Failed to establish database connection: {e}");
            std::process::exit(1);
        }
    };

    let service_state = service::AppState::new(config, &db);

    let accounts =
        match entity_api::seed_database(service_state.db_conn_ref(), service_state.config.default_units)
            .await
        {
            Ok(accounts) => accounts,
            Err(e) => {
                error!("Failed to seed database: {e}");
                std::process::exit(1);
            }
        };

    let Some(secret) = service_state.config.jwt_secret() else {
        info!("No JWT secret configured; skipping development tokens");
        return;
    };

    for account in accounts {
        match domain::jwt::encode_token(account.account_id, &secret, TOKEN_TTL) {
            Ok(token) => println!(
                "account {} (unlimited: {}): Bearer {token}",
                account.account_id, account.unlimited
            ),
            Err(e) => error!("Failed to issue a token for {}: {e}", account.account_id),
        }
    }
}
