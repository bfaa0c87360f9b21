//! Metered transcription and summarization service.
//!
//! Wires the configuration, database, job providers and the orphaned job sweeper together
//! and serves the HTTP API until interrupted.

use domain::gateway::assembly_ai::AssemblyAiClient;
use domain::gateway::groq::{GroqClient, GroqSummarizer};
use domain::quota::QuotaLedger;
use domain::reaper::Reaper;
use domain::sweeper::Sweeper;
use domain::JobClient;
use log::*;
use service::{config::Config, logging::Logger, AppState};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() {
    let config = Config::new();
    Logger::init_logger(&config as &Config);

    info!("Starting up scribe_meter in {} mode", config.runtime_env());

    let db = match service::init_database(&config).await {
        Ok(db) => Arc::new(db),
        Err(e) => {
            error!("Failed to establish database connection: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = tokio::fs::create_dir_all(config.staging_dir()).await {
        error!(
            "Failed to create staging directory {}: {e}",
            config.staging_dir().display()
        );
        std::process::exit(1);
    }

    let transcriber: Arc<dyn JobClient> = match AssemblyAiClient::from_config(&config) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!("Failed to configure the AssemblyAI client: {e}");
            std::process::exit(1);
        }
    };

    let summarizer: Arc<dyn JobClient> = match GroqClient::from_config(&config) {
        Ok(client) => Arc::new(GroqSummarizer::new(client)),
        Err(e) => {
            error!("Failed to configure the Groq client: {e}");
            std::process::exit(1);
        }
    };

    let shutdown = CancellationToken::new();

    let sweeper = Sweeper::from_config(
        Arc::clone(&db),
        QuotaLedger::from_config(Arc::clone(&db), &config),
        Reaper::new(Arc::clone(&db), config.staging_dir()),
        &config,
    );
    let sweeper_handle = sweeper.spawn(shutdown.clone());

    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for the shutdown signal: {e}");
            }
            info!("Shutting down");
            shutdown.cancel();
        }
    });

    let service_state = AppState::new(config, &db);
    let app_state = web::AppState::new(service_state, transcriber, summarizer);

    if let Err(e) = web::init_server(app_state, shutdown.clone()).await {
        error!("Server error: {e}");
    }

    shutdown.cancel();
    if let Err(e) = sweeper_handle.await {
        warn!("Sweeper task ended abnormally: {e}");
    }
}
