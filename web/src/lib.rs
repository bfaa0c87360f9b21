use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderName, HeaderValue, Method};
use domain::job::{JobLifecycle, PollPolicy};
use domain::quota::QuotaLedger;
use domain::reaper::Reaper;
use domain::JobClient;
use log::*;
use sea_orm::DatabaseConnection;
use service::config::Config;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;

mod controller;
mod error;
mod extractors;
mod params;
mod response;
pub mod router;

pub use error::{Error, Result};

/// Header carrying the static key of the subscription collaborator.
pub const ADMIN_KEY_HEADER: &str = "x-admin-key";

/// Web-level state: infrastructure from `service` plus the metering components and the
/// providers that run jobs.
#[derive(Clone)]
pub struct AppState {
    pub services: service::AppState,
    pub ledger: QuotaLedger,
    pub lifecycle: JobLifecycle,
    pub transcriber: Arc<dyn JobClient>,
    pub summarizer: Arc<dyn JobClient>,
}

impl AppState {
    pub fn new(
        services: service::AppState,
        transcriber: Arc<dyn JobClient>,
        summarizer: Arc<dyn JobClient>,
    ) -> Self {
        let db = Arc::clone(&services.database_connection);
        let config = &services.config;

        let ledger = QuotaLedger::from_config(Arc::clone(&db), config);
        let reaper = Reaper::new(Arc::clone(&db), config.staging_dir());
        let lifecycle = JobLifecycle::new(db, ledger.clone(), reaper, PollPolicy::from(config));

        Self {
            services,
            ledger,
            lifecycle,
            transcriber,
            summarizer,
        }
    }

    pub fn db_conn_ref(&self) -> &DatabaseConnection {
        self.services.db_conn_ref()
    }

    pub fn config(&self) -> &Config {
        &self.services.config
    }
}

pub async fn init_server(app_state: AppState, shutdown: CancellationToken) -> std::io::Result<()> {
    let config = app_state.config().clone();

    let host = config.interface.as_deref().unwrap_or("127.0.0.1");
    let server_url = format!("{}:{}", host, config.port);
    let listener = TcpListener::bind(&server_url).await?;

    let allowed_origins = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Ignoring invalid CORS origin {origin}: {e}");
                None
            }
        })
        .collect::<Vec<_>>();
    info!("CORS allowed origins: {allowed_origins:?}");

    let cors_layer = CorsLayer::new()
        .allow_methods([Method::DELETE, Method::GET, Method::POST, Method::PUT])
        .allow_credentials(true)
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static(ADMIN_KEY_HEADER),
        ])
        .allow_origin(allowed_origins);

    let app = router::define_routes(app_state)
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(cors_layer);

    info!("Server starting... listening for connections on http://{server_url}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}
