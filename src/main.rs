//! Sonae - Disaster-supply stock recommendations for household teams.
//!
//! # API Endpoints
//!
//! - `POST /cron/weekly-report` - Run the weekly digest (needs `x-cron-secret`)
//! - `GET /teams/:team_id/report` - Aggregate stock report
//! - `GET /teams/:team_id/statuses` - Per-item stock statuses
//! - `PUT /teams/:team_id/settings` - Update stock settings
//! - `GET /health` - Health check

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use sonae::api::{AppState, router};
use sonae::config::Config;
use sonae::notifier::Notifier;
use sonae::push::MessagingApiClient;
use sonae::storage::Storage;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("sonae=info".parse()?))
        .init();

    let config = Config::from_env()?;

    info!(
        port = config.port,
        db_url = %config.database_url,
        app_url = %config.app_url,
        push_api = %config.push.api_base,
        "Starting Sonae server"
    );

    let storage = Storage::new(&config.database_url).await?;
    info!("Database initialized");

    let push = MessagingApiClient::with_base_url(
        &config.push.api_base,
        &config.push.client_id,
        config.push.client_secret.clone(),
    );
    let notifier = Notifier::new(storage.clone(), Arc::new(push), &config.app_url);

    let state = AppState {
        storage,
        notifier,
        cron_secret: config.cron_secret.clone(),
    };
    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;

    info!(%addr, "Sonae is listening");

    axum::serve(listener, app).await?;

    Ok(())
}
