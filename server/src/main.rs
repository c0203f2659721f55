use std::{fs::OpenOptions, sync::Arc};

use anyhow::Context;
use green_tracker_data_management::DataManager;
use server::{config::RelayConfig, http_api, live_endpoint, server_state::ServerState};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = RelayConfig::from_env();

    std::fs::create_dir_all(&config.log_dir)
        .with_context(|| format!("Failed to create log directory {:?}", config.log_dir))?;
    let log_file = config.log_dir.join("server.log");

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_file)
        .with_context(|| format!("Failed to open log file {:?}", log_file))?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| format!("{}=trace,tower_http=debug", env!("CARGO_CRATE_NAME")).into())
        )
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(file))
        .init();

    tracing::info!("Starting relay...");

    let data_manager = DataManager::start(config.database.as_deref()).await;
    let server_state = Arc::new(ServerState::new(data_manager));

    let live_listener = TcpListener::bind(&config.live_addr).await
        .with_context(|| format!("Failed to bind live endpoint on {}", config.live_addr))?;

    let state_clone = server_state.clone();
    tokio::spawn(async move {
        live_endpoint::listen(live_listener, state_clone).await;
    });

    let app = http_api::router(server_state).layer(TraceLayer::new_for_http());

    let http_listener = TcpListener::bind(&config.http_addr).await
        .with_context(|| format!("Failed to bind HTTP API on {}", config.http_addr))?;
    tracing::info!("HTTP API listening on {}", http_listener.local_addr()?);

    axum::serve(http_listener, app).await?;

    Ok(())
}
