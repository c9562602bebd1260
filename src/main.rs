mod config;
mod error;
mod handlers;
mod models;
mod routes;
mod state;
mod utils;
mod ws;

use config::Config;
use routes::create_routes;
use state::AppState;
use std::panic;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use utils::shutdown::shutdown_signal;
use ws::attacher::BroadcastAttacher;
use ws::reaper::run_reaper;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Any panic, including inside a spawned task, takes the process down
    panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
        std::process::exit(1);
    }));

    // Load configuration
    let config_result = Config::load();
    let log_level = config_result
        .as_ref()
        .map(|config| config.log_level.clone())
        .unwrap_or_else(|_| "info".to_string());

    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            format!("room_relay=debug,tower_http=debug,{log_level}").into()
        }))
        .init();

    info!("Starting room relay...");

    let config = config_result.unwrap_or_else(|e| {
        error!("Failed to load configuration: {}", e);
        warn!("Using default configuration");
        Config::default()
    });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let attacher = Arc::new(BroadcastAttacher::new(config.relay_channel_capacity));
    let state = AppState::new(&config, attacher, shutdown_rx.clone());

    let reaper = tokio::spawn(run_reaper(
        state.registry.clone(),
        config.sweep_interval(),
        state.idle_timeout,
        shutdown_rx,
    ));

    let app_routes = create_routes(state, &config);

    let listener = match tokio::net::TcpListener::bind(config.server_address()).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", config.server_address(), e);
            std::process::exit(1);
        }
    };

    info!("Relay running on ws://{}", config.server_address());
    info!("Status available at http://{}/status", config.server_address());

    let served = axum::serve(listener, app_routes)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            // Stop the reaper and close every attached socket
            let _ = shutdown_tx.send(true);
        })
        .await;

    if let Err(e) = served {
        error!("Server error: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = reaper.await {
        warn!("Reaper did not stop cleanly: {}", e);
    }
    info!("Room relay stopped");
}
