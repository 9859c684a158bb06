// Framework bootstrap for the live game server runtime.

use crate::domain::RangePolicy;
use crate::frameworks::config;
use crate::interface_adapters::memory_store::{Fixture, InMemoryStore};
use crate::interface_adapters::net::ws_handler;
use crate::interface_adapters::push::ConnectionHub;
use crate::interface_adapters::state::AppState;
use crate::interface_adapters::utils::clock::SystemClock;
use crate::use_cases::{GameRegistry, LiveSettings, Ports};

use axum::{Router, routing::get};
use std::net::SocketAddr;
use std::{io::Result, sync::Arc};

fn init_runtime() {
    let _ = dotenvy::dotenv();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let json = matches!(std::env::var("LOG_FORMAT").as_deref(), Ok("json"));
    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .json()
            .with_current_span(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .init();
    }

    std::panic::set_hook(Box::new(|info| {
        let backtrace = std::backtrace::Backtrace::capture();
        tracing::error!(%info, ?backtrace, "panic");
    }));
}

pub fn live_settings() -> LiveSettings {
    LiveSettings {
        range: RangePolicy::new(config::point_range_meters(), config::point_active_range_meters()),
        location_decay: config::location_decay(),
        io_timeout: config::store_timeout(),
        drain_timeout: config::drain_timeout(),
    }
}

/// Serves with the fixture named by the environment, or an empty store.
pub async fn run(listener: tokio::net::TcpListener) -> Result<()> {
    let fixture = match config::fixture_path() {
        Some(path) => Fixture::load(&path).await.map_err(|e| {
            tracing::error!(%path, error = %e, "failed to load fixture");
            std::io::Error::other(e.to_string())
        })?,
        None => {
            tracing::warn!("GAME_FIXTURE_PATH not set; starting with an empty store");
            Fixture::default()
        }
    };
    run_with_fixture(listener, fixture, live_settings()).await
}

pub async fn run_with_fixture(
    listener: tokio::net::TcpListener,
    fixture: Fixture,
    settings: LiveSettings,
) -> Result<()> {
    let address = listener.local_addr()?;
    let state = build_state(fixture, settings).await;
    let app = Router::new()
        .route("/ws", get(ws_handler))
        .with_state(state.clone());

    tracing::info!(%address, "listening");

    // Serve app and report errors rather than panicking
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .inspect_err(|e| {
            tracing::error!(error = %e, "server error");
        });

    // Drain in-flight location updates before the process exits.
    state.registry.stop_all().await;
    served
}

pub async fn run_with_config() -> Result<()> {
    init_runtime();

    let address = SocketAddr::from(([127, 0, 0, 1], config::http_port()));

    // Bind TCP listener with error handling
    let listener = tokio::net::TcpListener::bind(address)
        .await
        .inspect_err(|e| {
            tracing::error!(%address, error = %e, "failed to bind");
        })?;

    run(listener).await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}

async fn build_state(fixture: Fixture, settings: LiveSettings) -> Arc<AppState> {
    let store = Arc::new(InMemoryStore::from_fixture(fixture));
    let hub = Arc::new(ConnectionHub::new());
    let ports = Ports {
        store: store.clone(),
        push: hub.clone(),
        permissions: store.clone(),
        clock: Arc::new(SystemClock),
    };
    tracing::debug!(
        range_m = settings.range.radius_m,
        active_range_m = settings.range.active_radius_m,
        decay_secs = settings.location_decay.as_secs(),
        io_timeout_ms = settings.io_timeout.as_millis(),
        "live settings"
    );

    // Every game stored as running gets a live runtime at boot.
    let registry = Arc::new(GameRegistry::new(ports, settings));
    for game_id in store.running_game_ids() {
        if let Err(e) = registry.start_game(&game_id).await {
            tracing::error!(game_id = %game_id, error = %e, "failed to start game");
        }
    }

    Arc::new(AppState { registry, hub })
}
