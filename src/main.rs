// Main entry point - Dependency injection and server setup
mod domain;
mod application;
mod infrastructure;
mod presentation;

use std::{net::SocketAddr, sync::Arc};
use anyhow::Context;
use axum::{routing::{get, post}, Router};
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crate::application::auto_save::AutoSaveCoordinator;
use crate::application::backend_api::BackendApi;
use crate::application::line_source::LineSource;
use crate::application::live_console::LiveConsole;
use crate::application::progress_tracker::ProgressTracker;
use crate::application::recording_service::RecordingService;
use crate::application::session_monitor::SessionMonitor;
use crate::infrastructure::backend_client::BackendClient;
use crate::infrastructure::config::{load_console_config, LineSourceKind};
use crate::infrastructure::log_source::{FsLineSource, LogInjector, LogLayout, MemoryLineSource};
use crate::infrastructure::nc_file::load_nc_program;
use crate::infrastructure::realtime_transport::{RealtimeTransport, TransportConfig};
use crate::presentation::app_state::AppState;
use crate::presentation::handlers::{
    camera_image, channel_series, console_history, console_status, health_check, inject_log_line,
    path_progress, reset_session, start_recording, stop_recording, toggle_recording, tool_path,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load configuration
    let config = load_console_config()?;

    // Create adapters (infrastructure layer)
    let backend: Arc<dyn BackendApi> = Arc::new(BackendClient::new(
        config.backend.base_url.clone(),
        config.backend.request_timeout(),
    )?);
    let layout = LogLayout::new(config.session.log_roots.clone());
    let (line_source, log_injector): (Arc<dyn LineSource>, Option<LogInjector>) =
        match config.session.line_source {
            LineSourceKind::Filesystem => (Arc::new(FsLineSource::new()), None),
            LineSourceKind::Memory => {
                let source = Arc::new(MemoryLineSource::new());
                tracing::info!("session logs kept in memory, fill them via /console/logs");
                let injector = LogInjector::new(source.clone(), layout.clone());
                (source as Arc<dyn LineSource>, Some(injector))
            }
        };
    let transport = Arc::new(RealtimeTransport::new(TransportConfig::from_settings(
        &config.backend,
        &config.transport,
    )));

    if !backend.is_reachable().await {
        tracing::warn!(base_url = %config.backend.base_url, "backend not reachable yet");
    }

    // Create services (application layer)
    let progress = Arc::new(ProgressTracker::new());
    let console = Arc::new(LiveConsole::new(
        config.history.capacity,
        config.history.seed_limit,
        progress.clone(),
    ));
    let subscriptions = console.attach(&transport, backend.clone());

    let (effects_tx, effects_rx) = mpsc::unbounded_channel();
    let mut monitor = SessionMonitor::new(line_source, layout);
    if config.session.auto_save {
        monitor = monitor.with_effects(effects_tx);
    }
    let monitor = Arc::new(monitor);

    let mut tasks = vec![monitor.clone().spawn(config.session.poll_interval())];
    if config.session.auto_save {
        tasks.push(AutoSaveCoordinator::new(backend.clone(), console.clone()).spawn(effects_rx));
    }
    match &config.toolpath.nc_file {
        Some(nc_file) => {
            progress.set_path(Some(load_nc_program(nc_file).await?));
        }
        None => tasks.push(
            progress
                .clone()
                .spawn_backend_refresh(backend.clone(), config.toolpath.refresh_interval()),
        ),
    }

    let recording = RecordingService::new(
        backend.clone(),
        console.clone(),
        monitor.clone(),
        transport.subscribe_state(),
    );

    transport.connect();

    // Create application state
    let state = Arc::new(AppState {
        console: console.clone(),
        recording,
        monitor,
        transport: transport.clone(),
        backend,
        log_injector,
    });

    // Build router (presentation layer)
    let router = Router::new()
        .route("/healthz", get(health_check))
        .route("/console/status", get(console_status))
        .route("/console/history", get(console_history))
        .route("/console/series/:channel", get(channel_series))
        .route("/console/progress", get(path_progress))
        .route("/console/path", get(tool_path))
        .route("/console/images/:camera_id", get(camera_image))
        .route("/console/recording/start", post(start_recording))
        .route("/console/recording/stop", post(stop_recording))
        .route("/console/recording/toggle", post(toggle_recording))
        .route("/console/session/reset", post(reset_session))
        .route("/console/logs/:log", post(inject_log_line))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start server
    let addr: SocketAddr = config
        .server
        .bind
        .parse()
        .with_context(|| format!("invalid bind address {}", config.server.bind))?;
    tracing::info!(%addr, backend = %config.backend.base_url, "starting ded-console");

    axum::serve(tokio::net::TcpListener::bind(addr).await?, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    for task in tasks {
        task.abort();
    }
    console.detach(&transport, &subscriptions);
    transport.disconnect().await;
    tracing::info!("ded-console stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
