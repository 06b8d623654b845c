use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use refinery_api::config::{LogFormat, ServerConfig};
use refinery_api::router::build_app_router;
use refinery_api::state::AppState;
use refinery_events::EventBus;
use refinery_jobs::{CompletionHandler, JobRegistry};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Configuration ---
    let config = ServerConfig::from_env();

    // --- Tracing ---
    let json_logs = config.log_format == LogFormat::Json;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "refinery_api=debug,refinery_jobs=debug,tower_http=debug".into()
            }),
        )
        .with(json_logs.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json_logs).then(tracing_subscriber::fmt::layer))
        .init();

    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Event bus + job registry ---
    let event_bus = Arc::new(EventBus::new(config.jobs.max_subscribers_per_job));
    let registry = JobRegistry::new(&config.jobs, Arc::clone(&event_bus));
    tracing::info!(
        log_capacity = config.jobs.log_capacity,
        max_concurrent = config.jobs.max_concurrent,
        working_dir = %config.jobs.working_dir.display(),
        "Job registry created"
    );

    // Announce artifacts as jobs finish.
    let completion_cancel = CancellationToken::new();
    let completion = CompletionHandler::new(Arc::clone(&registry));
    let completion_handle = tokio::spawn(completion.run(completion_cancel.clone()));
    tracing::info!("Completion handler started");

    // --- App state + router ---
    let state = AppState::new(config.clone(), registry);
    let shutdown = state.shutdown.clone();
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            shutdown.cancel();
        })
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    completion_cancel.cancel();
    let timeout = Duration::from_secs(config.shutdown_timeout_secs);
    if tokio::time::timeout(timeout, completion_handle).await.is_err() {
        tracing::warn!("Completion handler did not stop in time");
    } else {
        tracing::info!("Completion handler stopped");
    }

    tracing::info!(
        live_subscribers = event_bus.wildcard_count(),
        "Graceful shutdown complete"
    );
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
