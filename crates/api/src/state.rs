use std::sync::Arc;

use refinery_jobs::commands::CommandBuilder;
use refinery_jobs::JobRegistry;
use tokio_util::sync::CancellationToken;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable: everything inside is behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Job registry; also owns the event bus.
    pub registry: Arc<JobRegistry>,
    /// Builds refinery CLI invocations for the import/refine/contract routes.
    pub commands: Arc<CommandBuilder>,
    /// Cancelled when the server starts shutting down; ends open SSE streams.
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Wire a registry and command builder from `config`.
    pub fn new(config: ServerConfig, registry: Arc<JobRegistry>) -> Self {
        let commands = Arc::new(CommandBuilder::new(&config.jobs));
        Self {
            config: Arc::new(config),
            registry,
            commands,
            shutdown: CancellationToken::new(),
        }
    }
}
