pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod models;
pub mod routes;

use std::sync::Arc;

use config::Config;
use db::positions::PositionStore;
use gateway::fanout::BroadcastDispatcher;
use gateway::handler::IngestionHandler;
use gateway::registry::ConnectionRegistry;
use gateway::supervisor::{SessionSupervisor, SupervisorConfig};

/// Shared application state available to all route handlers and
/// connection tasks.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<ConnectionRegistry>,
    pub positions: Arc<PositionStore>,
    pub dispatcher: BroadcastDispatcher,
    pub ingestion: Arc<IngestionHandler>,
    pub supervisor: Arc<SessionSupervisor>,
}

impl AppState {
    /// Wire up the registry, store, dispatcher, ingestion handler, and
    /// supervisor around one configuration.
    pub fn new(config: Config) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let positions = Arc::new(PositionStore::new(config.trail_capacity));
        let dispatcher = BroadcastDispatcher::new(registry.clone());
        let ingestion = Arc::new(IngestionHandler::new(
            registry.clone(),
            positions.clone(),
            dispatcher.clone(),
        ));
        let supervisor = Arc::new(SessionSupervisor::new(
            registry.clone(),
            positions.clone(),
            dispatcher.clone(),
            SupervisorConfig::from(&config),
        ));

        Self {
            config: Arc::new(config),
            registry,
            positions,
            dispatcher,
            ingestion,
            supervisor,
        }
    }
}
