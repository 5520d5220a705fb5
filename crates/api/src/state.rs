use std::sync::Arc;

use sqlx::PgPool;

use salonpost_events::ProgressBus;
use salonpost_orchestrator::{BoardAttemptRunner, Orchestrator, PgJobStore};

use crate::config::ServerConfig;

/// The production orchestrator wiring.
pub type AppOrchestrator = Orchestrator<PgJobStore, BoardAttemptRunner>;

/// Shared application state injected into every handler.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<ServerConfig>,
    pub orchestrator: Arc<AppOrchestrator>,
    pub bus: Arc<ProgressBus>,
}
