use std::sync::Arc;

use axum::Router;
use copilot_agent::{FoundryGateway, GatewayError, Orchestrator};
use copilot_core::config::{AppConfig, ConfigError};
use copilot_db::{connect_with_settings, DbPool, GuardPolicy, QueryGuard, SqlDataAccess};
use thiserror::Error;
use tracing::info;

use crate::{copilot, health};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub orchestrator: Arc<Orchestrator>,
}

impl Application {
    pub fn router(&self) -> Router {
        health::router(self.db_pool.clone()).merge(copilot::router(self.orchestrator.clone()))
    }
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("agent gateway setup failed: {0}")]
    Gateway(#[source] GatewayError),
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let gateway = FoundryGateway::from_config(&config.agents).map_err(BootstrapError::Gateway)?;
    let missing = config.agents.missing_agents();
    info!(
        event_name = "system.bootstrap.gateway_ready",
        correlation_id = "bootstrap",
        responses_url = gateway.responses_url(),
        missing_agents = missing.len(),
        "agent gateway configured"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        allowed_objects = config.guard.allowed_objects.len(),
        default_row_limit = config.guard.default_row_limit,
        "read-only database pool established"
    );

    let guard = QueryGuard::new(GuardPolicy::from_config(&config.guard));
    let data = SqlDataAccess::new(db_pool.clone(), guard);
    let orchestrator = Arc::new(Orchestrator::new(Arc::new(gateway), Arc::new(data)));

    Ok(Application { config, db_pool, orchestrator })
}
