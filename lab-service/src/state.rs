//! Application state for the lab service.

use std::sync::Arc;

use common::config::AppConfig;
use query_gateway::QueryGateway;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub gateway: Arc<QueryGateway>,
}

impl AppState {
    pub fn new(config: AppConfig, gateway: QueryGateway) -> Self {
        Self {
            config,
            gateway: Arc::new(gateway),
        }
    }
}
