use crate::config::GatewayConfig;
use crate::orchestrator::Orchestrator;
use crate::storage::AnalysisStore;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub store: Arc<dyn AnalysisStore>,
    pub config: Arc<GatewayConfig>,
}
