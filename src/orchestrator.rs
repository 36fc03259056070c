//! Runs one validated anomaly through the analysis engine and, depending on
//! the persistence mode, through the store.

use crate::config::PersistenceMode;
use crate::engine::{AnalysisEngine, EngineError};
use crate::error::GatewayError;
use crate::model::{Anomaly, AnomalyAnalysis};
use crate::storage::AnalysisStore;
use std::sync::Arc;
use tracing::{error, info, warn};

/// What came out of a successful orchestration.
#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub analysis: AnomalyAnalysis,
    /// Set once the record has been durably written; always `None` unless
    /// persistence is synchronous.
    pub analysis_id: Option<String>,
}

impl AnalysisOutcome {
    pub fn persisted(&self) -> bool {
        self.analysis_id.is_some()
    }
}

pub struct Orchestrator {
    engine: Arc<dyn AnalysisEngine>,
    store: Arc<dyn AnalysisStore>,
    persistence: PersistenceMode,
}

impl Orchestrator {
    pub fn new(
        engine: Arc<dyn AnalysisEngine>,
        store: Arc<dyn AnalysisStore>,
        persistence: PersistenceMode,
    ) -> Self {
        Self {
            engine,
            store,
            persistence,
        }
    }

    pub fn model_name(&self) -> &str {
        self.engine.model_name()
    }

    /// Analyze `anomaly`. Engine output is returned untouched; engine errors
    /// are surfaced as [`GatewayError::AnalysisEngineFailure`].
    pub async fn analyze(&self, anomaly: Anomaly) -> Result<AnalysisOutcome, GatewayError> {
        let analysis = match self.engine.analyze(&anomaly).await {
            Ok(analysis) => analysis,
            Err(e) => {
                error!(anomaly_id = %anomaly.anomaly_id, kind = e.kind(), error = %e, "analysis engine failed");
                return Err(e.into());
            }
        };

        if analysis.anomaly != anomaly {
            let e = EngineError::AnomalyMismatch {
                expected: anomaly.anomaly_id.clone(),
                returned: analysis.anomaly.anomaly_id.clone(),
            };
            error!(anomaly_id = %anomaly.anomaly_id, error = %e, "engine broke the analysis contract");
            return Err(e.into());
        }

        if !analysis.root_cause.confidence.is_finite() {
            let e = EngineError::InvalidOutput(format!(
                "root cause confidence {} is not a finite number",
                analysis.root_cause.confidence
            ));
            error!(anomaly_id = %anomaly.anomaly_id, error = %e, "engine returned an unusable analysis");
            return Err(e.into());
        }

        let analysis_id = match self.persistence {
            PersistenceMode::Sync => Some(self.persist(analysis.clone()).await?),
            PersistenceMode::Async => {
                let store = self.store.clone();
                let record = analysis.clone();
                tokio::spawn(async move {
                    let anomaly_id = record.anomaly.anomaly_id.clone();
                    match tokio::task::spawn_blocking(move || store.save_analysis(&record)).await {
                        Ok(Ok(id)) => info!(%anomaly_id, analysis_id = %id, "analysis persisted"),
                        Ok(Err(e)) => error!(%anomaly_id, error = %e, "background persistence failed"),
                        Err(e) => error!(%anomaly_id, error = %e, "background persistence task panicked"),
                    }
                });
                None
            }
            PersistenceMode::Disabled => None,
        };

        Ok(AnalysisOutcome {
            analysis,
            analysis_id,
        })
    }

    async fn persist(&self, analysis: AnomalyAnalysis) -> Result<String, GatewayError> {
        let store = self.store.clone();
        let anomaly_id = analysis.anomaly.anomaly_id.clone();
        let result = tokio::task::spawn_blocking(move || store.save_analysis(&analysis))
            .await
            .map_err(|e| GatewayError::Persistence(anyhow::anyhow!("persistence task panicked: {e}")))?;

        match result {
            Ok(id) => {
                info!(%anomaly_id, analysis_id = %id, "analysis persisted");
                Ok(id)
            }
            Err(e) => {
                warn!(%anomaly_id, error = %e, "synchronous persistence failed");
                Err(GatewayError::Persistence(e))
            }
        }
    }
}
