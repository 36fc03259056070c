//! Analysis engine boundary.
//!
//! The engine turns a validated [`Anomaly`] into an [`AnomalyAnalysis`]. How
//! it reasons is its own business; the gateway only relies on the contract
//! below. [`rules::RulesEngine`] is the built-in implementation.

pub mod rules;

pub use self::rules::RulesEngine;

use crate::model::{Anomaly, AnomalyAnalysis, BaselineStats};
use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;

/// Errors raised while producing an analysis.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("analysis engine unavailable: {0}")]
    Unavailable(String),

    #[error("analysis engine returned invalid output: {0}")]
    InvalidOutput(String),

    #[error("analysis engine answered for anomaly '{returned}' while analyzing '{expected}'")]
    AnomalyMismatch { expected: String, returned: String },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl EngineError {
    /// Category name reported to callers in the `type` field of error envelopes.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Unavailable(_) => "EngineUnavailable",
            EngineError::InvalidOutput(_) => "InvalidEngineOutput",
            EngineError::AnomalyMismatch { .. } => "AnomalyMismatch",
            EngineError::Internal(_) => "EngineInternalError",
        }
    }
}

/// An engine that derives root cause and recommendations for an anomaly.
///
/// Implementations must return an analysis whose `anomaly` equals the input
/// and whose `analyzed_at` is the completion time.
#[async_trait]
pub trait AnalysisEngine: Send + Sync {
    /// Identifier reported as `ai_model_used`.
    fn model_name(&self) -> &str;

    async fn analyze(&self, anomaly: &Anomaly) -> Result<AnomalyAnalysis, EngineError>;
}

/// Read-only access to precomputed baselines.
pub trait BaselineSource: Send + Sync {
    fn latest_baseline(&self, metric_name: &str) -> Result<Option<BaselineStats>>;
}
