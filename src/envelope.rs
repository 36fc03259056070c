//! Response assembly -- the public success and error envelopes.

use crate::error::GatewayError;
use crate::model::{AnomalyAnalysis, HumanReadableSummary, Priority, RiskLevel};
use crate::validate::{ValidationError, REQUIRED_FIELDS};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::SecondsFormat;
use serde::Serialize;
use serde_json::{json, Value};

/// Body of a successful analysis response.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisEnvelope {
    pub success: bool,
    pub anomaly_id: String,
    pub root_cause: RootCauseBlock,
    pub recommendations: Vec<RecommendationBlock>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub human_readable_summary: Option<HumanReadableSummary>,
    pub analyzed_at: String,
    pub ai_model_used: String,
    pub analysis_duration_ms: u64,
    /// True only when the analysis record was durably written before responding.
    pub saved_to_bigquery: bool,
}

/// Root cause as exposed publicly: without the correlation data.
#[derive(Debug, Clone, Serialize)]
pub struct RootCauseBlock {
    pub primary_cause: String,
    pub contributing_factors: Vec<String>,
    pub confidence: f64,
    pub evidence: Vec<String>,
}

/// Recommendation as exposed publicly: without the cost impact.
#[derive(Debug, Clone, Serialize)]
pub struct RecommendationBlock {
    pub priority: Priority,
    pub action: String,
    pub rationale: String,
    pub expected_impact: String,
    pub implementation_steps: Vec<String>,
    pub estimated_effort: String,
    pub risk_level: RiskLevel,
}

impl AnalysisEnvelope {
    pub fn new(analysis: &AnomalyAnalysis, saved: bool) -> Self {
        let rc = &analysis.root_cause;
        Self {
            success: true,
            anomaly_id: analysis.anomaly.anomaly_id.clone(),
            root_cause: RootCauseBlock {
                primary_cause: rc.primary_cause.clone(),
                contributing_factors: rc.contributing_factors.clone(),
                confidence: rc.confidence,
                evidence: rc.evidence.clone(),
            },
            recommendations: analysis
                .recommendations
                .iter()
                .map(|rec| RecommendationBlock {
                    priority: rec.priority,
                    action: rec.action.clone(),
                    rationale: rec.rationale.clone(),
                    expected_impact: rec.expected_impact.clone(),
                    implementation_steps: rec.implementation_steps.clone(),
                    estimated_effort: rec.estimated_effort.clone(),
                    risk_level: rec.risk_level,
                })
                .collect(),
            human_readable_summary: analysis.summary.clone(),
            analyzed_at: analysis
                .analyzed_at
                .to_rfc3339_opts(SecondsFormat::AutoSi, true),
            ai_model_used: analysis.ai_model_used.clone(),
            analysis_duration_ms: analysis.analysis_duration_ms,
            saved_to_bigquery: saved,
        }
    }
}

/// Error envelope for `err`. Always carries `error` and `message`.
pub fn error_envelope(err: &GatewayError) -> Value {
    let mut body = json!({
        "error": err.category(),
        "message": err.to_string(),
    });

    if let GatewayError::Validation(ValidationError::MissingFields { missing }) = err {
        body["missing"] = json!(missing);
        body["required"] = json!(REQUIRED_FIELDS);
    }
    if let Some(kind) = err.kind() {
        body["type"] = json!(kind);
    }
    body
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        (self.status(), Json(error_envelope(&self))).into_response()
    }
}
