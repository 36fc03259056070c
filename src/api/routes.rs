//! API route definitions.

use super::state::AppState;
use super::SERVICE_NAME;
use crate::envelope::AnalysisEnvelope;
use crate::error::GatewayError;
use crate::validate;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{error, info, warn};

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/anomalies/analyze", post(analyze_anomaly))
        .route("/feedback", post(record_feedback))
        .route("/health", get(health))
}

/// The body must be a non-empty JSON object.
fn parse_object(body: &[u8]) -> Result<Map<String, Value>, GatewayError> {
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) if !map.is_empty() => Ok(map),
        _ => Err(GatewayError::InvalidRequest("Request body must be JSON".into())),
    }
}

async fn analyze_anomaly(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<AnalysisEnvelope>, GatewayError> {
    let raw = parse_object(&body).inspect_err(|e| warn!(error = %e, "rejected analysis request"))?;

    let anomaly = validate::normalize(&raw).inspect_err(|e| {
        warn!(field = e.field().unwrap_or("-"), error = %e, "anomaly failed validation")
    })?;

    if !anomaly.confidence_in_range() {
        warn!(
            anomaly_id = %anomaly.anomaly_id,
            confidence = anomaly.confidence,
            "detector confidence outside [0, 1], passing through"
        );
    }

    info!(
        anomaly_id = %anomaly.anomaly_id,
        metric = %anomaly.metric_name,
        severity = %anomaly.severity,
        model = state.orchestrator.model_name(),
        "analyzing anomaly"
    );
    let outcome = state.orchestrator.analyze(anomaly).await?;

    Ok(Json(AnalysisEnvelope::new(
        &outcome.analysis,
        outcome.persisted(),
    )))
}

#[derive(Debug, Deserialize)]
struct FeedbackRequest {
    anomaly_id: String,
    is_false_positive: bool,
    #[serde(default)]
    notes: Option<String>,
}

async fn record_feedback(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), GatewayError> {
    let request: FeedbackRequest = serde_json::from_slice(&body)
        .map_err(|e| GatewayError::InvalidRequest(format!("invalid feedback: {e}")))?;
    if request.anomaly_id.trim().is_empty() {
        return Err(GatewayError::InvalidRequest(
            "invalid feedback: anomaly_id must not be empty".into(),
        ));
    }

    let store = state.store.clone();
    let FeedbackRequest {
        anomaly_id,
        is_false_positive,
        notes,
    } = request;
    let id = anomaly_id.clone();
    tokio::task::spawn_blocking(move || {
        store.record_feedback(&id, is_false_positive, notes.as_deref())
    })
    .await
    .map_err(|e| GatewayError::Feedback(anyhow::anyhow!("feedback task panicked: {e}")))?
    .map_err(GatewayError::Feedback)?;

    info!(%anomaly_id, is_false_positive, "feedback recorded");
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "anomaly_id": anomaly_id,
            "is_false_positive": is_false_positive,
        })),
    ))
}

async fn health(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let store = state.store.clone();
    let window_days = state.config.storage.false_positive_window_days;
    let checked = tokio::task::spawn_blocking(move || {
        store.ping()?;
        store.false_positive_rate(window_days)
    })
    .await
    .unwrap_or_else(|e| Err(anyhow::anyhow!("health check task panicked: {e}")));

    let timestamp = chrono::Utc::now().to_rfc3339();
    match checked {
        Ok(false_positive_rate) => (
            StatusCode::OK,
            Json(json!({
                "status": "healthy",
                "service": SERVICE_NAME,
                "timestamp": timestamp,
                "project_id": state.config.storage.project_id,
                "dataset_id": state.config.storage.dataset_id,
                "false_positive_rate": false_positive_rate,
            })),
        ),
        Err(e) => {
            error!(error = %e, "health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unhealthy",
                    "service": SERVICE_NAME,
                    "error": format!("{e:#}"),
                    "timestamp": timestamp,
                })),
            )
        }
    }
}
