//! HTTP surface tests -- drive the axum router in-process with `oneshot`.

use anomaly_gateway::api::{self, state::AppState};
use anomaly_gateway::config::{GatewayConfig, PersistenceMode};
use anomaly_gateway::engine::{AnalysisEngine, EngineError, RulesEngine};
use anomaly_gateway::model::{Anomaly, AnomalyAnalysis};
use anomaly_gateway::orchestrator::Orchestrator;
use anomaly_gateway::storage::AnalysisStore;
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

fn event() -> Value {
    json!({
        "anomaly_id": "anom_1",
        "detected_at": "2024-12-16T14:05:30Z",
        "metric_name": "error_rate",
        "metric_type": "error_rate",
        "current_value": 15.5,
        "baseline_value": 2.3,
        "deviation_sigma": 5.2,
        "deviation_percentage": 574.0,
        "anomaly_type": "stability",
        "severity": "high"
    })
}

fn config_in(dir: &TempDir) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.storage.db_path = dir.path().join("gateway.db").to_string_lossy().into_owned();
    config
}

fn app(dir: &TempDir) -> Router {
    api::router(anomaly_gateway::build_state(config_in(dir)).unwrap())
}

fn post_json(uri: &str, body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(body.into())
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), 1 << 20).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, body)
}

struct UnavailableEngine;

#[async_trait]
impl AnalysisEngine for UnavailableEngine {
    fn model_name(&self) -> &str {
        "unavailable"
    }

    async fn analyze(&self, _anomaly: &Anomaly) -> Result<AnomalyAnalysis, EngineError> {
        Err(EngineError::Unavailable("model endpoint timed out".into()))
    }
}

struct PanickingEngine;

#[async_trait]
impl AnalysisEngine for PanickingEngine {
    fn model_name(&self) -> &str {
        "panicking"
    }

    async fn analyze(&self, _anomaly: &Anomaly) -> Result<AnomalyAnalysis, EngineError> {
        panic!("model weights corrupted")
    }
}

struct UnreachableStore;

impl AnalysisStore for UnreachableStore {
    fn save_analysis(&self, _analysis: &AnomalyAnalysis) -> anyhow::Result<String> {
        anyhow::bail!("connection refused")
    }

    fn record_feedback(&self, _anomaly_id: &str, _fp: bool, _notes: Option<&str>) -> anyhow::Result<()> {
        anyhow::bail!("connection refused")
    }

    fn false_positive_rate(&self, _window_days: u32) -> anyhow::Result<Option<f64>> {
        anyhow::bail!("connection refused")
    }

    fn ping(&self) -> anyhow::Result<()> {
        anyhow::bail!("connection refused")
    }
}

fn app_with(engine: Arc<dyn AnalysisEngine>, store: Arc<dyn AnalysisStore>, persistence: PersistenceMode) -> Router {
    api::router(AppState {
        orchestrator: Arc::new(Orchestrator::new(engine, store.clone(), persistence)),
        store,
        config: Arc::new(GatewayConfig::default()),
    })
}

#[tokio::test]
async fn test_analyze_success() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir);

    let (status, body) = send(&app, post_json("/api/v1/anomalies/analyze", event().to_string())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["anomaly_id"], "anom_1");
    assert_eq!(body["ai_model_used"], "rules-v1");
    assert_eq!(body["saved_to_bigquery"], true);

    let confidence = body["root_cause"]["confidence"].as_f64().unwrap();
    assert!((0.0..=1.0).contains(&confidence));
    assert!(body["root_cause"].get("correlation_data").is_none());

    let recs = body["recommendations"].as_array().unwrap();
    assert!(!recs.is_empty());
    assert!(recs.iter().all(|r| r.get("cost_impact").is_none()));
    assert!(body["human_readable_summary"]["what_happened"].is_string());
    assert!(body["analyzed_at"].as_str().unwrap().ends_with('Z'));
}

#[tokio::test]
async fn test_analyze_missing_fields() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir);

    let mut partial = event();
    partial.as_object_mut().unwrap().remove("severity");
    partial.as_object_mut().unwrap().remove("metric_type");

    let (status, body) = send(&app, post_json("/api/v1/anomalies/analyze", partial.to_string())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Missing required fields");
    assert_eq!(body["missing"], json!(["metric_type", "severity"]));
    assert_eq!(body["required"].as_array().unwrap().len(), 10);
}

#[tokio::test]
async fn test_analyze_unknown_severity() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir);

    let mut bad = event();
    bad["severity"] = json!("extreme");

    let (status, body) = send(&app, post_json("/api/v1/anomalies/analyze", bad.to_string())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Validation error");
    assert!(body["message"].as_str().unwrap().contains("severity"));
}

#[tokio::test]
async fn test_analyze_malformed_bodies() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir);

    for payload in ["", "not json", "[]", "{}"] {
        let (status, body) = send(&app, post_json("/api/v1/anomalies/analyze", payload)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "payload {payload:?}");
        assert_eq!(body["error"], "Invalid request");
        assert_eq!(body["message"], "Request body must be JSON");
    }
}

#[tokio::test]
async fn test_engine_failure_is_internal_error() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(anomaly_gateway::storage::SqliteStore::open(&config_in(&dir).storage.db_path).unwrap());
    let app = app_with(Arc::new(UnavailableEngine), store, PersistenceMode::Sync);

    let (status, body) = send(&app, post_json("/api/v1/anomalies/analyze", event().to_string())).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Internal server error");
    assert_eq!(body["type"], "EngineUnavailable");
    assert!(body["message"].as_str().unwrap().contains("timed out"));
}

#[tokio::test]
async fn test_engine_panic_is_internal_error() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(anomaly_gateway::storage::SqliteStore::open(&config_in(&dir).storage.db_path).unwrap());
    let app = app_with(Arc::new(PanickingEngine), store, PersistenceMode::Sync);

    let (status, body) = send(&app, post_json("/api/v1/anomalies/analyze", event().to_string())).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Internal server error");
    assert_eq!(body["type"], "HandlerPanic");
    assert!(body["message"].as_str().unwrap().contains("model weights corrupted"));

    // The service keeps answering after the panic.
    let (status, _) = send(&app, get("/api/v1/health")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_sync_persistence_failure_is_internal_error() {
    let app = app_with(Arc::new(RulesEngine::new("rules-v1")), Arc::new(UnreachableStore), PersistenceMode::Sync);

    let (status, body) = send(&app, post_json("/api/v1/anomalies/analyze", event().to_string())).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["type"], "PersistenceFailure");
}

#[tokio::test]
async fn test_disabled_persistence_reports_not_saved() {
    let app = app_with(Arc::new(RulesEngine::new("rules-v1")), Arc::new(UnreachableStore), PersistenceMode::Disabled);

    let (status, body) = send(&app, post_json("/api/v1/anomalies/analyze", event().to_string())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["saved_to_bigquery"], false);
}

#[tokio::test]
async fn test_health_and_feedback() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir);

    let (status, body) = send(&app, get("/api/v1/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "anomaly-gateway");
    assert_eq!(body["project_id"], "local");
    assert_eq!(body["dataset_id"], "anomaly_detection");
    assert!(body["false_positive_rate"].is_null());

    let feedback = json!({"anomaly_id": "anom_1", "is_false_positive": true, "notes": "planned load test"});
    let (status, body) = send(&app, post_json("/api/v1/feedback", feedback.to_string())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);

    let feedback = json!({"anomaly_id": "anom_2", "is_false_positive": false});
    let (status, _) = send(&app, post_json("/api/v1/feedback", feedback.to_string())).await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, body) = send(&app, get("/api/v1/health")).await;
    assert_eq!(body["false_positive_rate"], 0.5);
}

#[tokio::test]
async fn test_feedback_rejects_bad_payload() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir);

    let (status, body) = send(&app, post_json("/api/v1/feedback", r#"{"anomaly_id": "anom_1"}"#)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid request");
}

#[tokio::test]
async fn test_health_degraded_when_store_unreachable() {
    let app = app_with(Arc::new(RulesEngine::new("rules-v1")), Arc::new(UnreachableStore), PersistenceMode::Sync);

    let (status, body) = send(&app, get("/api/v1/health")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "unhealthy");
    assert!(body["error"].as_str().unwrap().contains("connection refused"));
}

#[tokio::test]
async fn test_cors_preflight() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir);

    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/api/v1/anomalies/analyze")
        .header(header::ORIGIN, "https://dashboard.example.com")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    assert_eq!(headers[header::ACCESS_CONTROL_MAX_AGE], "3600");
    assert!(headers[header::ACCESS_CONTROL_ALLOW_METHODS]
        .to_str()
        .unwrap()
        .contains("POST"));
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir);

    let response = app.oneshot(get("/api/v1/incidents")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
