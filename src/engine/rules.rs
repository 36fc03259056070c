use super::{AnalysisEngine, BaselineSource, EngineError};
use crate::model::{
    Anomaly, AnomalyAnalysis, AnomalyType, BaselineStats, HumanReadableSummary, Priority,
    Recommendation, RiskLevel, RootCause, Severity,
};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Sigma at which the deviation alone counts as fully convincing.
const SIGMA_SATURATION: f64 = 6.0;

/// Deterministic, table-driven engine.
///
/// Picks a playbook per anomaly type, scores confidence from the detector's
/// confidence and the size of the deviation, and cross-checks against the
/// latest stored baseline for the metric when one is available.
pub struct RulesEngine {
    model_name: String,
    baselines: Option<Arc<dyn BaselineSource>>,
}

impl RulesEngine {
    pub fn new(model_name: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            baselines: None,
        }
    }

    pub fn with_baselines(mut self, source: Arc<dyn BaselineSource>) -> Self {
        self.baselines = Some(source);
        self
    }

    async fn lookup_baseline(&self, metric_name: &str) -> Result<Option<BaselineStats>, EngineError> {
        let Some(source) = self.baselines.clone() else {
            return Ok(None);
        };
        let metric = metric_name.to_string();
        let result = tokio::task::spawn_blocking(move || source.latest_baseline(&metric))
            .await
            .map_err(|e| EngineError::Internal(anyhow::anyhow!("baseline lookup panicked: {e}")))?;

        match result {
            Ok(baseline) => Ok(baseline),
            Err(e) => {
                // Analysis still works from the detector's own baseline value.
                warn!(metric = %metric_name, error = %e, "baseline lookup failed");
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl AnalysisEngine for RulesEngine {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn analyze(&self, anomaly: &Anomaly) -> Result<AnomalyAnalysis, EngineError> {
        let started = Instant::now();
        let baseline = self.lookup_baseline(&anomaly.metric_name).await?;
        debug!(
            anomaly_id = %anomaly.anomaly_id,
            has_baseline = baseline.is_some(),
            "running rules engine"
        );

        let book = playbook(anomaly.anomaly_type);
        let root_cause = root_cause(anomaly, &book, baseline.as_ref());
        let recommendations = recommendations(anomaly, &book);
        let summary = summary(anomaly, &book, &root_cause);

        let historical_context = baseline
            .as_ref()
            .map(|b| {
                format!(
                    "Over the last {} days {} averaged {:.2} (p95 {:.2}, p99 {:.2}, {} samples from {}).",
                    b.lookback_days, b.metric_name, b.mean, b.p95, b.p99, b.sample_count, b.data_source
                )
            })
            .unwrap_or_default();

        Ok(AnomalyAnalysis {
            anomaly: anomaly.clone(),
            root_cause,
            recommendations,
            analysis_duration_ms: started.elapsed().as_millis() as u64,
            ai_model_used: self.model_name.clone(),
            historical_context,
            trend_analysis: trend(anomaly),
            predicted_impact: predicted_impact(anomaly.severity).to_string(),
            summary: Some(summary),
            analyzed_at: Utc::now(),
        })
    }
}

struct Playbook {
    cause: &'static str,
    factors: [&'static str; 2],
    action: &'static str,
    rationale: &'static str,
    impact: &'static str,
    steps: [&'static str; 3],
    effort: &'static str,
    risk: RiskLevel,
    benefit: &'static str,
}

fn playbook(anomaly_type: AnomalyType) -> Playbook {
    match anomaly_type {
        AnomalyType::Stability => Playbook {
            cause: "Elevated failure rate",
            factors: [
                "Recent deployment or configuration change",
                "Errors propagating from an upstream dependency",
            ],
            action: "Roll back or disable the most recent change to the affected services",
            rationale: "Failure spikes most often follow a change to code, configuration or a dependency",
            impact: "Failure rate returns to its baseline level",
            steps: [
                "Identify deployments and config changes in the detection window",
                "Roll back the most recent change on the affected services",
                "Confirm the error rate is back within its normal band",
            ],
            effort: "30 minutes",
            risk: RiskLevel::Medium,
            benefit: "Fewer failed requests and a more reliable service for users",
        },
        AnomalyType::Performance => Playbook {
            cause: "Degraded response time or throughput",
            factors: [
                "Saturated downstream dependency",
                "Increased request volume or payload size",
            ],
            action: "Scale out the affected services and inspect slow downstream calls",
            rationale: "Latency regressions usually come from contention on a shared dependency",
            impact: "Latency returns to its baseline level",
            steps: [
                "Compare request volume against the baseline period",
                "Trace the slowest endpoints to find the dominant downstream call",
                "Add capacity or caching in front of the saturated dependency",
            ],
            effort: "1 hour",
            risk: RiskLevel::Low,
            benefit: "Faster responses and fewer timeouts",
        },
        AnomalyType::Cost => Playbook {
            cause: "Spend above the expected level",
            factors: [
                "Over-provisioned or idle resources",
                "Unexpected growth in billable usage",
            ],
            action: "Right-size or shut down under-used resources behind the spend increase",
            rationale: "Cost deviations usually come from resources that outlived their need",
            impact: "Spend returns to its baseline level",
            steps: [
                "Break the spend down by resource for the detection window",
                "Flag resources with low utilization",
                "Downsize or schedule shutdown for the flagged resources",
            ],
            effort: "2 hours",
            risk: RiskLevel::Low,
            benefit: "Lower monthly spend with no loss of service",
        },
        AnomalyType::Resource => Playbook {
            cause: "Resource saturation",
            factors: [
                "Workload growth beyond provisioned capacity",
                "Leak or runaway process consuming resources",
            ],
            action: "Add capacity and look for leaking or runaway workloads",
            rationale: "Sustained saturation leads to throttling and eventually to failures",
            impact: "Utilization drops back under its saturation threshold",
            steps: [
                "Find the processes or pods with the largest consumption",
                "Restart leaking workloads and file a defect",
                "Raise limits or add nodes if the growth is organic",
            ],
            effort: "1 hour",
            risk: RiskLevel::Medium,
            benefit: "Headroom restored, avoiding throttling and outages",
        },
        AnomalyType::Unknown => Playbook {
            cause: "Unclassified deviation",
            factors: [
                "Insufficient context to classify the deviation",
                "Possible change in how the metric is collected",
            ],
            action: "Investigate the metric and its collection pipeline",
            rationale: "The deviation does not match a known pattern",
            impact: "The deviation is explained and classified",
            steps: [
                "Check the metric's collection pipeline for recent changes",
                "Compare against related metrics in the same window",
                "Classify the anomaly and update detection rules",
            ],
            effort: "1 hour",
            risk: RiskLevel::Low,
            benefit: "Clearer signal and fewer unexplained alerts",
        },
    }
}

fn direction(anomaly: &Anomaly) -> &'static str {
    if anomaly.is_increase() {
        "above"
    } else {
        "below"
    }
}

fn root_cause(anomaly: &Anomaly, book: &Playbook, baseline: Option<&BaselineStats>) -> RootCause {
    let mut factors: Vec<String> = book.factors.iter().map(|f| f.to_string()).collect();
    for (name, value) in &anomaly.related_metrics {
        factors.push(format!("Correlated movement in {name} ({value})"));
    }
    if !anomaly.affected_resources.is_empty() {
        factors.push(format!(
            "{} affected resource(s) reported by the detector",
            anomaly.affected_resources.len()
        ));
    }

    let mut evidence = vec![
        format!(
            "{} is {} against a baseline of {} ({:+.1}%)",
            anomaly.metric_name,
            anomaly.current_value,
            anomaly.baseline_value,
            anomaly.deviation_percentage
        ),
        format!("Deviation of {:.1} sigma from baseline", anomaly.deviation_sigma),
    ];

    let mut correlation_data = Map::new();
    correlation_data.insert(
        "related_metrics".into(),
        Value::Object(
            anomaly
                .related_metrics
                .iter()
                .map(|(k, v)| (k.clone(), Value::from(*v)))
                .collect(),
        ),
    );

    let detector_confidence = anomaly.confidence.clamp(0.0, 1.0);
    let sigma_strength = (anomaly.deviation_sigma.abs() / SIGMA_SATURATION).min(1.0);
    let mut confidence = 0.5 * detector_confidence + 0.5 * sigma_strength;

    if let Some(b) = baseline {
        correlation_data.insert("baseline_id".into(), Value::from(b.baseline_id.clone()));
        if let Some(z) = b.z_score(anomaly.current_value) {
            evidence.push(format!("Stored baseline z-score {z:.1}"));
            correlation_data.insert("baseline_z_score".into(), Value::from(z));
        }
        if b.exceeds_p99(anomaly.current_value) {
            evidence.push(format!(
                "Above the 99th percentile ({}) of the last {} days",
                b.p99, b.lookback_days
            ));
            confidence += 0.1;
        }
    }

    RootCause {
        primary_cause: format!(
            "{} in {}: {} {} baseline",
            book.cause,
            anomaly.metric_name,
            anomaly.metric_type,
            direction(anomaly)
        ),
        contributing_factors: factors,
        confidence: (confidence.clamp(0.0, 1.0) * 100.0).round() / 100.0,
        evidence,
        correlation_data,
    }
}

fn recommendations(anomaly: &Anomaly, book: &Playbook) -> Vec<Recommendation> {
    let cost_impact = match anomaly.anomaly_type {
        AnomalyType::Cost => Some(format!(
            "Recovers up to {:.1}% of the spend increase",
            anomaly.deviation_percentage.abs()
        )),
        AnomalyType::Stability
        | AnomalyType::Performance
        | AnomalyType::Resource
        | AnomalyType::Unknown => None,
    };

    let mut recs = vec![
        Recommendation {
            priority: Priority::Low,
            action: format!("Add an alert on {} at the current baseline band", anomaly.metric_name),
            rationale: "Catch a recurrence earlier".to_string(),
            expected_impact: "Faster detection next time".to_string(),
            implementation_steps: Vec::new(),
            estimated_effort: "15 minutes".to_string(),
            risk_level: RiskLevel::Low,
            cost_impact: None,
        },
        Recommendation {
            priority: Priority::for_severity(anomaly.severity),
            action: book.action.to_string(),
            rationale: book.rationale.to_string(),
            expected_impact: book.impact.to_string(),
            implementation_steps: book.steps.iter().map(|s| s.to_string()).collect(),
            estimated_effort: book.effort.to_string(),
            risk_level: book.risk,
            cost_impact,
        },
    ];
    recs.sort_by_key(|r| r.priority);
    recs
}

fn summary(anomaly: &Anomaly, book: &Playbook, root_cause: &RootCause) -> HumanReadableSummary {
    HumanReadableSummary {
        what_happened: format!(
            "{} moved to {}, {:.0}% {} its usual level of {}.",
            anomaly.metric_name,
            anomaly.current_value,
            anomaly.deviation_percentage.abs(),
            direction(anomaly),
            anomaly.baseline_value
        ),
        why_it_happened: format!(
            "The most likely cause is: {}. Contributing: {}.",
            book.cause.to_lowercase(),
            root_cause.contributing_factors.join("; ")
        ),
        what_is_the_impact: predicted_impact(anomaly.severity).to_string(),
        what_improvements_can_be_made: format!("{}.", book.action),
        estimated_benefit_if_implemented: format!("{}.", book.benefit),
    }
}

fn trend(anomaly: &Anomaly) -> String {
    format!(
        "{} moved {:+.1}% ({:+.1} sigma) relative to baseline.",
        anomaly.metric_name, anomaly.deviation_percentage, anomaly.deviation_sigma
    )
}

fn predicted_impact(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical => "Users are likely affected right now; expect an outage if left alone.",
        Severity::High => "Noticeable degradation for some users is likely within hours.",
        Severity::Medium => "Limited impact today, but the trend will grow if not addressed.",
        Severity::Low => "Minor impact; worth tracking.",
        Severity::Info => "No direct impact expected.",
    }
}
