use super::{Anomaly, Priority, RiskLevel};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Root cause analysis result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RootCause {
    pub primary_cause: String,
    pub contributing_factors: Vec<String>,
    pub confidence: f64,
    pub evidence: Vec<String>,
    #[serde(default)]
    pub correlation_data: Map<String, Value>,
}

/// Actionable recommendation for addressing an anomaly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub priority: Priority,
    /// What to do.
    pub action: String,
    /// Why this action.
    pub rationale: String,
    /// What will happen.
    pub expected_impact: String,
    #[serde(default)]
    pub implementation_steps: Vec<String>,
    /// e.g. "5 minutes", "1 hour".
    #[serde(default)]
    pub estimated_effort: String,
    #[serde(default)]
    pub risk_level: RiskLevel,
    /// Only set on recommendations for cost anomalies; serialized as `null` otherwise.
    #[serde(default)]
    pub cost_impact: Option<String>,
}

/// Plain language summary for non-technical audiences.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HumanReadableSummary {
    pub what_happened: String,
    pub why_it_happened: String,
    pub what_is_the_impact: String,
    pub what_improvements_can_be_made: String,
    pub estimated_benefit_if_implemented: String,
}

/// Complete analysis of an anomaly with recommendations.
///
/// Owns the analyzed [`Anomaly`] by value. One is produced per successful
/// analysis request and is not modified afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyAnalysis {
    pub anomaly: Anomaly,
    pub root_cause: RootCause,
    pub recommendations: Vec<Recommendation>,

    // Analysis metadata
    pub analyzed_at: DateTime<Utc>,
    pub analysis_duration_ms: u64,
    pub ai_model_used: String,

    // Additional insights
    #[serde(default)]
    pub historical_context: String,
    #[serde(default)]
    pub trend_analysis: String,
    #[serde(default)]
    pub predicted_impact: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<HumanReadableSummary>,
}

impl AnomalyAnalysis {
    /// Canonical dictionary form: the full anomaly, root cause with correlation
    /// data, and `summary` only when one was produced.
    pub fn to_dict(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }

    /// Row for the Analysis table (see [`super::schema::ANALYSIS_TABLE_SCHEMA`]).
    pub fn to_row(&self, analysis_id: &str) -> serde_json::Result<Map<String, Value>> {
        let mut row = Map::new();
        row.insert("analysis_id".into(), Value::from(analysis_id));
        row.insert("anomaly_id".into(), Value::from(self.anomaly.anomaly_id.clone()));
        row.insert("analyzed_at".into(), Value::from(self.analyzed_at.to_rfc3339()));
        row.insert(
            "root_cause".into(),
            Value::from(self.root_cause.primary_cause.clone()),
        );
        row.insert(
            "contributing_factors".into(),
            serde_json::to_value(&self.root_cause.contributing_factors)?,
        );
        row.insert("confidence".into(), Value::from(self.root_cause.confidence));
        row.insert(
            "recommendations".into(),
            serde_json::to_value(&self.recommendations)?,
        );
        row.insert("ai_model_used".into(), Value::from(self.ai_model_used.clone()));
        row.insert(
            "analysis_duration_ms".into(),
            Value::from(self.analysis_duration_ms),
        );
        Ok(row)
    }

    /// Render the summary as a plain text report suitable for any audience.
    pub fn plain_language_report(&self) -> String {
        let Some(summary) = &self.summary else {
            return "Summary not available".to_string();
        };
        let rule = "=".repeat(80);

        format!(
            "ANOMALY ANALYSIS REPORT\n{rule}\n\n\
             WHAT HAPPENED:\n{}\n\n\
             WHY IT HAPPENED:\n{}\n\n\
             WHAT IS THE IMPACT:\n{}\n\n\
             WHAT IMPROVEMENTS CAN BE MADE:\n{}\n\n\
             ESTIMATED BENEFIT IF IMPLEMENTED:\n{}\n\n\
             {rule}\n\
             Analysis completed at: {}\n\
             Confidence level: {:.0}%",
            summary.what_happened,
            summary.why_it_happened,
            summary.what_is_the_impact,
            summary.what_improvements_can_be_made,
            summary.estimated_benefit_if_implemented,
            self.analyzed_at.format("%Y-%m-%d %H:%M:%S UTC"),
            self.root_cause.confidence * 100.0,
        )
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::model::anomaly::tests::sample_anomaly;
    use chrono::TimeZone;

    pub(crate) fn sample_analysis() -> AnomalyAnalysis {
        AnomalyAnalysis {
            anomaly: sample_anomaly(),
            root_cause: RootCause {
                primary_cause: "Deployment introduced a failing dependency call".into(),
                contributing_factors: vec!["Retry storm".into()],
                confidence: 0.85,
                evidence: vec!["error_rate 15.5 vs baseline 2.3".into()],
                correlation_data: Map::new(),
            },
            recommendations: vec![Recommendation {
                priority: Priority::High,
                action: "Roll back the latest release".into(),
                rationale: "Errors began right after the deploy".into(),
                expected_impact: "Error rate back under 3%".into(),
                implementation_steps: vec!["Trigger rollback pipeline".into()],
                estimated_effort: "15 minutes".into(),
                risk_level: RiskLevel::Low,
                cost_impact: None,
            }],
            analyzed_at: Utc.with_ymd_and_hms(2024, 12, 16, 14, 5, 35).unwrap(),
            analysis_duration_ms: 4200,
            ai_model_used: "rules-v1".into(),
            historical_context: String::new(),
            trend_analysis: String::new(),
            predicted_impact: String::new(),
            summary: None,
        }
    }

    #[test]
    fn test_to_dict_omits_absent_summary() {
        let dict = sample_analysis().to_dict().unwrap();
        assert!(dict.get("summary").is_none());
        assert_eq!(dict["anomaly"]["anomaly_id"], "anom_20241216_001");
        assert!(dict["root_cause"]["correlation_data"].is_object());
        assert!(dict["recommendations"][0]["cost_impact"].is_null());
        assert_eq!(dict["recommendations"][0]["priority"], "high");
        assert_eq!(dict["recommendations"][0]["risk_level"], "low");
        assert_eq!(dict["historical_context"], "");
    }

    #[test]
    fn test_to_dict_keeps_empty_summary() {
        let mut analysis = sample_analysis();
        analysis.summary = Some(HumanReadableSummary::default());
        let dict = analysis.to_dict().unwrap();
        assert_eq!(dict["summary"]["what_happened"], "");
    }

    #[test]
    fn test_recommendation_defaults() {
        let rec: Recommendation = serde_json::from_value(serde_json::json!({
            "priority": "medium",
            "action": "a",
            "rationale": "r",
            "expected_impact": "e"
        }))
        .unwrap();
        assert!(rec.implementation_steps.is_empty());
        assert_eq!(rec.estimated_effort, "");
        assert_eq!(rec.risk_level, RiskLevel::Low);
        assert_eq!(rec.cost_impact, None);
    }

    #[test]
    fn test_plain_language_report() {
        let mut analysis = sample_analysis();
        assert_eq!(analysis.plain_language_report(), "Summary not available");

        analysis.summary = Some(HumanReadableSummary {
            what_happened: "Errors spiked.".into(),
            why_it_happened: "A bad deploy.".into(),
            what_is_the_impact: "Failed checkouts.".into(),
            what_improvements_can_be_made: "Roll back.".into(),
            estimated_benefit_if_implemented: "Errors return to normal.".into(),
        });
        let report = analysis.plain_language_report();
        assert!(report.starts_with("ANOMALY ANALYSIS REPORT"));
        assert!(report.contains("WHY IT HAPPENED:\nA bad deploy."));
        assert!(report.contains("Analysis completed at: 2024-12-16 14:05:35 UTC"));
        assert!(report.ends_with("Confidence level: 85%"));
    }

    #[test]
    fn test_row_matches_analysis_schema() {
        let row = sample_analysis().to_row("analysis-1").unwrap();
        for field in crate::model::schema::ANALYSIS_TABLE_SCHEMA.fields {
            assert!(row.contains_key(field.name), "missing column {}", field.name);
        }
        assert_eq!(row["root_cause"], "Deployment introduced a failing dependency call");
        assert_eq!(row["analysis_duration_ms"], 4200);
    }
}
