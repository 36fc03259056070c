use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Statistical baseline for a single metric.
///
/// Produced by the baseline job outside this service and read by the
/// analysis engine; the gateway only stores and looks these up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineStats {
    /// Unique ID, conventionally `baseline-{metric}-{timestamp}`.
    pub baseline_id: String,
    pub metric_name: String,

    // Statistical measures
    pub mean: f64,
    pub std_dev: f64,
    pub min_value: f64,
    pub max_value: f64,

    // Percentiles
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,

    pub calculated_at: DateTime<Utc>,
    /// Days of history the statistics cover.
    pub lookback_days: u32,
    pub sample_count: u64,
    /// Table the statistics were computed from.
    pub data_source: String,

    /// Serialized as `null` when absent.
    #[serde(default)]
    pub notes: Option<String>,
}

impl BaselineStats {
    pub fn to_dict(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }

    /// Row for the Baseline table (see [`super::schema::BASELINE_TABLE_SCHEMA`]).
    pub fn to_row(&self) -> Map<String, Value> {
        let mut row = Map::new();
        row.insert("baseline_id".into(), Value::from(self.baseline_id.clone()));
        row.insert("metric_name".into(), Value::from(self.metric_name.clone()));
        row.insert("mean".into(), Value::from(self.mean));
        row.insert("std_dev".into(), Value::from(self.std_dev));
        row.insert("min_value".into(), Value::from(self.min_value));
        row.insert("max_value".into(), Value::from(self.max_value));
        row.insert("p50".into(), Value::from(self.p50));
        row.insert("p95".into(), Value::from(self.p95));
        row.insert("p99".into(), Value::from(self.p99));
        row.insert(
            "calculated_at".into(),
            Value::from(self.calculated_at.to_rfc3339()),
        );
        row.insert("lookback_days".into(), Value::from(self.lookback_days));
        row.insert("sample_count".into(), Value::from(self.sample_count));
        row.insert("data_source".into(), Value::from(self.data_source.clone()));
        row.insert(
            "notes".into(),
            self.notes.clone().map(Value::from).unwrap_or(Value::Null),
        );
        row
    }

    /// Z-score of `value` against this baseline, `None` when the spread is zero.
    pub fn z_score(&self, value: f64) -> Option<f64> {
        if self.std_dev == 0.0 {
            return None;
        }
        Some((value - self.mean) / self.std_dev)
    }

    /// True when `value` lies above the 99th percentile.
    pub fn exceeds_p99(&self, value: f64) -> bool {
        value > self.p99
    }
}
