use super::{AnomalyType, Severity};
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Confidence assumed when the detector does not report one.
pub const DEFAULT_CONFIDENCE: f64 = 0.8;

/// A single detected deviation event, as accepted at the gateway boundary.
///
/// Built by [`crate::validate::normalize`]; the serde form is the canonical
/// dictionary, so `serde_json::to_value(&anomaly)` fed back through the
/// validator yields an equal value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    // Identification
    pub anomaly_id: String,
    #[serde(with = "iso8601")]
    pub detected_at: DateTime<FixedOffset>,

    // Metric information
    pub metric_name: String,
    /// Free-form category, e.g. "error_rate" or "cpu_utilization".
    pub metric_type: String,

    // Values
    pub current_value: f64,
    pub baseline_value: f64,
    /// Signed distance from the baseline in standard deviations.
    pub deviation_sigma: f64,
    pub deviation_percentage: f64,

    // Classification
    pub anomaly_type: AnomalyType,
    pub severity: Severity,
    /// Detector confidence. Passed through as given, see [`Anomaly::confidence_in_range`].
    #[serde(default = "default_confidence")]
    pub confidence: f64,

    // Context
    #[serde(default)]
    pub affected_resources: Vec<Value>,
    #[serde(default, with = "iso8601::map")]
    pub time_window: BTreeMap<String, DateTime<FixedOffset>>,
    #[serde(default)]
    pub related_metrics: BTreeMap<String, f64>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

fn default_confidence() -> f64 {
    DEFAULT_CONFIDENCE
}

/// Offset-preserving RFC 3339 form. A UTC offset is written as `+00:00`, never `Z`.
mod iso8601 {
    use chrono::{DateTime, FixedOffset};
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<FixedOffset>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&ts.to_rfc3339())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<FixedOffset>, D::Error> {
        let raw = String::deserialize(d)?;
        DateTime::parse_from_rfc3339(&raw).map_err(D::Error::custom)
    }

    pub mod map {
        use chrono::{DateTime, FixedOffset};
        use serde::{de::Error as _, ser::SerializeMap, Deserialize, Deserializer, Serializer};
        use std::collections::BTreeMap;

        pub fn serialize<S: Serializer>(
            window: &BTreeMap<String, DateTime<FixedOffset>>,
            s: S,
        ) -> Result<S::Ok, S::Error> {
            let mut map = s.serialize_map(Some(window.len()))?;
            for (name, ts) in window {
                map.serialize_entry(name, &ts.to_rfc3339())?;
            }
            map.end()
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            d: D,
        ) -> Result<BTreeMap<String, DateTime<FixedOffset>>, D::Error> {
            BTreeMap::<String, String>::deserialize(d)?
                .into_iter()
                .map(|(name, raw)| {
                    DateTime::parse_from_rfc3339(&raw)
                        .map(|ts| (name, ts))
                        .map_err(D::Error::custom)
                })
                .collect()
        }
    }
}

impl Anomaly {
    /// Canonical dictionary form, matching the inbound request contract.
    pub fn to_dict(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }

    /// Row for the Anomaly table (see [`super::schema::ANOMALY_TABLE_SCHEMA`]).
    pub fn to_row(&self) -> Map<String, Value> {
        let mut row = Map::new();
        row.insert("anomaly_id".into(), Value::from(self.anomaly_id.clone()));
        row.insert("detected_at".into(), Value::from(self.detected_at.to_rfc3339()));
        row.insert("metric_name".into(), Value::from(self.metric_name.clone()));
        row.insert("metric_type".into(), Value::from(self.metric_type.clone()));
        row.insert("current_value".into(), Value::from(self.current_value));
        row.insert("baseline_value".into(), Value::from(self.baseline_value));
        row.insert("deviation_sigma".into(), Value::from(self.deviation_sigma));
        row.insert("deviation_percentage".into(), Value::from(self.deviation_percentage));
        row.insert("anomaly_type".into(), Value::from(self.anomaly_type.as_str()));
        row.insert("severity".into(), Value::from(self.severity.as_str()));
        row.insert("confidence".into(), Value::from(self.confidence));
        row.insert(
            "affected_resources".into(),
            Value::Array(self.affected_resources.clone()),
        );
        row.insert(
            "related_metrics".into(),
            Value::Object(
                self.related_metrics
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::from(*v)))
                    .collect(),
            ),
        );
        row.insert("metadata".into(), Value::Object(self.metadata.clone()));
        row
    }

    /// Whether the reported confidence lies in `[0.0, 1.0]`.
    pub fn confidence_in_range(&self) -> bool {
        (0.0..=1.0).contains(&self.confidence)
    }

    /// True when the metric moved above its baseline.
    pub fn is_increase(&self) -> bool {
        self.current_value > self.baseline_value
    }
}
